//! Execution tracer
//!
//! Turns the host's line and return events into a [`TraceLog`]. Loops are
//! tracked without any help from the interpreter: a loop starts when its header
//! line is first visited, a new iteration starts on every revisit of the header,
//! and the loop ends when control reaches a line at or left of the header's
//! indentation, or when the context returns from inside it. A return from a
//! `yield` or `await` line only suspends the context, so its loops stay open.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::observer::{CallContext, ContextId, ExecutionHost, ExecutionObserver, Flow, ScopeKind};
use crate::source::{is_break, is_return, is_suspension, SourceText, RESERVED_NAME};
use crate::trace::{ExecutionStep, LineKey, LoopMarker, TraceLog, TraceRecord};
use crate::value::{Value, ValueFormatter};
use crate::Result;

/// Number of steps recorded before the tracer halts the run
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Configuration for the execution tracer
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Steps recorded before the run is halted
    pub max_steps: usize,
    /// Origin reported by contexts running the traced program itself
    pub program_origin: String,
    /// Internal variable that is never shown
    pub reserved_name: String,
}

impl TracerConfig {
    /// Create a new tracer configuration
    pub fn new(max_steps: usize, program_origin: impl Into<String>) -> Self {
        Self {
            max_steps,
            program_origin: program_origin.into(),
            reserved_name: RESERVED_NAME.to_string(),
        }
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS, "<string>")
    }
}

/// An active loop
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoopFrame {
    context: ContextId,
    header: usize,
    indent: usize,
    iteration: usize,
}

/// Where the most recent step lives in the log
#[derive(Debug, Clone, Copy)]
struct StepRef {
    context: ContextId,
    key: LineKey,
    index: usize,
}

/// Observer that records a tutor trace
pub struct ExecutionTracer<'s> {
    source: &'s SourceText,
    config: TracerConfig,
    formatter: ValueFormatter,
    time: usize,
    log: TraceLog,
    loops: Vec<LoopFrame>,
    prev: Option<StepRef>,
    preexisting: Option<HashSet<String>>,
    halted: bool,
}

impl<'s> ExecutionTracer<'s> {
    /// Create a tracer over `source` with the default value formatter
    pub fn new(source: &'s SourceText, config: TracerConfig) -> Self {
        Self::with_formatter(source, config, ValueFormatter::default())
    }

    /// Create a tracer that formats bindings with `formatter`
    pub fn with_formatter(source: &'s SourceText, config: TracerConfig, formatter: ValueFormatter) -> Self {
        Self {
            source,
            config,
            formatter,
            time: 0,
            log: TraceLog::new(),
            loops: Vec::new(),
            prev: None,
            preexisting: None,
            halted: false,
        }
    }

    /// Whether the step budget ran out
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Get the trace recorded so far
    pub fn log(&self) -> &TraceLog {
        &self.log
    }

    /// Consume the tracer and return its trace
    pub fn into_log(self) -> TraceLog {
        self.log
    }

    /// Record a visit to 1-based line `raw_line` of `context`
    pub fn on_line_visit(&mut self, context: &dyn CallContext, raw_line: usize) -> Flow {
        if self.halted {
            return Flow::Halt;
        }
        if context.scope() == ScopeKind::Module && self.preexisting.is_none() {
            self.preexisting = Some(context.locals().into_iter().map(|(name, _)| name.to_string()).collect());
        }
        if self.is_excluded(context) {
            return Flow::Continue;
        }

        let line = raw_line.saturating_sub(1);
        self.record_loop_end(context.id(), line);
        if self.record_env(context, LineKey::Line(line)).is_none() {
            return Flow::Halt;
        }
        self.record_loop_begin(context.id(), line);
        Flow::Continue
    }

    /// Record that `context` is about to return `value` from 1-based line `raw_line`
    pub fn on_return(&mut self, context: &dyn CallContext, raw_line: usize, value: &Value) -> Flow {
        if self.halted {
            return Flow::Halt;
        }
        if self.is_excluded(context) {
            return Flow::Continue;
        }

        let line = raw_line.saturating_sub(1);
        let key = LineKey::Return(line);
        let Some(index) = self.record_env(context, key) else {
            return Flow::Halt;
        };
        if let Some(rv) = self.formatter.format(value) {
            if let Some(step) = self.log.step_mut(key, index) {
                step.return_value = Some(rv);
            }
        }

        self.record_loop_end(context.id(), line);
        if is_suspension(self.source.text(line)) {
            tracing::debug!("Context {} suspended at line {}", context.id(), line);
        } else {
            self.close_context_loops(context.id());
        }
        Flow::Continue
    }

    fn is_excluded(&self, context: &dyn CallContext) -> bool {
        context.scope() == ScopeKind::Comprehension || context.origin() != self.config.program_origin
    }

    fn loop_marker(&self) -> LoopMarker {
        LoopMarker {
            iterations: self.loops.iter().map(|l| l.iteration).collect(),
            loop_ids: self.loops.iter().map(|l| l.header).collect(),
        }
    }

    fn top_loop_in(&self, context: ContextId) -> Option<&LoopFrame> {
        self.loops.last().filter(|l| l.context == context)
    }

    /// Close loops that control has left before reaching `line`
    fn record_loop_end(&mut self, context: ContextId, line: usize) {
        let Some(top) = self.top_loop_in(context) else {
            return;
        };
        let Some(prev) = self.prev else {
            return;
        };
        let (top_header, top_indent) = (top.header, top.indent);
        let source = self.source;
        let prev_stmt = source.text(prev.key.line());

        if prev.context == context && is_return(prev_stmt) {
            // Returning from inside nested loops leaves every one of them
            // mid-iteration.
            while self.top_loop_in(context).is_some() {
                self.pop_loop(true);
            }
        } else if line != top_header && source.indent_of(line) <= top_indent {
            // A break skips the header revisit that would have counted the
            // final iteration.
            self.pop_loop(is_break(prev_stmt));
        }
    }

    /// Close the loops a returning context still has open
    fn close_context_loops(&mut self, context: ContextId) {
        while self.top_loop_in(context).is_some() {
            self.pop_loop(false);
        }
    }

    fn pop_loop(&mut self, count_iteration: bool) {
        let Some(top) = self.loops.last_mut() else {
            return;
        };
        if count_iteration {
            top.iteration += 1;
        }
        let header = top.header;
        let marker = self.loop_marker();
        tracing::debug!(
            "Loop at line {} ended after {} iterations",
            header,
            marker.iterations.last().copied().unwrap_or(0)
        );

        for body_line in self.source.loop_body(header) {
            self.log.push(LineKey::Line(body_line), TraceRecord::EndLoop(marker.clone()));
        }
        self.loops.pop();
    }

    /// Start a loop, or its next iteration, when `line` is a loop header
    fn record_loop_begin(&mut self, context: ContextId, line: usize) {
        if !self.source.is_loop_header(line) {
            return;
        }
        if let Some(top) = self.loops.last_mut() {
            if top.context == context && top.header == line {
                top.iteration += 1;
                return;
            }
        }

        self.loops.push(LoopFrame {
            context,
            header: line,
            indent: self.source.indent_of(line),
            iteration: 0,
        });
        tracing::debug!("Loop at line {} started, depth {}", line, self.loops.len());

        let marker = self.loop_marker();
        for body_line in self.source.loop_body(line) {
            self.log.push(LineKey::Line(body_line), TraceRecord::BeginLoop(marker.clone()));
        }
    }

    /// Append a snapshot of `context` under `key`
    ///
    /// Returns the step's index in its bucket, or `None` once the step budget
    /// is spent.
    fn record_env(&mut self, context: &dyn CallContext, key: LineKey) -> Option<usize> {
        if self.time >= self.config.max_steps {
            tracing::debug!("Step budget of {} reached, halting", self.config.max_steps);
            self.halted = true;
            return None;
        }

        let is_module = context.scope() == ScopeKind::Module;
        let mut bindings = IndexMap::new();
        for (name, value) in context.locals() {
            if name == self.config.reserved_name {
                continue;
            }
            if is_module && self.preexisting.as_ref().is_some_and(|names| names.contains(name)) {
                continue;
            }
            if let Some(formatted) = self.formatter.format(value) {
                bindings.insert(name.to_string(), formatted);
            }
        }

        let step = ExecutionStep {
            time: self.time,
            line: key,
            loops: self.loop_marker(),
            bindings,
            prev_line: self.prev.map(|prev| prev.key),
            next_line: None,
            return_value: None,
        };
        self.time += 1;

        if let Some(prev) = self.prev {
            if let Some(prev_step) = self.log.step_mut(prev.key, prev.index) {
                prev_step.next_line = Some(key);
            }
        }
        let index = self.log.push(key, TraceRecord::Step(step));
        self.prev = Some(StepRef {
            context: context.id(),
            key,
            index,
        });
        Some(index)
    }
}

impl ExecutionObserver for ExecutionTracer<'_> {
    fn on_line(&mut self, context: &dyn CallContext, line: usize) -> Flow {
        self.on_line_visit(context, line)
    }

    fn on_return(&mut self, context: &dyn CallContext, line: usize, value: &Value) -> Flow {
        ExecutionTracer::on_return(self, context, line, value)
    }
}

/// Trace the execution of a program
///
/// Has `host` run the program and returns the trace log recorded along the
/// way. Reaching the step budget is not an error; the log simply ends there.
///
/// # Arguments
/// * `source` - Program lines, as handed to the host
/// * `host` - Runs the program and delivers events
/// * `config` - Tracer configuration
///
/// # Returns
/// * `Ok(TraceLog)` - Trace of the program's execution
/// * `Err(_)` - If the host fails to run the program
pub fn trace_program(source: &SourceText, host: &mut dyn ExecutionHost, config: TracerConfig) -> Result<TraceLog> {
    tracing::info!("Starting program trace, {} source lines", source.len());

    let mut tracer = ExecutionTracer::new(source, config);
    host.run(&source.to_code(), &mut tracer)?;

    tracing::info!(
        "Program trace recorded {} steps{}",
        tracer.log().step_count(),
        if tracer.is_halted() { " (step budget reached)" } else { "" }
    );
    Ok(tracer.into_log())
}
