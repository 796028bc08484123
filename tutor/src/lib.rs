//! Tutor - Orchestration layer for program execution tutoring
//!
//! This crate connects the static write analysis and the execution tracer
//! into a single call that turns a program's source into the artifact the
//! tutor front end renders: `[writes, trace]`.
//!
//! ## Usage
//!
//! ```no_run
//! use tutor::{build_trace, RecordedRun, TutorConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut host = RecordedRun::from_json(&std::fs::read_to_string("run.json")?)?;
//! let artifact = build_trace("x = 1\ny = x + 1\n", &mut host, &TutorConfig::default())?;
//! println!("{}", artifact.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod replay;

pub use artifact::TutorArtifact;
pub use replay::{source_digest, RecordedEvent, RecordedFrame, RecordedRun};

use anyhow::Context;
use py_tracer::{trace_program, ExecutionHost, SourceText, TracerConfig};
use write_analysis::collect_writes;

/// Result type for tutor operations
pub type Result<T> = anyhow::Result<T>;

/// Configuration for building a tutor trace
#[derive(Debug, Clone)]
pub struct TutorConfig {
    /// Tracer settings (step budget, program origin, reserved name)
    pub tracer: TracerConfig,
    /// Strip comments and fill blank lines before analysing the program
    pub prepare_source: bool,
}

impl TutorConfig {
    /// Create a new tutor configuration
    pub fn new(tracer: TracerConfig, prepare_source: bool) -> Self {
        Self {
            tracer,
            prepare_source,
        }
    }
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self::new(TracerConfig::default(), true)
    }
}

/// Load program text the way the tutor analyses it
pub fn load_source(program: &str, config: &TutorConfig) -> SourceText {
    if config.prepare_source {
        SourceText::prepare(program)
    } else {
        SourceText::new(program)
    }
}

/// High-level API: analyse and trace one program
///
/// Runs the write analysis first, so a program that does not parse fails
/// before the host is asked to run anything. Lines the analysis had to blank
/// are blanked in the traced source as well, so both passes see the same text.
///
/// # Arguments
/// * `program` - Program source as submitted
/// * `host` - Runs the program and delivers execution events
/// * `config` - Tutor configuration
///
/// # Returns
/// * `Ok(TutorArtifact)` - Writes per line paired with the trace log
/// * `Err` - If the program does not parse or the host run fails
pub fn build_trace(
    program: &str,
    host: &mut dyn ExecutionHost,
    config: &TutorConfig,
) -> Result<TutorArtifact> {
    let mut source = load_source(program, config);
    tracing::info!("Building tutor trace for {} source lines", source.len());

    let collection = collect_writes(&source).context("Failed to analyse program writes")?;
    for line in &collection.repaired_lines {
        source.blank_line(*line);
    }

    let trace = trace_program(&source, host, config.tracer.clone())
        .context("Failed to trace program execution")?;

    tracing::info!(
        "Tutor trace built: {} lines with writes, {} steps",
        collection.writes.len(),
        trace.step_count()
    );
    Ok(TutorArtifact::new(
        collection.writes,
        trace,
        collection.repaired_lines,
    ))
}
