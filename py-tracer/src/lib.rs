//! Python Tracer - Execution trace capture for program tutoring
//!
//! This crate observes the execution of a short Python program and records a
//! replayable trace of its local variable state, one snapshot per visited
//! line, annotated with the iteration context of every enclosing loop.
//!
//! # Overview
//!
//! The tracer does not run Python itself. An [`ExecutionHost`] runs the program
//! and delivers line-visit and return events to an [`ExecutionObserver`]; the
//! [`ExecutionTracer`] is that observer. It records:
//!
//! * A time-stamped [`ExecutionStep`] for each visited line and each return
//! * Begin/end loop markers in the bucket of every line of a loop body
//! * Previous/next line links between consecutive steps
//!
//! Loop boundaries are found from source indentation alone (see [`source`]).
//!
//! # Usage
//!
//! ```no_run
//! use py_tracer::{trace_program, ExecutionHost, SourceText, TracerConfig};
//!
//! fn run(host: &mut dyn ExecutionHost) -> py_tracer::Result<()> {
//!     let source = SourceText::prepare("x = 1\nfor i in range(3):\n    x += i\n");
//!     let trace = trace_program(&source, host, TracerConfig::default())?;
//!     println!("Recorded {} steps", trace.step_count());
//!     Ok(())
//! }
//! ```
//!
//! # Limitations
//!
//! * Traces are capped at [`DEFAULT_MAX_STEPS`] steps by default; the host is
//!   asked to stop once the cap is reached.
//! * Loop detection is textual and expects one statement per line, as written
//!   by the tutor's users.

pub mod observer;
pub mod source;
pub mod trace;
pub mod tracer;
pub mod value;

pub use observer::{CallContext, ContextId, ExecutionHost, ExecutionObserver, Flow, ScopeKind};
pub use source::{SourceText, RESERVED_NAME};
pub use trace::{ExecutionStep, LineKey, LoopMarker, TraceLog, TraceRecord};
pub use tracer::{trace_program, ExecutionTracer, TracerConfig, DEFAULT_MAX_STEPS};
pub use value::{ImageRenderer, NoImages, RgbImageRenderer, Value, ValueFormatter};

/// Result type for tracer operations
pub type Result<T> = anyhow::Result<T>;
