//! Write Analysis - Static map of the variables each line assigns
//!
//! Parses the traced program once, without running it, and records for every
//! line the identifiers its assignments write. Subscript assignments such as
//! `grid[i][j] = 0` count as writes to their root container (`grid`).
//!
//! The parse is allowed to fail on lines holding the tracer's no-op variable
//! (they can carry indentation the parser rejects); such lines are blanked and
//! the parse is retried. The blanked lines are reported back to the caller.

pub mod collector;

pub use collector::{collect_writes, WriteCollection, WriteMap};

/// Errors raised by the write analysis
#[derive(Debug, thiserror::Error)]
pub enum WriteAnalysisError {
    /// The program does not parse, and the failure cannot be repaired
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("failed to serialize write map: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for write analysis operations
pub type Result<T> = std::result::Result<T, WriteAnalysisError>;
