//! Tutor Artifact
//!
//! Pairs the write map with the trace log. Serializes as the two-element
//! JSON array `[writes, trace]` the front end loads.

use py_tracer::TraceLog;
use serde::{Serialize, Serializer};
use write_analysis::WriteMap;

use crate::Result;

/// Output of one tutor run
#[derive(Debug, Clone, PartialEq)]
pub struct TutorArtifact {
    /// Identifiers written on each line
    pub writes: WriteMap,
    /// Chronological execution records per line
    pub trace: TraceLog,
    repaired_lines: Vec<usize>,
}

impl TutorArtifact {
    pub fn new(writes: WriteMap, trace: TraceLog, repaired_lines: Vec<usize>) -> Self {
        Self {
            writes,
            trace,
            repaired_lines,
        }
    }

    /// Lines blanked so the program would parse
    ///
    /// Not part of the serialized artifact.
    pub fn repaired_lines(&self) -> &[usize] {
        &self.repaired_lines
    }

    /// Get number of steps in the trace
    pub fn step_count(&self) -> usize {
        self.trace.step_count()
    }

    /// Serialize artifact as a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize artifact to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Serialize for TutorArtifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.writes, &self.trace).serialize(serializer)
    }
}
