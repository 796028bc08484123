//! Data structures for execution traces
//!
//! Serialization follows the format the tutor front end reads: a step is a flat
//! JSON object holding `time`, the loop vectors under `#` and `$` as
//! comma-separated strings, one entry per variable, then `lineno` and the
//! optional `prev_lineno`, `next_lineno` and `rv` fields.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::Result;

/// Key of a trace log bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LineKey {
    /// A statement on this 0-indexed line is about to execute
    Line(usize),
    /// A call is about to return from this 0-indexed line
    Return(usize),
}

impl LineKey {
    /// The 0-indexed source line this key refers to
    pub fn line(&self) -> usize {
        match self {
            Self::Line(n) | Self::Return(n) => *n,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return(_))
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(n) => write!(f, "{n}"),
            Self::Return(n) => write!(f, "R{n}"),
        }
    }
}

impl Serialize for LineKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Line(n) => serializer.serialize_u64(*n as u64),
            Self::Return(_) => serializer.collect_str(self),
        }
    }
}

/// Loop context attached to steps and loop markers
///
/// Both vectors run from the outermost active loop to the innermost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopMarker {
    /// Iteration counter of each active loop
    pub iterations: Vec<usize>,
    /// Header line of each active loop
    pub loop_ids: Vec<usize>,
}

/// Snapshot of one call context at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStep {
    /// Global time index, unique and increasing across the whole trace
    pub time: usize,
    /// Line this step was recorded at
    pub line: LineKey,
    /// Loop context when the step was recorded
    pub loops: LoopMarker,
    /// Formatted local variables, in binding order
    pub bindings: IndexMap<String, String>,
    /// Line of the step recorded just before this one
    pub prev_line: Option<LineKey>,
    /// Line of the step recorded just after this one
    pub next_line: Option<LineKey>,
    /// Formatted return value (return steps only)
    pub return_value: Option<String>,
}

/// Entry of a trace log bucket
#[derive(Debug, Clone, PartialEq)]
pub enum TraceRecord {
    Step(ExecutionStep),
    /// A loop containing this line was entered
    BeginLoop(LoopMarker),
    /// A loop containing this line was exited
    EndLoop(LoopMarker),
}

impl TraceRecord {
    pub fn as_step(&self) -> Option<&ExecutionStep> {
        match self {
            Self::Step(step) => Some(step),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Step(_))
    }

    /// Loop context of this record
    pub fn loops(&self) -> &LoopMarker {
        match self {
            Self::Step(step) => &step.loops,
            Self::BeginLoop(marker) | Self::EndLoop(marker) => marker,
        }
    }
}

fn joined(values: &[usize]) -> String {
    values
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl Serialize for TraceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            Self::BeginLoop(marker) => {
                map.serialize_entry("begin_loop", &joined(&marker.iterations))?;
                map.serialize_entry("#", &joined(&marker.iterations))?;
                map.serialize_entry("$", &joined(&marker.loop_ids))?;
            }
            Self::EndLoop(marker) => {
                map.serialize_entry("end_loop", &joined(&marker.iterations))?;
                map.serialize_entry("#", &joined(&marker.iterations))?;
                map.serialize_entry("$", &joined(&marker.loop_ids))?;
            }
            Self::Step(step) => {
                map.serialize_entry("time", &step.time)?;
                map.serialize_entry("#", &joined(&step.loops.iterations))?;
                map.serialize_entry("$", &joined(&step.loops.loop_ids))?;
                for (name, value) in &step.bindings {
                    map.serialize_entry(name, value)?;
                }
                map.serialize_entry("lineno", &step.line)?;
                if let Some(prev) = &step.prev_line {
                    map.serialize_entry("prev_lineno", prev)?;
                }
                if let Some(next) = &step.next_line {
                    map.serialize_entry("next_lineno", next)?;
                }
                if let Some(rv) = &step.return_value {
                    map.serialize_entry("rv", rv)?;
                }
            }
        }
        map.end()
    }
}

/// Chronological records of every line the program visited
///
/// Buckets keep the order in which their lines were first touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TraceLog {
    buckets: IndexMap<LineKey, Vec<TraceRecord>>,
}

impl TraceLog {
    /// Create new empty trace log
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: LineKey, record: TraceRecord) -> usize {
        let bucket = self.buckets.entry(key).or_default();
        bucket.push(record);
        bucket.len() - 1
    }

    pub(crate) fn step_mut(&mut self, key: LineKey, index: usize) -> Option<&mut ExecutionStep> {
        match self.buckets.get_mut(&key)?.get_mut(index)? {
            TraceRecord::Step(step) => Some(step),
            _ => None,
        }
    }

    /// Records of one line, oldest first
    pub fn at(&self, key: LineKey) -> &[TraceRecord] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every bucket, in first-touched order
    pub fn iter(&self) -> impl Iterator<Item = (&LineKey, &[TraceRecord])> {
        self.buckets.iter().map(|(key, records)| (key, records.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Get number of steps recorded
    pub fn step_count(&self) -> usize {
        self.buckets
            .values()
            .flatten()
            .filter(|record| !record.is_sentinel())
            .count()
    }

    /// Every step, ordered by time
    pub fn steps(&self) -> Vec<&ExecutionStep> {
        let mut steps: Vec<&ExecutionStep> = self
            .buckets
            .values()
            .flatten()
            .filter_map(TraceRecord::as_step)
            .collect();
        steps.sort_by_key(|step| step.time);
        steps
    }

    /// Serialize the log as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
