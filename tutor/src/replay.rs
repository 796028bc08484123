//! Replay host
//!
//! Runs a program by replaying execution events recorded elsewhere. A
//! recording is plain JSON:
//!
//! ```json
//! {
//!   "source_digest": "<sha256 of the program, hex>",
//!   "events": [
//!     {"event": "line", "frame": {"id": 1, "name": "<module>", "locals": {}}, "line": 1},
//!     {"event": "return", "frame": {"id": 1, "name": "<module>", "locals": {"x": {"int": 1}}},
//!      "line": 1, "value": "none"}
//!   ]
//! }
//! ```
//!
//! Line numbers are 1-based, as the recording host reports them. The digest
//! is optional; when present the replay refuses to run any other program.

use indexmap::IndexMap;
use py_tracer::{CallContext, ContextId, ExecutionHost, ExecutionObserver, Flow, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;

/// SHA-256 of program code, hex encoded
pub fn source_digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

fn default_origin() -> String {
    "<string>".to_string()
}

fn default_return_value() -> Value {
    Value::None
}

/// Call context captured at one recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub id: ContextId,
    /// Code object name (`<module>`, a function name, `<listcomp>`, ...)
    pub name: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub locals: IndexMap<String, Value>,
}

impl RecordedFrame {
    pub fn new(id: ContextId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            origin: default_origin(),
            locals: IndexMap::new(),
        }
    }

    /// Add a local binding
    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }
}

impl CallContext for RecordedFrame {
    fn id(&self) -> ContextId {
        self.id
    }

    fn code_name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn locals(&self) -> Vec<(&str, &Value)> {
        self.locals
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }
}

/// One recorded execution event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RecordedEvent {
    /// A statement was about to run
    Line { frame: RecordedFrame, line: usize },
    /// A call was about to return
    Return {
        frame: RecordedFrame,
        line: usize,
        #[serde(default = "default_return_value")]
        value: Value,
    },
}

/// Recorded event stream of one program run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedRun {
    /// Digest of the program the events were recorded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
    pub events: Vec<RecordedEvent>,
}

impl RecordedRun {
    /// Create a recording that replays for any program
    pub fn new(events: Vec<RecordedEvent>) -> Self {
        Self {
            source_digest: None,
            events,
        }
    }

    /// Create a recording bound to the program `code`
    pub fn for_program(code: &str, events: Vec<RecordedEvent>) -> Self {
        Self {
            source_digest: Some(source_digest(code)),
            events,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ExecutionHost for RecordedRun {
    fn run(&mut self, code: &str, observer: &mut dyn ExecutionObserver) -> Result<()> {
        if let Some(expected) = &self.source_digest {
            let actual = source_digest(code);
            if actual != *expected {
                anyhow::bail!(
                    "Recorded run does not match program: expected digest {}, got {}",
                    expected,
                    actual
                );
            }
        }

        tracing::debug!("Replaying {} recorded events", self.events.len());
        for (n, event) in self.events.iter().enumerate() {
            let flow = match event {
                RecordedEvent::Line { frame, line } => observer.on_line(frame, *line),
                RecordedEvent::Return { frame, line, value } => {
                    observer.on_return(frame, *line, value)
                }
            };
            if flow == Flow::Halt {
                tracing::debug!("Replay halted after {} of {} events", n + 1, self.events.len());
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts events and halts after a fixed number
    struct Counter {
        seen: usize,
        halt_after: usize,
    }

    impl ExecutionObserver for Counter {
        fn on_line(&mut self, _context: &dyn CallContext, _line: usize) -> Flow {
            self.seen += 1;
            if self.seen >= self.halt_after {
                Flow::Halt
            } else {
                Flow::Continue
            }
        }

        fn on_return(&mut self, context: &dyn CallContext, line: usize, _value: &Value) -> Flow {
            self.on_line(context, line)
        }
    }

    fn module_line(line: usize) -> RecordedEvent {
        RecordedEvent::Line {
            frame: RecordedFrame::new(1, "<module>"),
            line,
        }
    }

    #[test]
    fn test_source_digest_is_sha256_hex() {
        assert_eq!(
            source_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(source_digest("x = 1\n").len(), 64);
    }

    #[test]
    fn test_replay_stops_on_halt() {
        let mut run = RecordedRun::new((1..=5).map(module_line).collect());
        let mut counter = Counter { seen: 0, halt_after: 3 };

        run.run("", &mut counter).unwrap();

        assert_eq!(counter.seen, 3);
    }

    #[test]
    fn test_digest_mismatch_is_rejected() {
        let mut run = RecordedRun::for_program("x = 1\n", vec![module_line(1)]);
        let mut counter = Counter { seen: 0, halt_after: 10 };

        let err = run.run("x = 2\n", &mut counter).unwrap_err();

        assert!(err.to_string().contains("does not match program"));
        assert_eq!(counter.seen, 0);
        assert!(run.run("x = 1\n", &mut counter).is_ok());
        assert_eq!(counter.seen, 1);
    }

    #[test]
    fn test_recording_from_json() {
        let json = r#"{
            "events": [
                {"event": "line", "frame": {"id": 7, "name": "fib", "locals": {"n": {"int": 3}}}, "line": 2},
                {"event": "return", "frame": {"id": 7, "name": "fib"}, "line": 4}
            ]
        }"#;

        let run = RecordedRun::from_json(json).unwrap();

        assert!(run.source_digest.is_none());
        match &run.events[0] {
            RecordedEvent::Line { frame, line } => {
                assert_eq!(*line, 2);
                assert_eq!(frame.origin(), "<string>");
                assert_eq!(frame.locals(), vec![("n", &Value::Int(3))]);
            }
            other => panic!("expected line event, got {other:?}"),
        }
        match &run.events[1] {
            RecordedEvent::Return { value, .. } => assert_eq!(*value, Value::None),
            other => panic!("expected return event, got {other:?}"),
        }
    }
}
