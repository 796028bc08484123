//! End-to-end tests: program text and a recorded run in, tutor artifact out

use py_tracer::{ExecutionHost, ExecutionObserver, LineKey, TracerConfig, Value};
use serde_json::json;
use tutor::{build_trace, RecordedEvent, RecordedFrame, RecordedRun, TutorConfig};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const LOOP_PROGRAM: &str = "total = 0\nfor i in range(2):\n    total += i\nprint(total)\n";

fn module(locals: &[(&str, Value)]) -> RecordedFrame {
    locals
        .iter()
        .fold(RecordedFrame::new(1, "<module>"), |frame, (name, value)| {
            frame.with_local(*name, value.clone())
        })
        .with_local("__builtins__", Value::Module("builtins".into()))
}

fn line(line: usize, locals: &[(&str, Value)]) -> RecordedEvent {
    RecordedEvent::Line {
        frame: module(locals),
        line,
    }
}

fn loop_program_events() -> Vec<RecordedEvent> {
    let int = Value::Int;
    vec![
        line(1, &[]),
        line(2, &[("total", int(0))]),
        line(3, &[("total", int(0)), ("i", int(0))]),
        line(2, &[("total", int(0)), ("i", int(0))]),
        line(3, &[("total", int(0)), ("i", int(1))]),
        line(2, &[("total", int(1)), ("i", int(1))]),
        line(4, &[("total", int(1)), ("i", int(1))]),
        RecordedEvent::Return {
            frame: module(&[("total", int(1)), ("i", int(1))]),
            line: 4,
            value: Value::None,
        },
    ]
}

/// Host that must never be asked to run anything
struct UnreachableHost;

impl ExecutionHost for UnreachableHost {
    fn run(&mut self, _code: &str, _observer: &mut dyn ExecutionObserver) -> anyhow::Result<()> {
        panic!("host should not run a program that failed analysis");
    }
}

#[test]
fn test_loop_program_artifact() {
    init_logging();
    let mut host = RecordedRun::for_program(LOOP_PROGRAM, loop_program_events());

    let artifact = build_trace(LOOP_PROGRAM, &mut host, &TutorConfig::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&artifact.to_json().unwrap()).unwrap();

    assert_eq!(value[0], json!({"0": ["total"], "1": ["i"], "2": ["total"]}));

    let trace = value[1].as_object().unwrap();
    let keys: Vec<&String> = trace.keys().collect();
    assert_eq!(keys, vec!["0", "1", "2", "3", "R3"]);

    assert_eq!(
        trace["0"],
        json!([{"time": 0, "#": "", "$": "", "lineno": 0, "next_lineno": 1}])
    );
    assert_eq!(
        trace["2"],
        json!([
            {"begin_loop": "0", "#": "0", "$": "1"},
            {"time": 2, "#": "0", "$": "1", "total": "0", "i": "0",
             "lineno": 2, "prev_lineno": 1, "next_lineno": 1},
            {"time": 4, "#": "1", "$": "1", "total": "0", "i": "1",
             "lineno": 2, "prev_lineno": 1, "next_lineno": 1},
            {"end_loop": "2", "#": "2", "$": "1"},
        ])
    );
    assert_eq!(
        trace["R3"],
        json!([{"time": 7, "#": "", "$": "", "total": "1", "i": "1",
                "lineno": "R3", "prev_lineno": 3, "rv": "None"}])
    );
    assert!(artifact.repaired_lines().is_empty());
}

#[test]
fn test_header_revisits_are_iterations() {
    let mut host = RecordedRun::new(loop_program_events());

    let artifact = build_trace(LOOP_PROGRAM, &mut host, &TutorConfig::default()).unwrap();
    let header_steps: Vec<&[usize]> = artifact
        .trace
        .at(LineKey::Line(1))
        .iter()
        .map(|record| record.loops().iterations.as_slice())
        .collect();

    assert_eq!(header_steps, vec![&[][..], &[0][..], &[1][..]]);
    assert_eq!(artifact.step_count(), 8);
}

#[test]
fn test_recording_survives_json() {
    let recorded = RecordedRun::for_program(LOOP_PROGRAM, loop_program_events());
    let mut replayed = RecordedRun::from_json(&recorded.to_json().unwrap()).unwrap();
    let mut direct = recorded.clone();

    let from_json = build_trace(LOOP_PROGRAM, &mut replayed, &TutorConfig::default()).unwrap();
    let from_memory = build_trace(LOOP_PROGRAM, &mut direct, &TutorConfig::default()).unwrap();

    assert_eq!(from_json, from_memory);
}

#[test]
fn test_recording_for_another_program_fails() {
    let mut host = RecordedRun::for_program("total = 1\n", loop_program_events());

    let err = build_trace(LOOP_PROGRAM, &mut host, &TutorConfig::default()).unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("Failed to trace program execution"));
    assert!(message.contains("does not match program"));
}

#[test]
fn test_step_budget_truncates_trace() {
    init_logging();
    let config = TutorConfig::new(TracerConfig::new(3, "<string>"), true);
    let mut host = RecordedRun::new(loop_program_events());

    let artifact = build_trace(LOOP_PROGRAM, &mut host, &config).unwrap();
    let steps = artifact.trace.steps();

    assert_eq!(steps.len(), 3);
    assert_eq!(steps.last().unwrap().time, 2);
    assert_eq!(steps.last().unwrap().next_line, None);
}

#[test]
fn test_parse_error_precedes_tracing() {
    let err = build_trace("x = 1\nfor i in\n", &mut UnreachableHost, &TutorConfig::default())
        .unwrap_err();

    assert!(format!("{err:#}").contains("Failed to analyse program writes"));
}

#[test]
fn test_prepared_source_hides_reserved_variable() {
    let program = "x = 1\n\ny = x  # copy\n";
    let reserved = RecordedEvent::Line {
        frame: module(&[("x", Value::Int(1)), ("__run_py__", Value::Int(0))]),
        line: 3,
    };
    let mut host = RecordedRun::new(vec![line(1, &[]), line(2, &[("x", Value::Int(1))]), reserved]);

    let artifact = build_trace(program, &mut host, &TutorConfig::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&artifact.to_json().unwrap()).unwrap();

    assert_eq!(value[0], json!({"0": ["x"], "2": ["y"]}));
    assert_eq!(
        value[1]["2"],
        json!([{"time": 2, "#": "", "$": "", "x": "1", "lineno": 2, "prev_lineno": 1}])
    );
}

#[test]
fn test_repaired_line_is_blanked_for_tracing() {
    init_logging();
    let program = "x = 1\n        __run_py__ = 0\ny = 2\n";
    let config = TutorConfig::new(TracerConfig::default(), false);
    let events = vec![line(1, &[]), line(3, &[("x", Value::Int(1))])];
    let mut host = RecordedRun::for_program("x = 1\n\ny = 2\n", events);

    let artifact = build_trace(program, &mut host, &config).unwrap();

    assert_eq!(artifact.repaired_lines(), &[1]);
    assert_eq!(artifact.step_count(), 2);
    assert_eq!(artifact.writes.at(2), ["y"]);
}
