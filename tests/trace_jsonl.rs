use nutrition_resolver::trace::{CacheStatus, CacheTrace, Outcome};
use nutrition_resolver::{JsonlTraceSink, ResolutionTrace, TraceSink};
use tempfile::tempdir;
use uuid::Uuid;

#[derive(Debug, serde::Deserialize)]
struct TraceRow {
    query: String,
    outcome: String,
    cache: CacheRow,
}

#[derive(Debug, serde::Deserialize)]
struct CacheRow {
    status: String,
}

fn make_trace(query: &str) -> ResolutionTrace {
    ResolutionTrace {
        request_id: Uuid::new_v4(),
        timestamp_ms: 0,
        query: query.to_string(),
        normalized_query: query.to_lowercase(),
        explicit_grams: None,
        explicit_ml: None,
        cache: CacheTrace {
            key_hash: "key_hash".to_string(),
            status: CacheStatus::Miss,
            error: None,
        },
        baseline: None,
        passes: Vec::new(),
        scaling: None,
        outcome: Outcome::Generative,
    }
}

#[test]
fn jsonl_trace_sink_writes_events_and_flushes_on_join() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    sink.record(make_trace("1 banana")).unwrap();
    sink.record(make_trace("2 eggs")).unwrap();

    drop(sink);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: TraceRow = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first.query, "1 banana");
    assert_eq!(first.outcome, "generative");
    assert_eq!(first.cache.status, "miss");
}

#[test]
fn jsonl_trace_sink_clones_share_one_writer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    let other = sink.clone();
    sink.record(make_trace("a")).unwrap();
    other.record(make_trace("b")).unwrap();

    drop(sink);
    drop(other);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 2);
}
