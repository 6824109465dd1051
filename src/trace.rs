//! Decision trace capture for resolutions.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::gates::{GateReport, PassKind};
use crate::scale::{ResolutionMode, Scaled};
use crate::scoring::ScoredCandidate;
use crate::select::{Selection, SelectionMethod};

/// Candidates kept per pass in the trace.
pub const TRACE_TOP_CANDIDATES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Debug requests never read or write the cache.
    Bypassed,
    Disabled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    CacheHit,
    Catalog,
    Generative,
    Stub,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheTrace {
    pub key_hash: String,
    pub status: CacheStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineTrace {
    pub mode: Option<ResolutionMode>,
    pub confidence: f64,
    pub calories: Option<f64>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateTrace {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub token_score: f64,
}

impl From<&ScoredCandidate> for CandidateTrace {
    fn from(scored: &ScoredCandidate) -> Self {
        Self {
            id: scored.candidate.id.clone(),
            name: scored.candidate.name.clone(),
            brand: scored.candidate.brand.clone(),
            token_score: scored.token_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionTrace {
    pub method: SelectionMethod,
    pub index: Option<usize>,
    pub shortlist_len: usize,
    pub confidence: f64,
    pub chosen_id: Option<String>,
    pub error: Option<String>,
}

impl From<&Selection> for SelectionTrace {
    fn from(selection: &Selection) -> Self {
        Self {
            method: selection.method,
            index: selection.index,
            shortlist_len: selection.shortlist_len,
            confidence: selection.selection_confidence,
            chosen_id: selection.chosen.as_ref().map(|c| c.candidate.id.clone()),
            error: selection.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassTrace {
    pub kind: PassKind,
    pub query: String,
    pub catalog_error: Option<String>,
    pub candidate_count: usize,
    pub top_candidates: Vec<CandidateTrace>,
    pub selection: Option<SelectionTrace>,
    pub gates: Option<GateReport>,
    pub veto_reason: Option<String>,
    pub accepted: bool,
}

impl PassTrace {
    pub fn new(kind: PassKind, query: impl Into<String>) -> Self {
        Self {
            kind,
            query: query.into(),
            catalog_error: None,
            candidate_count: 0,
            top_candidates: Vec::new(),
            selection: None,
            gates: None,
            veto_reason: None,
            accepted: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionTrace {
    pub request_id: Uuid,
    pub timestamp_ms: i64,
    pub query: String,
    pub normalized_query: String,
    pub explicit_grams: Option<f64>,
    pub explicit_ml: Option<f64>,
    pub cache: CacheTrace,
    pub baseline: Option<BaselineTrace>,
    pub passes: Vec<PassTrace>,
    pub scaling: Option<Scaled>,
    pub outcome: Outcome,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: ResolutionTrace) -> Result<(), TraceError>;
}

#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<ResolutionTrace>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    /// Waits for every queued trace to be written. Drop all sink clones first.
    pub fn join(mut self) -> Result<(), TraceError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<ResolutionTrace>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: ResolutionTrace) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_trace_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<ResolutionTrace>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
