use crate::scope::{review_scope_label, ReviewScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the progress log kept per run; older entries are dropped first.
pub const MAX_PROGRESS_EVENTS: usize = 160;

/// Id prefix of runs created locally before the backend acknowledged them.
pub const OPTIMISTIC_RUN_PREFIX: &str = "run-pending-";

/// Placeholder id for a run started at `now`. `seq` tells apart runs started
/// within the same millisecond.
pub fn optimistic_run_id(now: DateTime<Utc>, seq: u64) -> String {
    format!("{OPTIMISTIC_RUN_PREFIX}{}-{seq}", now.timestamp_millis())
}

pub fn is_optimistic_run_id(id: &str) -> bool {
    id.starts_with(OPTIMISTIC_RUN_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRunStatus {
    Queued,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Canceled,
}

impl ReviewRunStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ReviewRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a progress event as reported by the backend.
///
/// Kinds outside the known vocabulary are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProgressEventStatus {
    Queued,
    Started,
    ChunkStart,
    ChunkComplete,
    ChunkFailed,
    DescriptionStart,
    DescriptionDelta,
    DescriptionFailed,
    Completed,
    CompletedWithErrors,
    Failed,
    Canceled,
    Other(String),
}

impl ProgressEventStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::ChunkStart => "chunk-start",
            Self::ChunkComplete => "chunk-complete",
            Self::ChunkFailed => "chunk-failed",
            Self::DescriptionStart => "description-start",
            Self::DescriptionDelta => "description-delta",
            Self::DescriptionFailed => "description-failed",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(raw) => raw,
        }
    }

    /// The run status this event kind ends a run with, if any.
    pub fn terminal_status(&self) -> Option<ReviewRunStatus> {
        match self {
            Self::Completed => Some(ReviewRunStatus::Completed),
            Self::CompletedWithErrors => Some(ReviewRunStatus::CompletedWithErrors),
            Self::Failed => Some(ReviewRunStatus::Failed),
            Self::Canceled => Some(ReviewRunStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_failure_marker(&self) -> bool {
        matches!(self, Self::ChunkFailed | Self::DescriptionFailed)
    }
}

impl From<String> for ProgressEventStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "queued" => Self::Queued,
            "started" => Self::Started,
            "chunk-start" => Self::ChunkStart,
            "chunk-complete" => Self::ChunkComplete,
            "chunk-failed" => Self::ChunkFailed,
            "description-start" => Self::DescriptionStart,
            "description-delta" => Self::DescriptionDelta,
            "description-failed" => Self::DescriptionFailed,
            "completed" => Self::Completed,
            "completed_with_errors" => Self::CompletedWithErrors,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::Other(raw),
        }
    }
}

impl From<ProgressEventStatus> for String {
    fn from(status: ProgressEventStatus) -> Self {
        match status {
            ProgressEventStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ProgressEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    #[serde(default)]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub thread_id: String,
    pub status: ProgressEventStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total_chunks: u32,
    #[serde(default)]
    pub completed_chunks: u32,
    #[serde(default)]
    pub chunk: Option<Chunk>,
    #[serde(default)]
    pub finding: Option<Finding>,
}

impl ProgressEvent {
    pub fn new(run_id: impl Into<String>, status: ProgressEventStatus) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: String::new(),
            status,
            message: None,
            total_chunks: 0,
            completed_chunks: 0,
            chunk: None,
            finding: None,
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRun {
    pub id: String,
    pub status: ReviewRunStatus,
    pub scope: ReviewScope,
    pub scope_label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub review: Option<String>,
    pub diff_truncated: bool,
    pub error: Option<String>,
    pub progress_events: Vec<ProgressEvent>,
    /// Sorted by file path, then chunk index.
    pub chunks: Vec<Chunk>,
    pub findings: Vec<Finding>,
}

impl ReviewRun {
    /// A queued run with empty collections.
    pub fn new(id: impl Into<String>, scope: ReviewScope, started_at: DateTime<Utc>) -> Self {
        let scope_label = review_scope_label(&scope);
        Self {
            id: id.into(),
            status: ReviewRunStatus::Queued,
            scope,
            scope_label,
            started_at,
            ended_at: None,
            model: None,
            review: None,
            diff_truncated: false,
            error: None,
            progress_events: Vec::new(),
            chunks: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_optimistic(&self) -> bool {
        is_optimistic_run_id(&self.id)
    }

    pub(crate) fn push_progress_event(&mut self, event: ProgressEvent) {
        self.progress_events.push(event);
        trim_progress_events(&mut self.progress_events);
    }

    pub(crate) fn upsert_chunk(&mut self, chunk: Chunk) {
        match self.chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk,
            None => self.chunks.push(chunk),
        }
        sort_chunks(&mut self.chunks);
    }

    /// Returns false when a finding with the same id is already recorded.
    pub(crate) fn insert_finding(&mut self, finding: Finding) -> bool {
        if self.findings.iter().any(|f| f.id == finding.id) {
            return false;
        }
        self.findings.push(finding);
        true
    }
}

pub(crate) fn trim_progress_events(events: &mut Vec<ProgressEvent>) {
    if events.len() > MAX_PROGRESS_EVENTS {
        let overflow = events.len() - MAX_PROGRESS_EVENTS;
        events.drain(..overflow);
    }
}

pub(crate) fn sort_chunks(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
}

/// Run snapshot as stored by the backend. Status is an unvalidated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedReviewRun {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scope: Option<ReviewScope>,
    #[serde(default)]
    pub scope_label: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub review: Option<String>,
    #[serde(default)]
    pub diff_truncated: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress_events: Vec<ProgressEvent>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_status_round_trips_unknown_kinds() {
        let event: ProgressEvent =
            serde_json::from_str(r#"{"runId":"r1","status":"chunk-retry"}"#).unwrap();
        assert_eq!(
            event.status,
            ProgressEventStatus::Other("chunk-retry".to_string())
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "chunk-retry");
    }

    #[test]
    fn event_fields_use_backend_names() {
        let event: ProgressEvent = serde_json::from_str(
            r#"{
                "runId": "r1",
                "threadId": "t1",
                "status": "chunk-complete",
                "message": null,
                "totalChunks": 3,
                "completedChunks": 1,
                "chunk": {"id": "c1", "chunkIndex": 0, "filePath": "a.rs"}
            }"#,
        )
        .unwrap();
        assert_eq!(event.status, ProgressEventStatus::ChunkComplete);
        assert_eq!(event.message(), "");
        assert_eq!(event.total_chunks, 3);
        assert_eq!(event.chunk.unwrap().file_path, "a.rs");
    }

    #[test]
    fn progress_log_is_capped() {
        let mut run = ReviewRun::new("r1", ReviewScope::Full, Utc::now());
        for i in 0..(MAX_PROGRESS_EVENTS + 25) {
            let mut event = ProgressEvent::new("r1", ProgressEventStatus::ChunkStart);
            event.completed_chunks = i as u32;
            run.push_progress_event(event);
        }
        assert_eq!(run.progress_events.len(), MAX_PROGRESS_EVENTS);
        assert_eq!(run.progress_events[0].completed_chunks, 25);
    }

    #[test]
    fn chunks_stay_sorted_and_unique() {
        let mut run = ReviewRun::new("r1", ReviewScope::Full, Utc::now());
        let chunk = |id: &str, path: &str, index: u32| Chunk {
            id: id.to_string(),
            chunk_index: index,
            file_path: path.to_string(),
            status: None,
            summary: None,
        };
        run.upsert_chunk(chunk("c3", "b.rs", 0));
        run.upsert_chunk(chunk("c2", "a.rs", 1));
        run.upsert_chunk(chunk("c1", "a.rs", 0));
        run.upsert_chunk(chunk("c2", "a.rs", 1));

        let ids: Vec<&str> = run.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn optimistic_ids() {
        assert!(is_optimistic_run_id("run-pending-123"));
        assert!(!is_optimistic_run_id("r1"));
        let now = Utc::now();
        assert!(optimistic_run_id(now, 0).starts_with(OPTIMISTIC_RUN_PREFIX));
        assert_ne!(optimistic_run_id(now, 0), optimistic_run_id(now, 1));
    }
}
