use crate::backend::{ReviewBackend, RunAck, RunRequest};
use crate::error::{EngineError, Result};
use crate::review::{PersistedReviewRun, ProgressEvent};
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, StreamExt};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Backend that replays recorded progress events and persisted run snapshots.
///
/// Events come from a JSON-lines file, persisted runs from a JSON array. Every
/// subscription replays the events whose thread id is blank or matches.
pub struct ReplayBackend {
    events: Vec<ProgressEvent>,
    persisted: Mutex<Vec<PersistedReviewRun>>,
    requests: Mutex<Vec<RunRequest>>,
    next_run: AtomicUsize,
}

impl ReplayBackend {
    pub fn new(events: Vec<ProgressEvent>, persisted: Vec<PersistedReviewRun>) -> Self {
        Self {
            events,
            persisted: Mutex::new(persisted),
            requests: Mutex::new(Vec::new()),
            next_run: AtomicUsize::new(1),
        }
    }

    pub fn from_files(events_path: &Path, persisted_path: Option<&Path>) -> Result<Self> {
        let events = parse_event_lines(&fs::read_to_string(events_path)?)?;
        let persisted = match persisted_path {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => Vec::new(),
        };
        Ok(Self::new(events, persisted))
    }

    /// Replaces the snapshot returned by later `fetch_runs` calls.
    pub fn set_persisted(&self, persisted: Vec<PersistedReviewRun>) -> Result<()> {
        *self.persisted.lock().map_err(|_| poisoned())? = persisted;
        Ok(())
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Result<Vec<RunRequest>> {
        Ok(self.requests.lock().map_err(|_| poisoned())?.clone())
    }
}

/// Parses one JSON event per line; blank lines are skipped.
pub fn parse_event_lines(text: &str) -> Result<Vec<ProgressEvent>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(EngineError::from))
        .collect()
}

fn poisoned() -> EngineError {
    EngineError::Backend("replay state lock poisoned".to_string())
}

impl ReviewBackend for ReplayBackend {
    fn request_review(&self, request: RunRequest) -> BoxFuture<'_, Result<RunAck>> {
        let run_id = format!("replay-{}", self.next_run.fetch_add(1, Ordering::SeqCst));
        let result = self
            .requests
            .lock()
            .map_err(|_| poisoned())
            .map(|mut requests| {
                debug!(run_id = %run_id, scope = %request.scope_label, "recorded review request");
                requests.push(request);
                RunAck {
                    run_id,
                    diff_truncated: false,
                }
            });
        Box::pin(future::ready(result))
    }

    fn fetch_runs<'a>(
        &'a self,
        _thread_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PersistedReviewRun>>> {
        let result = self
            .persisted
            .lock()
            .map(|runs| runs.clone())
            .map_err(|_| poisoned());
        Box::pin(future::ready(result))
    }

    fn subscribe(&self, thread_id: &str) -> Result<BoxStream<'static, ProgressEvent>> {
        let events: Vec<ProgressEvent> = self
            .events
            .iter()
            .filter(|e| e.thread_id.is_empty() || e.thread_id == thread_id)
            .cloned()
            .collect();
        Ok(stream::iter(events).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::ProgressEventStatus;

    #[test]
    fn parses_event_lines() {
        let text = r#"
{"runId":"r1","threadId":"t1","status":"started","totalChunks":1}

{"runId":"r1","threadId":"t1","status":"completed"}
"#;
        let events = parse_event_lines(text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, ProgressEventStatus::Completed);
    }

    #[test]
    fn bad_line_is_an_error() {
        assert!(matches!(
            parse_event_lines("{not json}"),
            Err(EngineError::Json(_))
        ));
    }

    #[tokio::test]
    async fn subscription_filters_by_thread() {
        let mut other = ProgressEvent::new("r2", ProgressEventStatus::Started);
        other.thread_id = "t2".to_string();
        let backend = ReplayBackend::new(
            vec![ProgressEvent::new("r1", ProgressEventStatus::Started), other],
            Vec::new(),
        );

        let events: Vec<ProgressEvent> = backend.subscribe("t1").unwrap().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, "r1");
    }
}
