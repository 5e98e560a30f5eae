use crate::diff::DiffStats;
use crate::error::Result;
use crate::review::{PersistedReviewRun, ProgressEvent};
use crate::scope::ReviewScope;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Everything the backend needs to start one review run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub thread_id: String,
    pub diff: String,
    pub scope: ReviewScope,
    pub scope_label: String,
    pub scope_context: String,
    #[serde(flatten)]
    pub stats: DiffStats,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAck {
    pub run_id: String,
    #[serde(default)]
    pub diff_truncated: bool,
}

/// The review service as seen by the engine.
///
/// Dropping a stream returned by `subscribe` unsubscribes it.
pub trait ReviewBackend: Send + Sync {
    fn request_review(&self, request: RunRequest) -> BoxFuture<'_, Result<RunAck>>;

    fn fetch_runs<'a>(&'a self, thread_id: &'a str)
        -> BoxFuture<'a, Result<Vec<PersistedReviewRun>>>;

    fn subscribe(&self, thread_id: &str) -> Result<BoxStream<'static, ProgressEvent>>;
}
