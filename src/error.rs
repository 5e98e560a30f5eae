use thiserror::Error;

/// Errors raised at the edges of the engine (backend calls, fixture loading).
///
/// The diff, scope and run functions themselves are total and never fail.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no review thread selected")]
    NoThread,
    #[error("no diff loaded")]
    NoDiff,
}

pub type Result<T> = std::result::Result<T, EngineError>;
