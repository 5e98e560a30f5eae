use super::models::{ProgressEvent, ProgressEventStatus, ReviewRun, ReviewRunStatus};
use tracing::debug;

/// Maps a backend status string onto the closed status set.
///
/// Unrecognized values become `Running` so a newer backend vocabulary never
/// leaves a run in a broken state.
pub fn normalize_review_run_status(raw: &str) -> ReviewRunStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "queued" => ReviewRunStatus::Queued,
        "running" => ReviewRunStatus::Running,
        "completed" => ReviewRunStatus::Completed,
        "completed_with_errors" | "completed-with-errors" => ReviewRunStatus::CompletedWithErrors,
        "failed" => ReviewRunStatus::Failed,
        "canceled" | "cancelled" => ReviewRunStatus::Canceled,
        other => {
            debug!(status = other, "unrecognized run status, treating as running");
            ReviewRunStatus::Running
        }
    }
}

pub fn is_active_review_run_status(status: ReviewRunStatus) -> bool {
    status.is_active()
}

pub fn is_terminal_review_run_status(status: ReviewRunStatus) -> bool {
    status.is_terminal()
}

/// Infers how a run ended from its event log alone.
///
/// The newest explicitly terminal event wins. Otherwise the newest event that
/// is not a `description-delta` must report all chunks done; the run then
/// completed, with errors if any chunk or description step failed anywhere in
/// the log. Returns `None` when the log does not show the run finished.
pub fn derive_terminal_status_from_progress_events(
    events: &[ProgressEvent],
) -> Option<ReviewRunStatus> {
    if let Some(status) = events.iter().rev().find_map(|e| e.status.terminal_status()) {
        return Some(status);
    }

    let latest = events
        .iter()
        .rev()
        .find(|e| e.status != ProgressEventStatus::DescriptionDelta)?;

    if latest.total_chunks == 0 || latest.completed_chunks < latest.total_chunks {
        return None;
    }

    if events.iter().any(|e| e.status.is_failure_marker()) {
        Some(ReviewRunStatus::CompletedWithErrors)
    } else {
        Some(ReviewRunStatus::Completed)
    }
}

/// Resolves an already-normalized status against the event log.
///
/// Terminal statuses are final; active ones may be promoted by the log.
pub fn resolve_run_status(status: ReviewRunStatus, events: &[ProgressEvent]) -> ReviewRunStatus {
    if status.is_terminal() {
        return status;
    }
    derive_terminal_status_from_progress_events(events).unwrap_or(status)
}

pub fn resolve_review_run_status_from_progress(
    status: &str,
    events: &[ProgressEvent],
) -> ReviewRunStatus {
    resolve_run_status(normalize_review_run_status(status), events)
}

pub fn has_active_review_runs(runs: &[ReviewRun]) -> bool {
    runs.iter().any(ReviewRun::is_active)
}
