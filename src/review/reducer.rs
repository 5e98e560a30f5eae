use super::models::{ProgressEvent, ProgressEventStatus, ReviewRun, ReviewRunStatus};
use super::status::resolve_run_status;
use crate::scope::ReviewScope;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

const DEFAULT_FAILURE_MESSAGE: &str = "Review failed";
const DEFAULT_DESCRIPTION_FAILURE: &str = "Review description failed";

/// Reported when an event moved a run from an active to a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTransition {
    pub run_id: String,
    pub status: ReviewRunStatus,
}

/// Applies one live progress event to the run list.
///
/// Unknown run ids create a queued run at the front of the list. The update is
/// synchronous and complete before returning. Returns the transition when the
/// event finished its run, so the caller can trigger a refresh.
pub fn apply_progress_event(
    runs: &mut Vec<ReviewRun>,
    event: &ProgressEvent,
    now: DateTime<Utc>,
) -> Option<RunTransition> {
    let run_id = event.run_id.trim();
    if run_id.is_empty() {
        debug!(status = %event.status, "dropping progress event without run id");
        return None;
    }

    let index = match runs.iter().position(|run| run.id == run_id) {
        Some(index) => index,
        None => {
            debug!(run_id, "first event for unknown run, creating it");
            runs.insert(0, ReviewRun::new(run_id, ReviewScope::Full, now));
            0
        }
    };

    let run = &mut runs[index];
    let was_active = run.is_active();
    apply_to_run(run, event, now);

    if was_active && run.is_terminal() {
        Some(RunTransition {
            run_id: run.id.clone(),
            status: run.status,
        })
    } else {
        None
    }
}

fn apply_to_run(run: &mut ReviewRun, event: &ProgressEvent, now: DateTime<Utc>) {
    if event.status != ProgressEventStatus::DescriptionDelta {
        run.push_progress_event(event.clone());
    }

    match event.status {
        ProgressEventStatus::DescriptionStart => run.review = Some(String::new()),
        ProgressEventStatus::DescriptionDelta => run
            .review
            .get_or_insert_with(String::new)
            .push_str(event.message()),
        _ => {}
    }

    if let Some(chunk) = &event.chunk {
        run.upsert_chunk(chunk.clone());
    }

    if let Some(finding) = &event.finding {
        if !run.insert_finding(finding.clone()) {
            debug!(run_id = %run.id, finding_id = %finding.id, "duplicate finding ignored");
        }
    }

    match &event.status {
        ProgressEventStatus::Queued => set_active_status(run, ReviewRunStatus::Queued),
        ProgressEventStatus::Started => {
            if run.is_active() {
                run.status = ReviewRunStatus::Running;
                run.error = None;
            }
        }
        ProgressEventStatus::DescriptionFailed => {
            if run.error.is_none() {
                run.error = Some(message_or(event, DEFAULT_DESCRIPTION_FAILURE));
            }
        }
        ProgressEventStatus::Other(raw) => {
            warn!(run_id = %run.id, status = %raw, "unknown progress event kind");
        }
        status => {
            if let Some(terminal) = status.terminal_status() {
                finish(run, terminal, now);
                if run.status == ReviewRunStatus::Failed && run.error.is_none() {
                    run.error = Some(message_or(event, DEFAULT_FAILURE_MESSAGE));
                }
            }
        }
    }

    // The event log must agree with the per-event rule.
    let resolved = resolve_run_status(run.status, &run.progress_events);
    if resolved != run.status {
        debug!(run_id = %run.id, from = %run.status, to = %resolved, "status inferred from event log");
        finish(run, resolved, now);
    }
}

fn set_active_status(run: &mut ReviewRun, status: ReviewRunStatus) {
    if run.is_active() {
        run.status = status;
    }
}

/// Terminal statuses stick; `ended_at` is only stamped once.
fn finish(run: &mut ReviewRun, status: ReviewRunStatus, now: DateTime<Utc>) {
    if run.is_terminal() {
        return;
    }
    run.status = status;
    if status.is_terminal() {
        run.ended_at.get_or_insert(now);
    }
}

fn message_or(event: &ProgressEvent, fallback: &str) -> String {
    let message = event.message().trim();
    if message.is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}
