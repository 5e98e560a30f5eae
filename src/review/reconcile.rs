use super::models::{
    is_optimistic_run_id, sort_chunks, trim_progress_events, Chunk, Finding, PersistedReviewRun,
    ReviewRun,
};
use super::status::resolve_review_run_status_from_progress;
use crate::scope::{review_scope_label, sanitize_review_scope};
use std::collections::HashSet;
use tracing::debug;

/// Converts a backend snapshot into a `ReviewRun`, resolving its status
/// against its own event log.
pub fn map_persisted_review_run(persisted: &PersistedReviewRun) -> ReviewRun {
    let mut progress_events = persisted.progress_events.clone();
    trim_progress_events(&mut progress_events);

    let status = resolve_review_run_status_from_progress(
        persisted.status.as_deref().unwrap_or_default(),
        &progress_events,
    );

    let scope = persisted
        .scope
        .clone()
        .map(sanitize_review_scope)
        .unwrap_or_default();
    let scope_label = persisted
        .scope_label
        .as_deref()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| review_scope_label(&scope));

    let mut chunks: Vec<Chunk> = Vec::with_capacity(persisted.chunks.len());
    for chunk in &persisted.chunks {
        match chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk.clone(),
            None => chunks.push(chunk.clone()),
        }
    }
    sort_chunks(&mut chunks);

    let mut seen = HashSet::new();
    let findings: Vec<Finding> = persisted
        .findings
        .iter()
        .filter(|f| seen.insert(f.id.as_str()))
        .cloned()
        .collect();

    ReviewRun {
        id: persisted.id.clone(),
        status,
        scope,
        scope_label,
        started_at: persisted.started_at.unwrap_or_default(),
        ended_at: persisted.ended_at,
        model: persisted.model.clone(),
        review: persisted.review.clone(),
        diff_truncated: persisted.diff_truncated,
        error: persisted.error.clone(),
        progress_events,
        chunks,
        findings,
    }
}

/// Merges locally held runs with a freshly fetched persisted list.
///
/// A poll that still reports a run as active cannot revert a run the client
/// already saw finish. Local runs missing from the persisted list survive only
/// while active or optimistic. Result order: local-only runs, then the
/// persisted runs in server order.
pub fn merge_persisted_review_runs(
    local_runs: &[ReviewRun],
    persisted_runs: &[PersistedReviewRun],
) -> Vec<ReviewRun> {
    let persisted_ids: HashSet<&str> = persisted_runs.iter().map(|r| r.id.as_str()).collect();

    let merged = persisted_runs.iter().map(|persisted| {
        let mapped = map_persisted_review_run(persisted);
        match local_runs.iter().find(|local| local.id == mapped.id) {
            Some(local) if local.is_terminal() && mapped.is_active() => {
                debug!(
                    run_id = %local.id,
                    local_status = %local.status,
                    persisted_status = %mapped.status,
                    "stale poll reports finished run as active, keeping local status"
                );
                keep_local_terminal(local, mapped)
            }
            _ => mapped,
        }
    });

    let local_only = local_runs
        .iter()
        .filter(|local| !persisted_ids.contains(local.id.as_str()))
        .filter(|local| local.is_active() || is_optimistic_run_id(&local.id))
        .cloned();

    local_only.chain(merged).collect()
}

fn keep_local_terminal(local: &ReviewRun, persisted: ReviewRun) -> ReviewRun {
    let mut run = local.clone();

    if persisted.review.as_deref().is_some_and(|text| !text.is_empty()) {
        run.review = persisted.review;
    }
    if persisted.progress_events.len() > run.progress_events.len() {
        run.progress_events = persisted.progress_events;
    }
    if persisted.chunks.len() > run.chunks.len() {
        run.chunks = persisted.chunks;
    }
    if persisted.findings.len() > run.findings.len() {
        run.findings = persisted.findings;
    }

    run
}
