use crate::backend::{ReviewBackend, RunAck, RunRequest};
use crate::diff::{DiffStats, ParsedPatch};
use crate::error::{EngineError, Result};
use crate::review::{
    apply_progress_event, has_active_review_runs, merge_persisted_review_runs, optimistic_run_id,
    PersistedReviewRun, ProgressEvent, ReviewRun, ReviewRunStatus, RunTransition,
};
use crate::scope::{
    reconcile_scope, review_scope_context, review_scope_label, sanitize_review_scope, ReviewScope,
    ScopedDiffResult,
};
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shortest poll period `run_session` will schedule.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Client-side state for one review thread: the active diff, the selected
/// scope and the known review runs.
#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    thread_id: Option<String>,
    patch: ParsedPatch,
    scope: ReviewScope,
    runs: Vec<ReviewRun>,
    model: Option<String>,
    pending_seq: u64,
}

/// What observers see after each update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub thread_id: Option<String>,
    pub scope: ReviewScope,
    pub scope_label: String,
    pub scoped_stats: Option<DiffStats>,
    pub runs: Vec<ReviewRun>,
    pub has_active_runs: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetDiff(String),
    SetScope(ReviewScope),
    StartReview,
    SelectThread(String),
    Refresh,
    Shutdown,
}

impl ReviewSession {
    pub fn new(thread_id: Option<String>) -> Self {
        Self {
            thread_id: thread_id.filter(|t| !t.trim().is_empty()),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn scope(&self) -> &ReviewScope {
        &self.scope
    }

    pub fn runs(&self) -> &[ReviewRun] {
        &self.runs
    }

    pub fn patch(&self) -> &ParsedPatch {
        &self.patch
    }

    pub fn has_active_runs(&self) -> bool {
        has_active_review_runs(&self.runs)
    }

    /// Replaces the active diff. Returns true when the current scope no longer
    /// exists in it and was reset to the full diff.
    pub fn set_diff(&mut self, patch: &str) -> bool {
        self.patch = ParsedPatch::parse(patch);
        let reconciled = reconcile_scope(&self.scope, &self.patch);
        let reset = reconciled != self.scope;
        if reset {
            info!(
                scope = %review_scope_label(&self.scope),
                "scope missing from new diff, resetting to full diff"
            );
            self.scope = reconciled;
        }
        reset
    }

    /// Selects a scope, keyed by the path the diff records for the file.
    /// Scopes absent from the current diff fall back to the full diff and
    /// return false.
    pub fn set_scope(&mut self, scope: ReviewScope) -> bool {
        let scope = sanitize_review_scope(scope);
        match self.patch.resolve_scope(&scope) {
            Some(resolved) => {
                self.scope = resolved;
                true
            }
            None => {
                warn!(scope = %review_scope_label(&scope), "scope not found in diff");
                self.scope = ReviewScope::Full;
                false
            }
        }
    }

    pub fn scoped_diff(&self) -> Option<ScopedDiffResult> {
        self.patch.scoped_diff(&self.scope)
    }

    /// Inserts an optimistic run for the current scope and returns its
    /// placeholder id with the request to send.
    pub fn start_review(&mut self, now: DateTime<Utc>) -> Result<(String, RunRequest)> {
        let thread_id = self.thread_id.clone().ok_or(EngineError::NoThread)?;
        let scoped = self.scoped_diff().ok_or(EngineError::NoDiff)?;

        let placeholder = optimistic_run_id(now, self.pending_seq);
        self.pending_seq += 1;
        let mut run = ReviewRun::new(placeholder.clone(), self.scope.clone(), now);
        run.model = self.model.clone();

        let request = RunRequest {
            thread_id,
            diff: scoped.diff,
            scope: self.scope.clone(),
            scope_label: run.scope_label.clone(),
            scope_context: review_scope_context(&self.scope),
            stats: scoped.stats,
            model: self.model.clone(),
        };

        debug!(run_id = %placeholder, scope = %run.scope_label, "optimistic run created");
        self.runs.insert(0, run);
        Ok((placeholder, request))
    }

    /// Swaps a placeholder id for the id the backend assigned.
    pub fn acknowledge_run(&mut self, placeholder: &str, ack: &RunAck) {
        if self.runs.iter().any(|r| r.id == ack.run_id) {
            // Events or a poll already introduced the real run.
            self.runs.retain(|r| r.id != placeholder);
            if let Some(run) = self.runs.iter_mut().find(|r| r.id == ack.run_id) {
                run.diff_truncated |= ack.diff_truncated;
            }
            return;
        }
        if let Some(run) = self.runs.iter_mut().find(|r| r.id == placeholder) {
            run.id = ack.run_id.clone();
            run.diff_truncated = ack.diff_truncated;
        }
    }

    /// Marks an optimistic run failed when the backend rejected the request.
    pub fn fail_pending_run(&mut self, placeholder: &str, error: &str, now: DateTime<Utc>) {
        if let Some(run) = self.runs.iter_mut().find(|r| r.id == placeholder) {
            run.status = ReviewRunStatus::Failed;
            run.error = Some(error.to_string());
            run.ended_at.get_or_insert(now);
        }
    }

    /// Applies one live event. Events for another thread are ignored.
    pub fn apply_event(
        &mut self,
        event: &ProgressEvent,
        now: DateTime<Utc>,
    ) -> Option<RunTransition> {
        if let Some(current) = self.thread_id.as_deref() {
            if !event.thread_id.is_empty() && event.thread_id != current {
                debug!(
                    event_thread = %event.thread_id,
                    current_thread = current,
                    "ignoring event for another thread"
                );
                return None;
            }
        }
        apply_progress_event(&mut self.runs, event, now)
    }

    pub fn merge_persisted(&mut self, persisted: &[PersistedReviewRun]) {
        self.runs = merge_persisted_review_runs(&self.runs, persisted);
    }

    /// Switches to another thread, forgetting runs of the previous one.
    pub fn select_thread(&mut self, thread_id: String) {
        if self.thread_id.as_deref() == Some(thread_id.as_str()) {
            return;
        }
        self.thread_id = Some(thread_id).filter(|t| !t.trim().is_empty());
        self.runs.clear();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            thread_id: self.thread_id.clone(),
            scope: self.scope.clone(),
            scope_label: review_scope_label(&self.scope),
            scoped_stats: self.scoped_diff().map(|s| s.stats),
            runs: self.runs.clone(),
            has_active_runs: self.has_active_runs(),
        }
    }
}

/// Drives a session from three sources: the live event subscription, a
/// periodic refresh of persisted runs and user commands.
///
/// Every update runs to completion before the next message is taken, and a
/// snapshot is published after each one. Selecting another thread drops the
/// old subscription. Returns the final session once the command channel
/// closes or `Shutdown` arrives.
pub async fn run_session<B>(
    mut session: ReviewSession,
    backend: &B,
    mut commands: mpsc::Receiver<SessionCommand>,
    updates: watch::Sender<SessionSnapshot>,
    poll_interval: Duration,
) -> ReviewSession
where
    B: ReviewBackend + ?Sized,
{
    let mut events = subscribe(&session, backend);
    let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {
                refresh(&mut session, backend).await;
            }
            event = next_event(&mut events) => match event {
                Some(event) => {
                    if let Some(transition) = session.apply_event(&event, Utc::now()) {
                        info!(
                            run_id = %transition.run_id,
                            status = %transition.status,
                            "review run finished"
                        );
                        updates.send_replace(session.snapshot());
                        refresh(&mut session, backend).await;
                    }
                }
                None => {
                    debug!("progress subscription ended");
                    events = None;
                }
            },
            command = commands.recv() => match command {
                None | Some(SessionCommand::Shutdown) => break,
                Some(SessionCommand::SetDiff(patch)) => {
                    session.set_diff(&patch);
                }
                Some(SessionCommand::SetScope(scope)) => {
                    session.set_scope(scope);
                }
                Some(SessionCommand::StartReview) => {
                    start_review(&mut session, backend, &updates).await;
                }
                Some(SessionCommand::SelectThread(thread_id)) => {
                    // Drop the old stream first so its events cannot land in the new thread.
                    drop(events.take());
                    session.select_thread(thread_id);
                    events = subscribe(&session, backend);
                    refresh(&mut session, backend).await;
                }
                Some(SessionCommand::Refresh) => {
                    refresh(&mut session, backend).await;
                }
            },
        }

        updates.send_replace(session.snapshot());
    }

    info!("review session stopped");
    session
}

async fn next_event(events: &mut Option<BoxStream<'static, ProgressEvent>>) -> Option<ProgressEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn subscribe<B>(session: &ReviewSession, backend: &B) -> Option<BoxStream<'static, ProgressEvent>>
where
    B: ReviewBackend + ?Sized,
{
    let thread_id = session.thread_id()?;
    match backend.subscribe(thread_id) {
        Ok(stream) => {
            info!(thread_id, "subscribed to progress events");
            Some(stream)
        }
        Err(err) => {
            warn!(%err, thread_id, "failed to subscribe to progress events");
            None
        }
    }
}

async fn refresh<B>(session: &mut ReviewSession, backend: &B)
where
    B: ReviewBackend + ?Sized,
{
    let Some(thread_id) = session.thread_id().map(str::to_string) else {
        return;
    };
    match backend.fetch_runs(&thread_id).await {
        Ok(persisted) => {
            debug!(thread_id, count = persisted.len(), "merging persisted runs");
            session.merge_persisted(&persisted);
        }
        Err(err) => warn!(%err, thread_id, "failed to refresh persisted runs"),
    }
}

async fn start_review<B>(
    session: &mut ReviewSession,
    backend: &B,
    updates: &watch::Sender<SessionSnapshot>,
) where
    B: ReviewBackend + ?Sized,
{
    let (placeholder, request) = match session.start_review(Utc::now()) {
        Ok(started) => started,
        Err(err) => {
            warn!(%err, "cannot start review");
            return;
        }
    };
    // Show the optimistic run before the request round-trip.
    updates.send_replace(session.snapshot());

    match backend.request_review(request).await {
        Ok(ack) => {
            info!(run_id = %ack.run_id, "review run requested");
            session.acknowledge_run(&placeholder, &ack);
        }
        Err(err) => {
            warn!(%err, "review request failed");
            session.fail_pending_run(&placeholder, &err.to_string(), Utc::now());
        }
    }
}
