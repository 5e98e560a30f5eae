use revu_runs::replay::ReplayBackend;
use revu_runs::{
    run_session, PersistedReviewRun, ProgressEvent, ProgressEventStatus, ReviewRunStatus,
    ReviewScope, ReviewSession, SessionCommand, SessionSnapshot,
};
use std::fs;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const PATCH: &str = r#"diff --git a/src/app.rs b/src/app.rs
index 1111111..2222222 100644
--- a/src/app.rs
+++ b/src/app.rs
@@ -1,2 +1,2 @@
-use std::fs;
+use std::fs::File;
 fn main() {}
@@ -10,2 +10,3 @@
 let a = 1;
+let b = 2;
 let c = 3;
"#;

const EVENTS: &str = r#"
{"runId":"r1","threadId":"t1","status":"started","totalChunks":1,"completedChunks":0}
{"runId":"r1","threadId":"t1","status":"chunk-complete","totalChunks":1,"completedChunks":1,"chunk":{"id":"c1","chunkIndex":0,"filePath":"src/app.rs"},"finding":{"id":"f1","filePath":"src/app.rs","line":1,"title":"unused import"}}
{"runId":"r1","threadId":"t1","status":"chunk-complete","totalChunks":1,"completedChunks":1,"chunk":{"id":"c1","chunkIndex":0,"filePath":"src/app.rs"},"finding":{"id":"f1","filePath":"src/app.rs","line":1,"title":"unused import"}}
{"runId":"r1","threadId":"t1","status":"description-start"}
{"runId":"r1","threadId":"t1","status":"description-delta","message":"One "}
{"runId":"r1","threadId":"t1","status":"description-delta","message":"finding."}
{"runId":"r1","threadId":"t1","status":"completed"}
{"runId":"r9","threadId":"t2","status":"started"}
"#;

fn stale_snapshot() -> Vec<PersistedReviewRun> {
    serde_json::from_str(
        r#"[{"id":"r1","status":"running","startedAt":"2024-05-01T10:00:00Z","endedAt":null,"review":null}]"#,
    )
    .unwrap()
}

fn channels() -> (
    mpsc::Sender<SessionCommand>,
    mpsc::Receiver<SessionCommand>,
    watch::Sender<SessionSnapshot>,
    watch::Receiver<SessionSnapshot>,
) {
    let (command_tx, command_rx) = mpsc::channel(8);
    let (update_tx, update_rx) = watch::channel(SessionSnapshot::default());
    (command_tx, command_rx, update_tx, update_rx)
}

#[tokio::test]
async fn live_events_win_over_stale_poll() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let runs_path = dir.path().join("runs.json");
    fs::write(&events_path, EVENTS).unwrap();
    fs::write(&runs_path, serde_json::to_string(&stale_snapshot()).unwrap()).unwrap();

    let backend = ReplayBackend::from_files(&events_path, Some(&runs_path)).unwrap();
    let (command_tx, command_rx, update_tx, update_rx) = channels();
    drop(command_tx);

    let session = run_session(
        ReviewSession::new(Some("t1".to_string())),
        &backend,
        command_rx,
        update_tx,
        Duration::from_secs(60),
    )
    .await;

    let runs = session.runs();
    assert_eq!(runs.len(), 1, "events for other threads must not leak in");
    let run = &runs[0];
    assert_eq!(run.id, "r1");
    assert_eq!(run.status, ReviewRunStatus::Completed);
    assert!(run.ended_at.is_some());
    assert_eq!(run.review.as_deref(), Some("One finding."));
    assert_eq!(run.chunks.len(), 1);
    assert_eq!(run.findings.len(), 1);

    let snapshot = update_rx.borrow();
    assert_eq!(snapshot.runs, runs);
    assert!(!snapshot.has_active_runs);
}

#[tokio::test]
async fn late_started_event_does_not_reopen_persisted_terminal_run() {
    let backend = ReplayBackend::new(
        vec![ProgressEvent::new("r1", ProgressEventStatus::Started)],
        Vec::new(),
    );
    backend
        .set_persisted(
            serde_json::from_str(
                r#"[{"id":"r1","status":"completed_with_errors","endedAt":"2024-05-01T10:05:00Z"}]"#,
            )
            .unwrap(),
        )
        .unwrap();

    let (command_tx, command_rx, update_tx, _update_rx) = channels();
    command_tx.send(SessionCommand::Refresh).await.unwrap();
    drop(command_tx);

    let session = run_session(
        ReviewSession::new(Some("t1".to_string())),
        &backend,
        command_rx,
        update_tx,
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(session.runs()[0].status, ReviewRunStatus::CompletedWithErrors);
}

#[tokio::test]
async fn start_review_sends_scoped_request_and_adopts_backend_id() {
    let backend = ReplayBackend::new(Vec::new(), Vec::new());
    let (command_tx, command_rx, update_tx, _update_rx) = channels();

    command_tx
        .send(SessionCommand::SetDiff(PATCH.to_string()))
        .await
        .unwrap();
    command_tx
        .send(SessionCommand::SetScope(ReviewScope::hunk("b/src/app.rs", 2)))
        .await
        .unwrap();
    command_tx.send(SessionCommand::StartReview).await.unwrap();
    drop(command_tx);

    let session = run_session(
        ReviewSession::new(Some("t1".to_string())),
        &backend,
        command_rx,
        update_tx,
        Duration::from_secs(60),
    )
    .await;

    let requests = backend.requests().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].scope_label, "src/app.rs · hunk 2");
    assert_eq!(requests[0].stats.insertions, 1);
    assert_eq!(requests[0].stats.deletions, 0);
    assert!(requests[0].diff.contains("@@ -10,2 +10,3 @@"));
    assert!(!requests[0].diff.contains("@@ -1,2 +1,2 @@"));

    assert_eq!(session.runs().len(), 1);
    assert_eq!(session.runs()[0].id, "replay-1");
    assert_eq!(session.runs()[0].status, ReviewRunStatus::Queued);
}

#[tokio::test]
async fn selecting_a_thread_subscribes_to_it() {
    let backend = ReplayBackend::new(
        revu_runs::replay::parse_event_lines(EVENTS).unwrap(),
        Vec::new(),
    );
    let (command_tx, command_rx, update_tx, _update_rx) = channels();
    command_tx
        .send(SessionCommand::SelectThread("t2".to_string()))
        .await
        .unwrap();
    drop(command_tx);

    let session = run_session(
        ReviewSession::new(None),
        &backend,
        command_rx,
        update_tx,
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(session.thread_id(), Some("t2"));
    let ids: Vec<&str> = session.runs().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r9"]);
    assert_eq!(session.runs()[0].status, ReviewRunStatus::Running);
}

#[tokio::test]
async fn new_diff_resets_stale_scope() {
    let backend = ReplayBackend::new(Vec::new(), Vec::new());
    let (command_tx, command_rx, update_tx, update_rx) = channels();

    command_tx
        .send(SessionCommand::SetDiff(PATCH.to_string()))
        .await
        .unwrap();
    command_tx
        .send(SessionCommand::SetScope(ReviewScope::file("src/app.rs")))
        .await
        .unwrap();
    command_tx
        .send(SessionCommand::SetDiff(
            "diff --git a/lib.rs b/lib.rs\n--- a/lib.rs\n+++ b/lib.rs\n@@ -1 +1 @@\n-a\n+b\n"
                .to_string(),
        ))
        .await
        .unwrap();
    drop(command_tx);

    let session = run_session(
        ReviewSession::new(Some("t1".to_string())),
        &backend,
        command_rx,
        update_tx,
        Duration::from_secs(60),
    )
    .await;

    assert_eq!(session.scope(), &ReviewScope::Full);
    let snapshot = update_rx.borrow();
    assert_eq!(snapshot.scope_label, "Full diff");
    assert_eq!(snapshot.scoped_stats.map(|s| s.files_changed), Some(1));
}

#[tokio::test]
async fn zero_poll_interval_is_clamped() {
    let backend = ReplayBackend::new(Vec::new(), Vec::new());
    let (command_tx, command_rx, update_tx, _update_rx) = channels();
    command_tx
        .send(SessionCommand::SetDiff(PATCH.to_string()))
        .await
        .unwrap();
    drop(command_tx);

    let session = run_session(
        ReviewSession::new(Some("t1".to_string())),
        &backend,
        command_rx,
        update_tx,
        Duration::ZERO,
    )
    .await;

    assert_eq!(session.patch().files().len(), 1);
}
