//! Client-side state engine for AI code review runs.
//!
//! Slices unified diffs into review scopes and reconciles a live stream of
//! progress events with periodically fetched persisted run snapshots.

pub mod backend;
pub mod diff;
pub mod error;
pub mod refs;
pub mod replay;
pub mod review;
pub mod scope;
pub mod session;
pub mod settings;

pub use backend::{ReviewBackend, RunAck, RunRequest};
pub use diff::{normalize_diff_path, parse_patch_files, DiffStats, ParsedFile, ParsedHunk, ParsedPatch};
pub use error::{EngineError, Result};
pub use refs::dedupe_ref_targets;
pub use review::{
    apply_progress_event, derive_terminal_status_from_progress_events, has_active_review_runs,
    map_persisted_review_run, merge_persisted_review_runs, normalize_review_run_status,
    resolve_review_run_status_from_progress, Chunk, Finding, PersistedReviewRun, ProgressEvent,
    ProgressEventStatus, ReviewRun, ReviewRunStatus,
};
pub use scope::{
    build_scoped_diff, review_scope_context, review_scope_label, scope_exists_in_patch,
    ReviewScope, ScopedDiffResult,
};
pub use session::{run_session, ReviewSession, SessionCommand, SessionSnapshot};
