pub mod models;
pub mod reconcile;
pub mod reducer;
pub mod status;

pub use models::*;
pub use reconcile::{map_persisted_review_run, merge_persisted_review_runs};
pub use reducer::{apply_progress_event, RunTransition};
pub use status::{
    derive_terminal_status_from_progress_events, has_active_review_runs,
    is_active_review_run_status, is_terminal_review_run_status, normalize_review_run_status,
    resolve_review_run_status_from_progress, resolve_run_status,
};
