//! Review mirror: projection of canonical artifacts into editable markdown
//! and reconciliation of edits back onto the store.

mod format;
mod project;
mod reconcile;

pub use format::{
    anchor_id, episode_number_from_review_name, episode_review_file_name, format_thousands,
    parse_episode_file, parse_header, parse_merged, parse_source_ref, render_episode_block,
    render_merged, source_ref, ParsedEpisode, ParsedHeader, ParsedReview, ReviewHeader,
    EPISODES_DIR, MERGED_REVIEW_FILE, TEXT_BEGIN, TEXT_END,
};
pub use project::{ReviewExport, ReviewProjector};
pub use reconcile::{ReconcileReport, ReviewReconciler};
