//! Analytics module for docpulse
//!
//! The scoring and aggregation core. Everything here is a pure,
//! deterministic function over already-fetched records:
//! - Per-session engagement scoring and intent signals
//! - Hot-lead classification
//! - Link-level performance rollups
//! - Viewer-level lead rollups
//! - Page heatmaps and drop-off analysis
//! - Insight and action generation
//!
//! The one stateful piece, [`engine::AnalyticsEngine`], only orchestrates:
//! it caches results in the store and recomputes when stale, never
//! carrying formulas of its own.

pub mod engagement;
pub mod engine;
pub mod heatmap;
pub mod insights;
pub mod link;
pub mod registry;
pub mod viewer;

pub use engagement::{
    intent_for_score, is_hot_lead, score_session, score_session_as, EngagementScore,
    HOT_INTENT_THRESHOLD, WARM_INTENT_THRESHOLD,
};
pub use engine::{AnalyticsEngine, LinkReport, RecomputeSummary, SCORE_VERSION};
pub use heatmap::{drop_off_by_page, page_heatmap, HeatLevel, PageDropOff, PageHeat};
pub use insights::{
    generate as generate_insights, ActionButton, ActionItem, Insight, InsightInputs,
    InsightReport, Priority,
};
pub use link::{fold_link, LinkRollup};
pub use viewer::{frequency_bonus, group_sessions_by_viewer, ViewerRollup};
