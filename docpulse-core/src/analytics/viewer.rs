//! Viewer-level aggregation (lead rollups).
//!
//! Folds every session sharing one viewer grouping key into a single
//! rollup. Where the link rollup measures how the *content* performs, this
//! measures how interested the *person* is: the aggregated score rewards
//! the viewer's best demonstrated engagement plus a bonus for coming back,
//! so one mediocre visit never dilutes a strong one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::analytics::engagement::{
    intent_for_score, score_session, score_session_as, HOT_INTENT_THRESHOLD,
};
use crate::config::ScoringConfig;
use crate::types::{ContentKind, IntentSignal, ViewSession, ViewerKey};

/// Points added per session beyond the first.
pub const FREQUENCY_BONUS_STEP: f64 = 5.0;
/// Upper bound on the frequency bonus.
pub const FREQUENCY_BONUS_CAP: f64 = 15.0;

/// Frequency bonus for a viewer with `session_count` sessions.
pub fn frequency_bonus(session_count: i64) -> f64 {
    ((session_count - 1).max(0) as f64 * FREQUENCY_BONUS_STEP).min(FREQUENCY_BONUS_CAP)
}

/// Running rollup of all sessions belonging to one viewer.
///
/// Maintained incrementally via [`observe`](Self::observe); recomputing
/// from scratch over the same sessions yields the same totals in any
/// order.
#[derive(Debug, Clone)]
pub struct ViewerRollup {
    /// The grouping key this rollup is for
    pub key: ViewerKey,
    /// Sessions folded in
    pub session_count: i64,
    /// Cumulative engaged time in seconds
    pub total_duration_secs: i64,
    /// Highest single-session engagement score
    pub best_score: u8,
    /// Running mean of per-session engagement scores
    pub avg_engagement: f64,
    /// Any session included a download
    pub downloaded_any: bool,
    /// Highest prior-visit count seen
    pub max_return_visits: i32,
    /// Most recent session start
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl ViewerRollup {
    /// Empty rollup for a viewer.
    pub fn new(key: ViewerKey) -> Self {
        Self {
            key,
            session_count: 0,
            total_duration_secs: 0,
            best_score: 0,
            avg_engagement: 0.0,
            downloaded_any: false,
            max_return_visits: 0,
            last_seen_at: None,
        }
    }

    /// Fold one scored session into the rollup.
    pub fn observe(&mut self, session: &ViewSession, score: u8) {
        self.session_count += 1;
        self.total_duration_secs += session.duration_secs.max(0);
        self.best_score = self.best_score.max(score);
        self.avg_engagement +=
            (score as f64 - self.avg_engagement) / self.session_count as f64;
        self.downloaded_any = self.downloaded_any || session.downloaded;
        self.max_return_visits = self.max_return_visits.max(session.return_visit_count.max(0));
        self.last_seen_at = match self.last_seen_at {
            Some(seen) => Some(seen.max(session.started_at)),
            None => Some(session.started_at),
        };
    }

    /// Build a rollup from scratch over a viewer's sessions.
    ///
    /// `kind` forces every session through one scoring branch (used when
    /// folding within a single link); `None` scores each session by its
    /// own content kind (account-wide rollups).
    pub fn from_sessions(
        key: ViewerKey,
        sessions: &[&ViewSession],
        config: &ScoringConfig,
        kind: Option<ContentKind>,
    ) -> Self {
        let mut rollup = Self::new(key);
        for session in sessions {
            let score = match kind {
                Some(kind) => score_session_as(kind, session, config).score,
                None => score_session(session, config).score,
            };
            rollup.observe(session, score);
        }
        rollup
    }

    /// Aggregated viewer score in [0, 100]: best session plus the
    /// frequency bonus.
    pub fn aggregated_score(&self) -> u8 {
        (self.best_score as f64 + frequency_bonus(self.session_count)).clamp(0.0, 100.0) as u8
    }

    /// Whether this viewer counts as a hot lead.
    pub fn is_hot_lead(&self) -> bool {
        self.aggregated_score() >= HOT_INTENT_THRESHOLD
    }

    /// Intent bucket for the aggregated score.
    pub fn intent(&self) -> IntentSignal {
        intent_for_score(self.aggregated_score())
    }
}

/// Group sessions by the canonical viewer key.
///
/// Returns a sorted map so downstream iteration order is deterministic.
pub fn group_sessions_by_viewer(
    sessions: &[ViewSession],
) -> BTreeMap<ViewerKey, Vec<&ViewSession>> {
    let mut groups: BTreeMap<ViewerKey, Vec<&ViewSession>> = BTreeMap::new();
    for session in sessions {
        groups.entry(session.viewer()).or_default().push(session);
    }
    groups
}
