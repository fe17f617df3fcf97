//! Analytics engine: read-through caching and the session-close hook.
//!
//! Raw telemetry is Layer 1; everything this engine writes (cached session
//! scores, link rollups, contacts) is Layer 2 and regenerable. Cached
//! values are never authoritative: `ensure_*` methods return the cache
//! only while it is provably fresh and recompute otherwise, and the batch
//! recompute reports every cached score that disagreed with a fresh
//! computation.
//!
//! Every method takes time as an explicit argument where it matters, so
//! identical store contents always produce identical output.

use chrono::{DateTime, Duration, Utc};

use crate::analytics::engagement::{
    intent_for_score, is_hot_lead, score_session, EngagementScore,
};
use crate::analytics::heatmap::{drop_off_by_page, page_heatmap, PageDropOff, PageHeat};
use crate::analytics::insights::{generate, InsightInputs, InsightReport};
use crate::analytics::link::{fold_link, LinkRollup};
use crate::analytics::viewer::{group_sessions_by_viewer, ViewerRollup};
use crate::config::ScoringConfig;
use crate::db::{Database, SessionFilter};
use crate::error::{Error, Result};
use crate::types::{Contact, Link, ViewSession};

/// Current scorer version.
///
/// Increment when the scoring formula changes; cached session scores from
/// older versions are recomputed on next read.
pub const SCORE_VERSION: i32 = 1;

/// Length of each trend-comparison window, in days.
const TREND_WINDOW_DAYS: i64 = 30;

/// Result of a batch recompute pass.
#[derive(Debug, Clone, Default)]
pub struct RecomputeSummary {
    /// Links processed
    pub links: usize,
    /// Sessions whose score was recomputed
    pub sessions_checked: usize,
    /// Sessions whose cached score disagreed with the recomputation
    pub drifted: usize,
}

/// Everything the link report view needs in one call.
#[derive(Debug, Clone)]
pub struct LinkReport {
    pub link: Link,
    pub rollup: LinkRollup,
    pub heatmap: Vec<PageHeat>,
    pub drop_offs: Vec<PageDropOff>,
}

/// Orchestrates scoring, rollups and contact upserts over the store.
pub struct AnalyticsEngine {
    config: ScoringConfig,
}

impl AnalyticsEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Ensure a session's cached score is present and current.
    ///
    /// Returns the cache when it was computed by the current scorer
    /// version; recomputes and persists otherwise. Raw session fields
    /// never change after close, so version equality is the whole
    /// freshness check.
    pub fn ensure_session_score(
        &self,
        db: &Database,
        session_id: &str,
    ) -> Result<EngagementScore> {
        let session = db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if let (Some(score), Some(version)) = (session.engagement_score, session.score_version) {
            if version == SCORE_VERSION {
                tracing::debug!(session_id, score, "Using cached session score");
                return Ok(EngagementScore {
                    score,
                    intent: session.intent.unwrap_or_else(|| intent_for_score(score)),
                });
            }
            tracing::debug!(
                session_id,
                cached_version = version,
                "Cached score is from an old scorer, recomputing"
            );
        }

        let result = score_session(&session, &self.config);
        db.update_session_score(session_id, result.score, result.intent, SCORE_VERSION)?;
        Ok(result)
    }

    /// Ensure a link's cached rollup is fresh, recomputing if any session
    /// activity postdates it.
    pub fn ensure_link_rollup(
        &self,
        db: &Database,
        link_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkRollup> {
        if let Some(cached) = db.get_link_rollup(link_id)? {
            match db.last_session_activity(link_id)? {
                Some(last_activity) if cached.computed_at < last_activity => {
                    tracing::debug!(
                        link_id,
                        computed_at = %cached.computed_at,
                        last_activity = %last_activity,
                        "Link rollup is stale, recomputing"
                    );
                }
                _ => {
                    tracing::debug!(link_id, "Using cached link rollup");
                    return Ok(cached);
                }
            }
        }

        self.recompute_link_rollup(db, link_id, now)
    }

    /// Recompute and persist a link's rollup unconditionally.
    pub fn recompute_link_rollup(
        &self,
        db: &Database,
        link_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkRollup> {
        let link = db
            .get_link(link_id)?
            .ok_or_else(|| Error::LinkNotFound(link_id.to_string()))?;
        let sessions = db.list_sessions(&SessionFilter::for_link(link_id))?;

        let rollup = fold_link(&link, &sessions, &self.config, now);
        db.put_link_rollup(&rollup)?;
        Ok(rollup)
    }

    /// Recompute every cached session score and link rollup.
    ///
    /// Returns how many cached scores disagreed with their recomputation;
    /// a nonzero count means some writer bypassed the scorer.
    pub fn recompute_all(&self, db: &Database, now: DateTime<Utc>) -> Result<RecomputeSummary> {
        let mut summary = RecomputeSummary::default();

        for link in db.list_links()? {
            summary.links += 1;
            let sessions = db.list_sessions(&SessionFilter::for_link(&link.id))?;
            for session in &sessions {
                summary.sessions_checked += 1;
                let fresh = score_session(session, &self.config);
                if session.engagement_score != Some(fresh.score) {
                    if session.engagement_score.is_some() {
                        tracing::warn!(
                            session_id = %session.id,
                            cached = ?session.engagement_score,
                            recomputed = fresh.score,
                            "Cached engagement score drifted from recomputation"
                        );
                        summary.drifted += 1;
                    }
                    db.update_session_score(
                        &session.id,
                        fresh.score,
                        fresh.intent,
                        SCORE_VERSION,
                    )?;
                }
            }
            self.recompute_link_rollup(db, &link.id, now)?;
        }

        tracing::info!(
            links = summary.links,
            sessions = summary.sessions_checked,
            drifted = summary.drifted,
            "Batch recompute complete"
        );
        Ok(summary)
    }

    /// Close a session: finalize timing, cache its score, and merge the
    /// viewer into the account's contacts.
    ///
    /// The contact merge is idempotent per close event and commutative
    /// across viewers' concurrent closes.
    pub fn close_session(
        &self,
        db: &Database,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<EngagementScore> {
        let mut session = db
            .get_session(session_id)?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if session.duration_secs <= 0 {
            session.duration_secs = ended_at
                .signed_duration_since(session.started_at)
                .num_seconds()
                .max(0);
        }
        session.ended_at = Some(ended_at);
        db.set_session_closed(session_id, ended_at, session.duration_secs)?;

        let result = score_session(&session, &self.config);
        db.update_session_score(session_id, result.score, result.intent, SCORE_VERSION)?;

        let link = db
            .get_link(&session.link_id)?
            .ok_or_else(|| Error::LinkNotFound(session.link_id.clone()))?;
        let viewer = session.viewer();
        db.upsert_contact(&Contact {
            account_id: link.account_id.clone(),
            fingerprint: viewer.fingerprint(&link.account_id),
            identifier: viewer.display().to_string(),
            view_count: 1,
            engagement_sum: result.score as i64,
            hot_lead: is_hot_lead(result.score, session.downloaded, session.return_visit_count),
            last_seen_at: ended_at,
        })?;

        tracing::info!(
            session_id,
            score = result.score,
            intent = %result.intent,
            "Session closed and scored"
        );
        Ok(result)
    }

    /// Build the full report for one link.
    pub fn link_report(
        &self,
        db: &Database,
        link_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkReport> {
        let link = db
            .get_link(link_id)?
            .ok_or_else(|| Error::LinkNotFound(link_id.to_string()))?;
        let rollup = self.ensure_link_rollup(db, link_id, now)?;

        let total_pages = link.total_pages.unwrap_or(0);
        let page_views = db.list_page_views(link_id)?;
        let sessions = db.list_sessions(&SessionFilter::for_link(link_id))?;

        Ok(LinkReport {
            heatmap: page_heatmap(&page_views, total_pages),
            drop_offs: drop_off_by_page(&sessions, total_pages),
            link,
            rollup,
        })
    }

    /// Per-viewer rollups for a link, strongest first.
    pub fn viewer_rollups(&self, db: &Database, link_id: &str) -> Result<Vec<ViewerRollup>> {
        let link = db
            .get_link(link_id)?
            .ok_or_else(|| Error::LinkNotFound(link_id.to_string()))?;
        let sessions = db.list_sessions(&SessionFilter::for_link(link_id))?;

        let mut rollups: Vec<ViewerRollup> = group_sessions_by_viewer(&sessions)
            .into_iter()
            .map(|(key, group)| {
                ViewerRollup::from_sessions(key, &group, &self.config, Some(link.content_kind))
            })
            .collect();
        rollups.sort_by(|a, b| {
            b.aggregated_score()
                .cmp(&a.aggregated_score())
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(rollups)
    }

    /// Generate the insight and action lists for a link.
    ///
    /// Trend rules compare the last [`TREND_WINDOW_DAYS`] against the
    /// window before it; everything else runs over the link's full
    /// history.
    pub fn link_insights(
        &self,
        db: &Database,
        link_id: &str,
        now: DateTime<Utc>,
    ) -> Result<InsightReport> {
        let link = db
            .get_link(link_id)?
            .ok_or_else(|| Error::LinkNotFound(link_id.to_string()))?;
        let sessions = db.list_sessions(&SessionFilter::for_link(link_id))?;

        let current = fold_link(&link, &sessions, &self.config, now);
        let drop_offs = drop_off_by_page(&sessions, link.total_pages.unwrap_or(0));

        let window = Duration::days(TREND_WINDOW_DAYS);
        let recent_sessions: Vec<ViewSession> = sessions
            .iter()
            .filter(|s| s.started_at >= now - window)
            .cloned()
            .collect();
        let previous_sessions: Vec<ViewSession> = sessions
            .iter()
            .filter(|s| s.started_at >= now - window - window && s.started_at < now - window)
            .cloned()
            .collect();
        let recent = fold_link(&link, &recent_sessions, &self.config, now);
        let previous = fold_link(&link, &previous_sessions, &self.config, now);

        Ok(generate(InsightInputs {
            current: &current,
            recent: Some(&recent),
            previous: Some(&previous),
            drop_offs: &drop_offs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, TrafficSource};
    use chrono::TimeZone;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn engine() -> AnalyticsEngine {
        AnalyticsEngine::new(ScoringConfig::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    fn test_link(id: &str) -> Link {
        Link {
            id: id.to_string(),
            account_id: "acct-1".to_string(),
            name: "Deck".to_string(),
            content_kind: ContentKind::Document,
            total_pages: Some(5),
            created_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            metadata: serde_json::json!({}),
        }
    }

    fn test_session(id: &str, link_id: &str, email: &str, duration: i64, max_page: i32) -> ViewSession {
        ViewSession {
            id: id.to_string(),
            link_id: link_id.to_string(),
            viewer_email: Some(email.to_string()),
            ip_address: None,
            viewer_key: format!("email:{}", email),
            started_at: Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap(),
            ended_at: None,
            duration_secs: duration,
            pages_viewed: max_page,
            max_page_reached: max_page,
            total_pages: Some(5),
            exit_page: Some(max_page),
            idle_secs: 0,
            tab_switches: 0,
            max_scroll_depth_pct: 0.0,
            downloaded: false,
            printed: false,
            copied: false,
            is_return_visit: false,
            return_visit_count: 0,
            source: TrafficSource::Direct,
            content_kind: ContentKind::Document,
            video: None,
            engagement_score: None,
            intent: None,
            score_version: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_ensure_session_score_caches() {
        let db = test_db();
        let engine = engine();
        db.upsert_link(&test_link("l-1")).unwrap();
        db.upsert_session(&test_session("s-1", "l-1", "a@example.com", 120, 5))
            .unwrap();

        let first = engine.ensure_session_score(&db, "s-1").unwrap();
        assert_eq!(first.score, 60);

        let stored = db.get_session("s-1").unwrap().unwrap();
        assert_eq!(stored.engagement_score, Some(60));
        assert_eq!(stored.score_version, Some(SCORE_VERSION));

        let second = engine.ensure_session_score(&db, "s-1").unwrap();
        assert_eq!(second.score, 60);
    }

    #[test]
    fn test_ensure_session_score_recomputes_old_versions() {
        let db = test_db();
        let engine = engine();
        db.upsert_link(&test_link("l-1")).unwrap();
        let mut session = test_session("s-1", "l-1", "a@example.com", 120, 5);
        session.engagement_score = Some(99);
        session.intent = Some(crate::types::IntentSignal::Hot);
        session.score_version = Some(SCORE_VERSION - 1);
        db.upsert_session(&session).unwrap();

        let result = engine.ensure_session_score(&db, "s-1").unwrap();
        assert_eq!(result.score, 60);
        let stored = db.get_session("s-1").unwrap().unwrap();
        assert_eq!(stored.engagement_score, Some(60));
        assert_eq!(stored.score_version, Some(SCORE_VERSION));
    }

    #[test]
    fn test_rollup_cache_freshness() {
        let db = test_db();
        let engine = engine();
        db.upsert_link(&test_link("l-1")).unwrap();
        db.upsert_session(&test_session("s-1", "l-1", "a@example.com", 120, 5))
            .unwrap();

        let first = engine.ensure_link_rollup(&db, "l-1", now()).unwrap();
        assert_eq!(first.total_views, 1);

        // Cached read: nothing changed.
        let cached = engine.ensure_link_rollup(&db, "l-1", now()).unwrap();
        assert_eq!(cached.computed_at, first.computed_at);

        // A new session after computed_at invalidates the cache.
        let mut late = test_session("s-2", "l-1", "b@example.com", 60, 2);
        late.started_at = now() + Duration::hours(1);
        db.upsert_session(&late).unwrap();

        let refreshed = engine
            .ensure_link_rollup(&db, "l-1", now() + Duration::hours(2))
            .unwrap();
        assert_eq!(refreshed.total_views, 2);
    }

    #[test]
    fn test_close_session_scores_and_upserts_contact() {
        let db = test_db();
        let engine = engine();
        db.upsert_link(&test_link("l-1")).unwrap();
        let mut session = test_session("s-1", "l-1", "alice@example.com", 0, 5);
        session.downloaded = true;
        db.upsert_session(&session).unwrap();

        // Duration comes from the close timestamp when the counter is
        // missing: 150 seconds here.
        let ended_at = session.started_at + Duration::seconds(150);
        let result = engine.close_session(&db, "s-1", ended_at).unwrap();
        assert_eq!(result.score, 80);

        let stored = db.get_session("s-1").unwrap().unwrap();
        assert_eq!(stored.duration_secs, 150);
        assert_eq!(stored.engagement_score, Some(80));
        assert!(stored.is_closed());

        let viewer = stored.viewer();
        let contact = db
            .get_contact("acct-1", &viewer.fingerprint("acct-1"))
            .unwrap()
            .unwrap();
        assert_eq!(contact.view_count, 1);
        assert_eq!(contact.engagement_sum, 80);
        assert!(contact.hot_lead);
        assert_eq!(contact.identifier, "alice@example.com");
    }

    #[test]
    fn test_recompute_all_reports_drift() {
        let db = test_db();
        let engine = engine();
        db.upsert_link(&test_link("l-1")).unwrap();

        // One session with a hand-corrupted cached score.
        let mut bad = test_session("s-1", "l-1", "a@example.com", 120, 5);
        bad.engagement_score = Some(11);
        bad.intent = Some(crate::types::IntentSignal::Cold);
        bad.score_version = Some(SCORE_VERSION);
        db.upsert_session(&bad).unwrap();
        db.upsert_session(&test_session("s-2", "l-1", "b@example.com", 120, 5))
            .unwrap();

        let summary = engine.recompute_all(&db, now()).unwrap();
        assert_eq!(summary.links, 1);
        assert_eq!(summary.sessions_checked, 2);
        assert_eq!(summary.drifted, 1);

        let fixed = db.get_session("s-1").unwrap().unwrap();
        assert_eq!(fixed.engagement_score, Some(60));
        assert!(db.get_link_rollup("l-1").unwrap().is_some());
    }

    #[test]
    fn test_link_report_for_unknown_link() {
        let db = test_db();
        let engine = engine();
        assert!(matches!(
            engine.link_report(&db, "nope", now()),
            Err(Error::LinkNotFound(_))
        ));
    }

    #[test]
    fn test_link_insights_empty_link() {
        let db = test_db();
        let engine = engine();
        db.upsert_link(&test_link("l-1")).unwrap();

        let report = engine.link_insights(&db, "l-1", now()).unwrap();
        assert!(report.insights.is_empty());
        assert!(report.actions.is_empty());
    }
}
