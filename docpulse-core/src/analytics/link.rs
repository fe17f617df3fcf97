//! Link-level aggregation.
//!
//! Folds every session of one link into a single performance rollup.
//! The folding rules branch on content kind: document links average
//! page-completion signals, track-site links never touch them. Hot leads
//! are counted per unique *viewer* (via the viewer rollup), not per
//! session, so one engaged visit by an otherwise indifferent viewer does
//! not overstate lead quality.

use chrono::{DateTime, Utc};

use crate::analytics::engagement::score_session_as;
use crate::analytics::viewer::{group_sessions_by_viewer, ViewerRollup};
use crate::config::ScoringConfig;
use crate::types::{ContentKind, Link, TrafficSource, ViewSession};

// Performance blend weights per content kind.
const DOC_WEIGHT_ENGAGEMENT: f64 = 0.5;
const DOC_WEIGHT_COMPLETION: f64 = 0.3;
const DOC_WEIGHT_RETURN: f64 = 0.2;
const TRACKSITE_WEIGHT_ENGAGEMENT: f64 = 0.6;
const TRACKSITE_WEIGHT_RETURN: f64 = 0.4;

/// Aggregate performance rollup for one link.
///
/// Ratio fields are percentages rounded to the nearest integer; an empty
/// session set yields all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRollup {
    /// Link this rollup describes
    pub link_id: String,
    /// Content kind the fold used
    pub content_kind: ContentKind,
    /// Total sessions
    pub total_views: i64,
    /// Distinct viewer grouping keys
    pub unique_viewers: i64,
    /// Viewers whose aggregated score reaches the hot threshold
    pub hot_leads: i64,
    /// Mean per-session engagement score, rounded
    pub avg_engagement: i64,
    /// Mean completion percentage, rounded (0 for pageless content)
    pub completion_rate: i64,
    /// Percentage of sessions that were return visits, rounded
    pub return_rate: i64,
    /// Sessions that downloaded the artifact
    pub downloads: i64,
    /// Sessions arriving via QR scan
    pub qr_scans: i64,
    /// Sessions arriving via direct click
    pub direct_views: i64,
    /// Blended performance score in [0, 100]
    pub performance_score: i64,
    /// When this rollup was computed
    pub computed_at: DateTime<Utc>,
}

impl LinkRollup {
    /// The all-zero rollup for a link with no sessions.
    pub fn empty(link: &Link, now: DateTime<Utc>) -> Self {
        Self {
            link_id: link.id.clone(),
            content_kind: link.content_kind,
            total_views: 0,
            unique_viewers: 0,
            hot_leads: 0,
            avg_engagement: 0,
            completion_rate: 0,
            return_rate: 0,
            downloads: 0,
            qr_scans: 0,
            direct_views: 0,
            performance_score: 0,
            computed_at: now,
        }
    }
}

/// Fold a link's sessions into its rollup.
///
/// `now` is passed in explicitly; the fold has no hidden clock dependence.
pub fn fold_link(
    link: &Link,
    sessions: &[ViewSession],
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> LinkRollup {
    if sessions.is_empty() {
        return LinkRollup::empty(link, now);
    }

    let total = sessions.len() as f64;

    // Every session is scored through the link's own branch so a stale
    // denormalized kind on a row cannot mix scoring formulas.
    let score_sum: f64 = sessions
        .iter()
        .map(|s| score_session_as(link.content_kind, s, config).score as f64)
        .sum();
    let avg_engagement = score_sum / total;

    let completion_avg = if link.content_kind.has_pages() {
        sessions.iter().map(|s| s.completion_pct()).sum::<f64>() / total
    } else {
        0.0
    };

    let return_sessions = sessions.iter().filter(|s| s.is_return_visit).count() as f64;
    let return_rate = return_sessions / total * 100.0;

    // One grouping pass; every viewer-derived number below reuses it.
    let groups = group_sessions_by_viewer(sessions);
    let unique_viewers = groups.len() as i64;
    let hot_leads = groups
        .into_iter()
        .map(|(key, group)| {
            ViewerRollup::from_sessions(key, &group, config, Some(link.content_kind))
        })
        .filter(ViewerRollup::is_hot_lead)
        .count() as i64;

    LinkRollup {
        link_id: link.id.clone(),
        content_kind: link.content_kind,
        total_views: sessions.len() as i64,
        unique_viewers,
        hot_leads,
        avg_engagement: round_pct(avg_engagement),
        completion_rate: round_pct(completion_avg),
        return_rate: round_pct(return_rate),
        downloads: sessions.iter().filter(|s| s.downloaded).count() as i64,
        qr_scans: count_source(sessions, TrafficSource::Qr),
        direct_views: count_source(sessions, TrafficSource::Direct),
        performance_score: performance_score(link.content_kind, avg_engagement, completion_avg, return_rate),
        computed_at: now,
    }
}

/// Blend the aggregate axes into one 0-100 performance number.
fn performance_score(
    kind: ContentKind,
    avg_engagement: f64,
    completion_avg: f64,
    return_rate: f64,
) -> i64 {
    let blended = match kind {
        ContentKind::TrackSite => {
            TRACKSITE_WEIGHT_ENGAGEMENT * avg_engagement + TRACKSITE_WEIGHT_RETURN * return_rate
        }
        _ => {
            DOC_WEIGHT_ENGAGEMENT * avg_engagement
                + DOC_WEIGHT_COMPLETION * completion_avg
                + DOC_WEIGHT_RETURN * return_rate
        }
    };
    (blended.clamp(0.0, 100.0)).round() as i64
}

fn count_source(sessions: &[ViewSession], source: TrafficSource) -> i64 {
    sessions.iter().filter(|s| s.source == source).count() as i64
}

fn round_pct(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn link(kind: ContentKind, total_pages: Option<i32>) -> Link {
        Link {
            id: "l-1".to_string(),
            account_id: "acct-1".to_string(),
            name: "Q3 deck".to_string(),
            content_kind: kind,
            total_pages,
            created_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            metadata: serde_json::json!({}),
        }
    }

    fn session(id: &str, email: Option<&str>, duration_secs: i64, max_page: i32) -> ViewSession {
        ViewSession {
            id: id.to_string(),
            link_id: "l-1".to_string(),
            viewer_email: email.map(str::to_string),
            ip_address: None,
            viewer_key: match email {
                Some(email) => format!("email:{}", email),
                None => format!("anon:{}", id),
            },
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            ended_at: None,
            duration_secs,
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

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_link_is_all_zeros() {
        let rollup = fold_link(
            &link(ContentKind::Document, Some(5)),
            &[],
            &ScoringConfig::default(),
            now(),
        );
        assert_eq!(rollup.total_views, 0);
        assert_eq!(rollup.unique_viewers, 0);
        assert_eq!(rollup.hot_leads, 0);
        assert_eq!(rollup.avg_engagement, 0);
        assert_eq!(rollup.completion_rate, 0);
        assert_eq!(rollup.return_rate, 0);
        assert_eq!(rollup.downloads, 0);
        assert_eq!(rollup.performance_score, 0);
    }

    #[test]
    fn test_document_link_scenario() {
        // Two viewers on a five-page document. Alice visits twice, her
        // first visit downloads; Bob skims page one for ten seconds.
        let mut s1 = session("s-1", Some("alice@example.com"), 200, 5);
        s1.downloaded = true;
        let s2 = session("s-2", Some("bob@example.com"), 10, 1);
        let mut s3 = session("s-3", Some("alice@example.com"), 130, 5);
        s3.is_return_visit = true;
        s3.return_visit_count = 1;

        let config = ScoringConfig::default();
        let rollup = fold_link(
            &link(ContentKind::Document, Some(5)),
            &[s1, s2, s3],
            &config,
            now(),
        );

        // Session scores 80, 8 and 70: mean 52.67 rounds to 53.
        assert_eq!(rollup.total_views, 3);
        assert_eq!(rollup.unique_viewers, 2);
        assert_eq!(rollup.avg_engagement, 53);
        // Completion 100 + 20 + 100 over three sessions
        assert_eq!(rollup.completion_rate, 73);
        // One of three sessions is a return visit
        assert_eq!(rollup.return_rate, 33);
        assert_eq!(rollup.downloads, 1);
        // Alice aggregates to max(80, 70) + 5 = 85; Bob stays cold.
        assert_eq!(rollup.hot_leads, 1);
        // 0.5 * 52.67 + 0.3 * 73.33 + 0.2 * 33.33 = 55
        assert_eq!(rollup.performance_score, 55);
    }

    #[test]
    fn test_track_site_never_uses_page_scores() {
        // Track-site sessions with stray page counters: the fold must
        // score them all through the track-site branch.
        let mut s1 = session("s-1", Some("carol@example.com"), 60, 5);
        s1.content_kind = ContentKind::TrackSite;
        let mut s2 = session("s-2", Some("dave@example.com"), 30, 5);
        // Stale denormalized kind on the row.
        s2.content_kind = ContentKind::Document;

        let config = ScoringConfig::default();
        let rollup = fold_link(
            &link(ContentKind::TrackSite, None),
            &[s1, s2],
            &config,
            now(),
        );

        // Scores are 40 (60s of the 60s threshold) and 20; a document
        // fold of the same rows would have added completion points.
        assert_eq!(rollup.avg_engagement, 30);
        assert_eq!(rollup.completion_rate, 0);
        assert_eq!(rollup.content_kind, ContentKind::TrackSite);
    }

    #[test]
    fn test_traffic_source_counters() {
        let mut s1 = session("s-1", None, 60, 3);
        s1.source = TrafficSource::Qr;
        let s2 = session("s-2", None, 60, 3);
        let mut s3 = session("s-3", None, 60, 3);
        s3.source = TrafficSource::Email;

        let rollup = fold_link(
            &link(ContentKind::Document, Some(5)),
            &[s1, s2, s3],
            &ScoringConfig::default(),
            now(),
        );
        assert_eq!(rollup.qr_scans, 1);
        assert_eq!(rollup.direct_views, 1);
        assert_eq!(rollup.total_views, 3);
        // No emails or IPs: every session is its own singleton viewer.
        assert_eq!(rollup.unique_viewers, 3);
    }

    #[test]
    fn test_unique_viewers_by_ip_fallback() {
        let mut s1 = session("s-1", None, 60, 3);
        s1.ip_address = Some("10.0.0.1".to_string());
        let mut s2 = session("s-2", None, 45, 2);
        s2.ip_address = Some("10.0.0.1".to_string());
        let mut s3 = session("s-3", None, 45, 2);
        s3.ip_address = Some("10.0.0.2".to_string());

        let rollup = fold_link(
            &link(ContentKind::Document, Some(5)),
            &[s1, s2, s3],
            &ScoringConfig::default(),
            now(),
        );
        assert_eq!(rollup.unique_viewers, 2);
    }
}
