//! Engagement scoring
//!
//! Converts one session's raw telemetry counters into a 0-100 engagement
//! score and an intent signal. This module is the single source of truth
//! for that mapping: rollups, the session cache, contact records, and the
//! CLI all delegate here and never carry their own formula.
//!
//! ## Score composition
//!
//! A score is a weighted sum of capped sub-scores, clamped to [0, 100]:
//!
//! | Content | Duration | Completion | Download | Return |
//! |---------|----------|------------|----------|--------|
//! | document, other | 30 | 30 | 20 | 10 / 20 |
//! | video | 30 (watch ratio) | 30 (tiered) | 20 | 10 / 20 |
//! | track-site | 40 | n/a | 30 | 15 / 30 |
//!
//! Track-sites have no page structure, so the 30 completion points are
//! redistributed across the remaining axes instead of silently capping
//! their reachable score at 70.
//!
//! The return sub-score escalates with repetition: one prior visit earns
//! half the bonus, two or more earn the full bonus.
//!
//! Missing or out-of-range numeric inputs are sanitized to zero and logged;
//! scoring never fails.

use crate::config::ScoringConfig;
use crate::types::{ContentKind, IntentSignal, ViewSession};

/// Score at or above which a session signals hot intent.
pub const HOT_INTENT_THRESHOLD: u8 = 70;
/// Score at or above which a session signals warm intent.
pub const WARM_INTENT_THRESHOLD: u8 = 40;

/// Score at which a single session marks its viewer as a hot lead.
pub const HOT_LEAD_SCORE: u8 = 80;
/// Minimum score for a download to mark a hot lead.
pub const HOT_LEAD_DOWNLOAD_SCORE: u8 = 50;
/// Prior-visit count at which repetition alone marks a hot lead.
pub const HOT_LEAD_RETURN_VISITS: i32 = 2;

// Paged/video weights
const DURATION_CAP: f64 = 30.0;
const COMPLETION_CAP: f64 = 30.0;
const DOWNLOAD_BONUS: f64 = 20.0;
const RETURN_BONUS_SINGLE: f64 = 10.0;
const RETURN_BONUS_REPEAT: f64 = 20.0;

// Track-site redistribution of the completion weight
const TRACKSITE_DURATION_CAP: f64 = 40.0;
const TRACKSITE_DOWNLOAD_BONUS: f64 = 30.0;
const TRACKSITE_RETURN_SINGLE: f64 = 15.0;
const TRACKSITE_RETURN_REPEAT: f64 = 30.0;

// Video completion tiers: watching most of a video is a stronger signal
// than the same fraction of a document, finishing it stronger still.
const VIDEO_TIER_FULL: f64 = 30.0;
const VIDEO_TIER_HIGH: f64 = 22.0;
const VIDEO_TIER_MEDIUM: f64 = 15.0;
const VIDEO_TIER_LOW: f64 = 8.0;

/// Result of scoring one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementScore {
    /// Integer score in [0, 100]
    pub score: u8,
    /// Intent bucket for the score
    pub intent: IntentSignal,
}

/// Map a score to its intent signal.
///
/// The only score-to-signal mapping in the codebase.
pub fn intent_for_score(score: u8) -> IntentSignal {
    if score >= HOT_INTENT_THRESHOLD {
        IntentSignal::Hot
    } else if score >= WARM_INTENT_THRESHOLD {
        IntentSignal::Warm
    } else {
        IntentSignal::Cold
    }
}

/// Score a session using its own content kind.
pub fn score_session(session: &ViewSession, config: &ScoringConfig) -> EngagementScore {
    score_session_as(session.content_kind, session, config)
}

/// Score a session as a specific content kind.
///
/// Link-level folding passes the link's kind here so a session row with a
/// stale denormalized kind cannot sneak a document-style score into a
/// track-site average.
pub fn score_session_as(
    kind: ContentKind,
    session: &ViewSession,
    config: &ScoringConfig,
) -> EngagementScore {
    let raw = match kind {
        ContentKind::TrackSite => track_site_points(session, config),
        ContentKind::Video => video_points(session),
        ContentKind::Document | ContentKind::Other => document_points(session, config),
    };

    let score = raw.clamp(0.0, 100.0).floor() as u8;
    EngagementScore {
        score,
        intent: intent_for_score(score),
    }
}

/// Hot-lead predicate over one session's signals.
///
/// One strong axis qualifies on its own; a download only counts alongside
/// at least moderate engagement, and repetition qualifies regardless of
/// any single session's strength.
pub fn is_hot_lead(score: u8, downloaded: bool, return_visit_count: i32) -> bool {
    score >= HOT_LEAD_SCORE
        || (downloaded && score >= HOT_LEAD_DOWNLOAD_SCORE)
        || return_visit_count >= HOT_LEAD_RETURN_VISITS
}

fn document_points(session: &ViewSession, config: &ScoringConfig) -> f64 {
    let duration = sanitized(session.duration_secs as f64, "duration_secs", &session.id);
    let completion = sanitized(session.completion_pct(), "completion_pct", &session.id);

    duration_points(duration, config.document_high_engagement_secs, DURATION_CAP)
        + completion / 100.0 * COMPLETION_CAP
        + if session.downloaded { DOWNLOAD_BONUS } else { 0.0 }
        + return_points(session, RETURN_BONUS_SINGLE, RETURN_BONUS_REPEAT)
}

fn track_site_points(session: &ViewSession, config: &ScoringConfig) -> f64 {
    let duration = sanitized(session.duration_secs as f64, "duration_secs", &session.id);

    duration_points(
        duration,
        config.tracksite_high_engagement_secs,
        TRACKSITE_DURATION_CAP,
    ) + if session.downloaded {
        TRACKSITE_DOWNLOAD_BONUS
    } else {
        0.0
    } + return_points(session, TRACKSITE_RETURN_SINGLE, TRACKSITE_RETURN_REPEAT)
}

fn video_points(session: &ViewSession) -> f64 {
    let ratio = match &session.video {
        Some(video) => {
            let watch = sanitized(video.watch_time_secs, "watch_time_secs", &session.id);
            let total = sanitized(video.video_duration_secs, "video_duration_secs", &session.id);
            if total > 0.0 {
                (watch / total).clamp(0.0, 1.0)
            } else {
                (sanitized(video.completion_pct, "video_completion_pct", &session.id) / 100.0)
                    .clamp(0.0, 1.0)
            }
        }
        None => 0.0,
    };
    let finished = session.video.as_ref().map(|v| v.finished).unwrap_or(false);

    ratio * DURATION_CAP
        + video_completion_points(ratio, finished)
        + if session.downloaded { DOWNLOAD_BONUS } else { 0.0 }
        + return_points(session, RETURN_BONUS_SINGLE, RETURN_BONUS_REPEAT)
}

/// Tiered completion bonus for video content.
fn video_completion_points(ratio: f64, finished: bool) -> f64 {
    if finished || ratio >= 1.0 {
        VIDEO_TIER_FULL
    } else if ratio >= 0.75 {
        VIDEO_TIER_HIGH
    } else if ratio >= 0.5 {
        VIDEO_TIER_MEDIUM
    } else if ratio >= 0.25 {
        VIDEO_TIER_LOW
    } else {
        0.0
    }
}

/// Linear duration sub-score, reaching `cap` at `threshold_secs`.
fn duration_points(duration_secs: f64, threshold_secs: u32, cap: f64) -> f64 {
    if threshold_secs == 0 {
        return cap;
    }
    (duration_secs / threshold_secs as f64).clamp(0.0, 1.0) * cap
}

/// Escalating return-visit sub-score.
fn return_points(session: &ViewSession, single: f64, repeat: f64) -> f64 {
    let prior = session.return_visit_count.max(0);
    if prior >= 2 {
        repeat
    } else if prior == 1 || session.is_return_visit {
        single
    } else {
        0.0
    }
}

/// Clamp a telemetry value into valid range, logging when it was bad.
fn sanitized(value: f64, field: &'static str, session_id: &str) -> f64 {
    if !value.is_finite() || value < 0.0 {
        tracing::warn!(session_id, field, value, "sanitized invalid telemetry value");
        return 0.0;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TrafficSource, VideoProgress};
    use chrono::{TimeZone, Utc};

    fn base_session(kind: ContentKind) -> ViewSession {
        ViewSession {
            id: "s-1".to_string(),
            link_id: "l-1".to_string(),
            viewer_email: Some("alice@example.com".to_string()),
            ip_address: None,
            viewer_key: "email:alice@example.com".to_string(),
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            ended_at: None,
            duration_secs: 0,
            pages_viewed: 0,
            max_page_reached: 0,
            total_pages: None,
            exit_page: None,
            idle_secs: 0,
            tab_switches: 0,
            max_scroll_depth_pct: 0.0,
            downloaded: false,
            printed: false,
            copied: false,
            is_return_visit: false,
            return_visit_count: 0,
            source: TrafficSource::Direct,
            content_kind: kind,
            video: None,
            engagement_score: None,
            intent: None,
            score_version: None,
            metadata: serde_json::json!({}),
        }
    }

    fn document_session(duration_secs: i64, max_page: i32, total_pages: i32) -> ViewSession {
        let mut session = base_session(ContentKind::Document);
        session.duration_secs = duration_secs;
        session.max_page_reached = max_page;
        session.pages_viewed = max_page;
        session.total_pages = Some(total_pages);
        session
    }

    #[test]
    fn test_intent_thresholds() {
        assert_eq!(intent_for_score(100), IntentSignal::Hot);
        assert_eq!(intent_for_score(70), IntentSignal::Hot);
        assert_eq!(intent_for_score(69), IntentSignal::Warm);
        assert_eq!(intent_for_score(40), IntentSignal::Warm);
        assert_eq!(intent_for_score(39), IntentSignal::Cold);
        assert_eq!(intent_for_score(0), IntentSignal::Cold);
    }

    #[test]
    fn test_document_full_marks() {
        // 150s past the 120s threshold, full completion, downloaded:
        // 30 + 30 + 20 + 0 = 80
        let mut session = document_session(150, 5, 5);
        session.downloaded = true;

        let result = score_session(&session, &ScoringConfig::default());
        assert_eq!(result.score, 80);
        assert_eq!(result.intent, IntentSignal::Hot);
    }

    #[test]
    fn test_document_short_shallow_visit() {
        // 10s of 120s and one page of five: 2.5 + 6.0, floored to 8
        let session = document_session(10, 1, 5);
        let result = score_session(&session, &ScoringConfig::default());
        assert_eq!(result.score, 8);
        assert_eq!(result.intent, IntentSignal::Cold);
    }

    #[test]
    fn test_return_bonus_escalates() {
        let config = ScoringConfig::default();
        let mut session = document_session(130, 5, 5);

        let fresh = score_session(&session, &config).score;
        assert_eq!(fresh, 60);

        session.is_return_visit = true;
        session.return_visit_count = 1;
        let once = score_session(&session, &config).score;
        assert_eq!(once, 70);

        session.return_visit_count = 3;
        let repeat = score_session(&session, &config).score;
        assert_eq!(repeat, 80);
    }

    #[test]
    fn test_score_bounds() {
        let config = ScoringConfig::default();
        let mut session = document_session(100_000, 500, 5);
        session.downloaded = true;
        session.is_return_visit = true;
        session.return_visit_count = 50;

        let result = score_session(&session, &config);
        assert!(result.score <= 100);

        let empty = base_session(ContentKind::Document);
        assert_eq!(score_session(&empty, &config).score, 0);
    }

    #[test]
    fn test_duration_monotonicity() {
        let config = ScoringConfig::default();
        let mut last = 0;
        for duration in [0, 5, 30, 60, 90, 119, 120, 200, 10_000] {
            let session = document_session(duration, 2, 5);
            let score = score_session(&session, &config).score;
            assert!(
                score >= last,
                "score decreased at duration {}: {} < {}",
                duration,
                score,
                last
            );
            last = score;
        }
    }

    #[test]
    fn test_completion_monotonicity() {
        let config = ScoringConfig::default();
        let mut last = 0;
        for max_page in 0..=10 {
            let session = document_session(60, max_page, 10);
            let score = score_session(&session, &config).score;
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn test_negative_inputs_sanitized() {
        let config = ScoringConfig::default();
        let mut session = document_session(-500, -3, 5);
        session.downloaded = true;

        // Negative duration and page counters score as zero, the download
        // bonus still applies.
        let result = score_session(&session, &config);
        assert_eq!(result.score, 20);
    }

    #[test]
    fn test_track_site_can_reach_full_score() {
        let config = ScoringConfig::default();
        let mut session = base_session(ContentKind::TrackSite);
        session.duration_secs = 90;
        session.downloaded = true;
        session.is_return_visit = true;
        session.return_visit_count = 2;

        // 40 + 30 + 30 = 100
        let result = score_session(&session, &config);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_track_site_ignores_page_fields() {
        let config = ScoringConfig::default();
        let mut session = base_session(ContentKind::TrackSite);
        session.duration_secs = 30;
        // Stray page counters on a track-site row must not contribute.
        session.max_page_reached = 10;
        session.total_pages = Some(10);

        // 30/60 of the 40-point duration axis
        let result = score_session(&session, &config);
        assert_eq!(result.score, 20);
    }

    #[test]
    fn test_score_as_overrides_session_kind() {
        let config = ScoringConfig::default();
        let mut session = document_session(60, 5, 5);
        session.content_kind = ContentKind::Document;

        let as_document = score_session_as(ContentKind::Document, &session, &config).score;
        let as_tracksite = score_session_as(ContentKind::TrackSite, &session, &config).score;
        assert_eq!(as_document, 45);
        assert_eq!(as_tracksite, 40);
    }

    #[test]
    fn test_video_completion_tiers() {
        let config = ScoringConfig::default();
        let mut session = base_session(ContentKind::Video);

        let expect = [
            (0.1, 3), // 3 duration + no tier
            (0.3, 17), // 9 + 8
            (0.6, 33), // 18 + 15
            (0.8, 46), // 24 + 22
            (1.0, 60), // 30 + 30
        ];
        for (ratio, score) in expect {
            session.video = Some(VideoProgress {
                watch_time_secs: 300.0 * ratio,
                video_duration_secs: 300.0,
                completion_pct: ratio * 100.0,
                finished: ratio >= 1.0,
            });
            assert_eq!(
                score_session(&session, &config).score,
                score,
                "ratio {}",
                ratio
            );
        }
    }

    #[test]
    fn test_video_finished_flag_grants_full_tier() {
        let config = ScoringConfig::default();
        let mut session = base_session(ContentKind::Video);
        session.video = Some(VideoProgress {
            watch_time_secs: 280.0,
            video_duration_secs: 300.0,
            completion_pct: 93.0,
            finished: true,
        });

        // 0.933 * 30 = 28 duration points plus the full 30-point tier
        assert_eq!(score_session(&session, &config).score, 58);
    }

    #[test]
    fn test_video_without_duration_uses_reported_pct() {
        let config = ScoringConfig::default();
        let mut session = base_session(ContentKind::Video);
        session.video = Some(VideoProgress {
            watch_time_secs: 100.0,
            video_duration_secs: 0.0,
            completion_pct: 50.0,
            finished: false,
        });

        // ratio 0.5: 15 duration + 15 tier
        assert_eq!(score_session(&session, &config).score, 30);
    }

    #[test]
    fn test_hot_lead_predicate() {
        assert!(is_hot_lead(80, false, 0));
        assert!(!is_hot_lead(79, false, 0));
        assert!(is_hot_lead(50, true, 0));
        assert!(!is_hot_lead(49, true, 0));
        assert!(!is_hot_lead(10, false, 1));
        assert!(is_hot_lead(10, false, 2));
    }
}
