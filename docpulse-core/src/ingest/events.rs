//! Raw wire events from the capture side.
//!
//! One JSON object per line, discriminated by the `event` field. Parsing
//! is permissive: unknown fields are ignored, missing numeric fields
//! default to zero downstream, and a malformed line never aborts an
//! import.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{ContentKind, TrafficSource};

/// One line of the event log.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RawEvent {
    /// A viewer opened a link
    SessionStart(SessionStartEvent),
    /// A viewer dwelled on a page
    PageView(PageViewEvent),
    /// Video playback progressed
    VideoProgress(VideoProgressEvent),
    /// A viewer took an explicit action
    Action(ActionEvent),
    /// The session closed
    SessionEnd(SessionEndEvent),
}

impl RawEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            RawEvent::SessionStart(e) => &e.session_id,
            RawEvent::PageView(e) => &e.session_id,
            RawEvent::VideoProgress(e) => &e.session_id,
            RawEvent::Action(e) => &e.session_id,
            RawEvent::SessionEnd(e) => &e.session_id,
        }
    }
}

/// A viewer opened a link.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartEvent {
    pub session_id: String,
    pub link_id: String,
    pub ts: DateTime<Utc>,
    /// Account owning the link; used when the link is auto-created
    pub account_id: Option<String>,
    /// Display name; used when the link is auto-created
    pub link_name: Option<String>,
    pub content_kind: Option<ContentKind>,
    pub total_pages: Option<i32>,
    pub viewer_email: Option<String>,
    pub ip_address: Option<String>,
    pub source: Option<TrafficSource>,
    /// Prior sessions by this viewer on this link
    pub return_visit_count: Option<i32>,
}

/// A viewer dwelled on a page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageViewEvent {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    /// 1-based page number
    pub page: i32,
    /// Seconds spent in this dwell interval
    pub duration_secs: Option<f64>,
    /// Deepest scroll position in this interval (0-100)
    pub scroll_depth_pct: Option<f64>,
}

/// Video playback progressed. Counters are cumulative for the session.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoProgressEvent {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub watch_time_secs: Option<f64>,
    pub video_duration_secs: Option<f64>,
    pub completion_pct: Option<f64>,
    pub finished: Option<bool>,
}

/// Kind of explicit viewer action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Download,
    Print,
    Copy,
}

/// A viewer took an explicit action.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionEvent {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub kind: ActionKind,
}

/// The session closed.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEndEvent {
    pub session_id: String,
    pub ts: DateTime<Utc>,
    /// Total engaged seconds, when the capture side tracked it
    pub duration_secs: Option<i64>,
    pub idle_secs: Option<i64>,
    pub tab_switches: Option<i32>,
}

/// Parse one event-log line.
pub fn parse_line(line: &str) -> serde_json::Result<RawEvent> {
    serde_json::from_str(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_start() {
        let line = r#"{"event":"session_start","session_id":"s-1","link_id":"l-1","ts":"2026-03-01T12:00:00Z","viewer_email":"alice@example.com","source":"qr","total_pages":5,"content_kind":"document"}"#;
        let event = parse_line(line).unwrap();
        match event {
            RawEvent::SessionStart(e) => {
                assert_eq!(e.session_id, "s-1");
                assert_eq!(e.link_id, "l-1");
                assert_eq!(e.viewer_email.as_deref(), Some("alice@example.com"));
                assert_eq!(e.source, Some(TrafficSource::Qr));
                assert_eq!(e.total_pages, Some(5));
                assert_eq!(e.content_kind, Some(ContentKind::Document));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_page_view_with_unknown_fields() {
        let line = r#"{"event":"page_view","session_id":"s-1","ts":"2026-03-01T12:01:00Z","page":3,"duration_secs":12.5,"viewport":"1280x720"}"#;
        let event = parse_line(line).unwrap();
        match event {
            RawEvent::PageView(e) => {
                assert_eq!(e.page, 3);
                assert_eq!(e.duration_secs, Some(12.5));
                assert_eq!(e.scroll_depth_pct, None);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_action() {
        let line = r#"{"event":"action","session_id":"s-1","ts":"2026-03-01T12:02:00Z","kind":"download"}"#;
        match parse_line(line).unwrap() {
            RawEvent::Action(e) => assert_eq!(e.kind, ActionKind::Download),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"event":"unknown_kind","session_id":"s-1"}"#).is_err());
    }
}
