//! Core domain types for docpulse
//!
//! These types represent the canonical data model (Layer 1) that normalizes
//! viewing activity captured for shared documents and tracked links.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Link** | A shared artifact: an uploaded document, a tracked URL, or a video |
//! | **Session** | One visit by one viewer to one link, carrying raw telemetry counters |
//! | **PageView** | Accumulated dwell/scroll data for one (session, page) pair |
//! | **Viewer** | A derived grouping of sessions, never a stored entity (see below) |
//! | **Contact** | A denormalized per-account record of a viewer, merged on session close |
//! | **Engagement score** | 0-100 number derived from a session's raw counters |
//! | **Intent signal** | hot / warm / cold bucket derived from the engagement score |
//!
//! ### Viewer identity
//!
//! "Viewer" is deliberately not a table. Two sessions belong to the same
//! viewer iff they share an email address, or (absent email) an IP address,
//! or (absent both) a session id, which makes a session its own singleton
//! group. [`ViewerKey::for_session`] is the only place this rule lives;
//! every aggregator goes through it so viewer counts cannot drift between
//! call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================
// Content kinds
// ============================================

/// What kind of artifact a link points at.
///
/// The engagement scorer branches on this: documents score on page
/// completion, videos on watch ratio, track-sites on neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Paged document (PDF, slides)
    Document,
    /// Tracked URL redirect, no page structure
    TrackSite,
    /// Video with watch-time telemetry
    Video,
    /// Anything else (images, archives)
    Other,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Document => "document",
            ContentKind::TrackSite => "track_site",
            ContentKind::Video => "video",
            ContentKind::Other => "other",
        }
    }

    /// Whether this kind has a page structure completion can be measured on.
    pub fn has_pages(&self) -> bool {
        matches!(self, ContentKind::Document)
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(ContentKind::Document),
            "track_site" => Ok(ContentKind::TrackSite),
            "video" => Ok(ContentKind::Video),
            "other" => Ok(ContentKind::Other),
            _ => Err(format!("unknown content kind: {}", s)),
        }
    }
}

// ============================================
// Traffic sources
// ============================================

/// How the viewer arrived at the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficSource {
    /// Direct click on the share URL
    Direct,
    /// Scanned QR code
    Qr,
    /// Email campaign click
    Email,
    /// Source not captured
    Unknown,
}

impl TrafficSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficSource::Direct => "direct",
            TrafficSource::Qr => "qr",
            TrafficSource::Email => "email",
            TrafficSource::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for TrafficSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(TrafficSource::Direct),
            "qr" => Ok(TrafficSource::Qr),
            "email" => Ok(TrafficSource::Email),
            "unknown" => Ok(TrafficSource::Unknown),
            _ => Err(format!("unknown traffic source: {}", s)),
        }
    }
}

// ============================================
// Intent signal
// ============================================

/// Categorical intent bucket derived from an engagement score.
///
/// Threshold constants live in [`crate::analytics::engagement`]; nothing
/// else maps scores to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSignal {
    /// Strong buying/interest signal
    Hot,
    /// Moderate interest
    Warm,
    /// Low interest
    Cold,
}

impl IntentSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSignal::Hot => "hot",
            IntentSignal::Warm => "warm",
            IntentSignal::Cold => "cold",
        }
    }
}

impl std::fmt::Display for IntentSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IntentSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(IntentSignal::Hot),
            "warm" => Ok(IntentSignal::Warm),
            "cold" => Ok(IntentSignal::Cold),
            _ => Err(format!("unknown intent signal: {}", s)),
        }
    }
}

// ============================================
// Links
// ============================================

/// A shared artifact that owns zero or more sessions.
///
/// Deletion is a soft operation in the surrounding service; from the
/// analytics side a link is simply the set of its sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Unique identifier (share slug)
    pub id: String,
    /// Owning account
    pub account_id: String,
    /// Human-friendly name shown in reports
    pub name: String,
    /// What the link points at
    pub content_kind: ContentKind,
    /// Page count for documents; None for everything else
    pub total_pages: Option<i32>,
    /// When the link was created
    pub created_at: DateTime<Utc>,
    /// Extensible metadata
    pub metadata: serde_json::Value,
}

// ============================================
// Sessions
// ============================================

/// Video-specific telemetry, present only for video links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoProgress {
    /// Seconds of video actually watched
    pub watch_time_secs: f64,
    /// Total video length in seconds (0 if unknown)
    pub video_duration_secs: f64,
    /// Reported completion percentage (0-100)
    pub completion_pct: f64,
    /// Viewer reached the end
    pub finished: bool,
}

impl VideoProgress {
    /// Watched fraction in [0, 1], preferring raw watch time over the
    /// reported completion percentage when the duration is known.
    pub fn watch_ratio(&self) -> f64 {
        if self.video_duration_secs > 0.0 {
            (self.watch_time_secs / self.video_duration_secs).clamp(0.0, 1.0)
        } else {
            (self.completion_pct / 100.0).clamp(0.0, 1.0)
        }
    }
}

/// One visit by one viewer to one link.
///
/// Raw counters are Layer 1 and only ever written by ingestion. The cached
/// `engagement_score` / `intent` pair is Layer 2: derived, regenerable, and
/// required to equal what the scorer produces for the raw fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSession {
    /// Unique identifier for this session
    pub id: String,
    /// Link this session belongs to
    pub link_id: String,
    /// Viewer email if captured (verified or gate-form)
    pub viewer_email: Option<String>,
    /// Viewer IP address if captured
    pub ip_address: Option<String>,
    /// Grouping key string, derived once at write time via [`ViewerKey`]
    pub viewer_key: String,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session closed; None while still open
    pub ended_at: Option<DateTime<Utc>>,
    /// Total engaged time in seconds
    pub duration_secs: i64,

    // Document progress
    /// Distinct pages viewed
    pub pages_viewed: i32,
    /// Highest page number reached
    pub max_page_reached: i32,
    /// Page count of the document (denormalized from the link)
    pub total_pages: Option<i32>,
    /// Last page seen before leaving
    pub exit_page: Option<i32>,

    // Engagement signals
    /// Seconds spent idle (no input, no scroll)
    pub idle_secs: i64,
    /// Times the viewer switched away from the tab
    pub tab_switches: i32,
    /// Deepest scroll position seen in any page (0-100)
    pub max_scroll_depth_pct: f64,

    // Actions
    /// Viewer downloaded the artifact
    pub downloaded: bool,
    /// Viewer attempted to print
    pub printed: bool,
    /// Viewer attempted to copy content
    pub copied: bool,
    /// This viewer has at least one prior session on this link
    pub is_return_visit: bool,
    /// Number of prior sessions by this viewer on this link
    pub return_visit_count: i32,

    /// How the viewer arrived
    pub source: TrafficSource,
    /// Content kind (denormalized from the link)
    pub content_kind: ContentKind,
    /// Video telemetry, only for video content
    pub video: Option<VideoProgress>,

    // Layer 2: derived, regenerable
    /// Cached engagement score (0-100)
    pub engagement_score: Option<u8>,
    /// Cached intent signal
    pub intent: Option<IntentSignal>,
    /// Scorer version the cache was computed with
    pub score_version: Option<i32>,

    /// Lossless capture of capture-side fields we do not model
    pub metadata: serde_json::Value,
}

impl ViewSession {
    /// Completion percentage in [0, 100].
    ///
    /// 0 when the page count is unknown or zero, and for content without
    /// pages.
    pub fn completion_pct(&self) -> f64 {
        let Some(total) = self.total_pages else {
            return 0.0;
        };
        if total <= 0 {
            return 0.0;
        }
        let reached = self.max_page_reached.clamp(0, total);
        (reached as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// The viewer grouping key for this session.
    pub fn viewer(&self) -> ViewerKey {
        ViewerKey::for_session(
            self.viewer_email.as_deref(),
            self.ip_address.as_deref(),
            &self.id,
        )
    }
}

// ============================================
// Page views
// ============================================

/// Accumulated dwell data for one (session, page) pair.
///
/// Revisits to the same page accumulate into the same record: duration
/// sums, scroll depth takes the max, `revisit_count` counts extra visits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    /// Link the page belongs to
    pub link_id: String,
    /// Session the dwell happened in
    pub session_id: String,
    /// 1-based page number
    pub page_number: i32,
    /// Cumulative seconds spent on this page
    pub duration_secs: f64,
    /// Deepest scroll position seen on this page (0-100)
    pub max_scroll_depth_pct: f64,
    /// Times the page was re-entered after the first visit
    pub revisit_count: i32,
}

// ============================================
// Viewer identity
// ============================================

/// The derived grouping key that defines "one viewer".
///
/// Construction order is fixed: email, else IP, else the session's own id.
/// A session with none of the identifying fields becomes its own singleton
/// viewer rather than being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewerKey {
    /// Email-identified viewer (lowercased)
    Email(String),
    /// IP-identified viewer
    Ip(String),
    /// Anonymous viewer, keyed by its only session id
    Anonymous(String),
}

impl ViewerKey {
    /// Derive the grouping key from a session's identifying fields.
    ///
    /// This is the single definition of viewer uniqueness; aggregators must
    /// not re-derive it.
    pub fn for_session(email: Option<&str>, ip: Option<&str>, session_id: &str) -> Self {
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            return ViewerKey::Email(email.to_lowercase());
        }
        if let Some(ip) = ip.map(str::trim).filter(|ip| !ip.is_empty()) {
            return ViewerKey::Ip(ip.to_string());
        }
        ViewerKey::Anonymous(session_id.to_string())
    }

    /// Stable string form stored on sessions and used for SQL grouping.
    pub fn storage_key(&self) -> String {
        match self {
            ViewerKey::Email(email) => format!("email:{}", email),
            ViewerKey::Ip(ip) => format!("ip:{}", ip),
            ViewerKey::Anonymous(session_id) => format!("anon:{}", session_id),
        }
    }

    /// Human-readable identifier for reports.
    pub fn display(&self) -> &str {
        match self {
            ViewerKey::Email(email) => email,
            ViewerKey::Ip(ip) => ip,
            ViewerKey::Anonymous(session_id) => session_id,
        }
    }

    /// Whether the viewer left an identity beyond the session itself.
    pub fn is_identified(&self) -> bool {
        !matches!(self, ViewerKey::Anonymous(_))
    }

    /// Stable fingerprint scoped to an account, used as the contact
    /// upsert key.
    pub fn fingerprint(&self, account_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(account_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.storage_key().as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

// ============================================
// Contacts (Layer 2 - denormalized)
// ============================================

/// Denormalized per-account viewer record, upserted on session close.
///
/// The merge rule is commutative and associative so concurrent closes for
/// the same viewer converge regardless of order: counts and sums add,
/// the hot-lead flag ORs, the last-seen timestamp takes the max. The mean
/// engagement is derived on read from `engagement_sum / view_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Owning account
    pub account_id: String,
    /// Upsert key from [`ViewerKey::fingerprint`]
    pub fingerprint: String,
    /// Display identity (email, IP, or session id)
    pub identifier: String,
    /// Total closed sessions merged in
    pub view_count: i64,
    /// Sum of engagement scores across merged sessions
    pub engagement_sum: i64,
    /// Any merged session classified the viewer as a hot lead
    pub hot_lead: bool,
    /// Most recent session close
    pub last_seen_at: DateTime<Utc>,
}

impl Contact {
    /// Mean engagement across merged sessions, rounded to the nearest
    /// integer.
    pub fn avg_engagement(&self) -> i64 {
        if self.view_count == 0 {
            return 0;
        }
        (self.engagement_sum as f64 / self.view_count as f64).round() as i64
    }

    /// Merge another contact observation into this one.
    pub fn merge(&mut self, other: &Contact) {
        self.view_count += other.view_count;
        self.engagement_sum += other.engagement_sum;
        self.hot_lead = self.hot_lead || other.hot_lead;
        self.last_seen_at = self.last_seen_at.max(other.last_seen_at);
    }
}
