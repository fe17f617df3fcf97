//! Database repository layer
//!
//! Provides query and insert operations for all entity types. Raw
//! telemetry tables (links, sessions, page_views) are only written by
//! ingestion; derived tables (contacts, link_rollups, cached scores) are
//! regenerable at any time.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// Filter for session queries.
///
/// All fields are optional; `None` means "do not filter on this".
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Only sessions of this link
    pub link_id: Option<String>,
    /// Only sessions with this viewer storage key
    pub viewer_key: Option<String>,
    /// Only sessions started at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Only sessions started before this time
    pub until: Option<DateTime<Utc>>,
}

impl SessionFilter {
    /// Filter for one link's sessions.
    pub fn for_link(link_id: &str) -> Self {
        Self {
            link_id: Some(link_id.to_string()),
            ..Default::default()
        }
    }
}

/// Handle to the SQLite store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Link operations
    // ============================================

    /// Insert or update a link
    pub fn upsert_link(&self, link: &Link) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO links (id, account_id, name, content_kind, total_pages, created_at, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                account_id = excluded.account_id,
                name = excluded.name,
                content_kind = excluded.content_kind,
                total_pages = excluded.total_pages,
                metadata = excluded.metadata
            "#,
            params![
                link.id,
                link.account_id,
                link.name,
                link.content_kind.as_str(),
                link.total_pages,
                link.created_at.to_rfc3339(),
                link.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Get a link by ID
    pub fn get_link(&self, id: &str) -> Result<Option<Link>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM links WHERE id = ?", [id], Self::row_to_link)
            .optional()
            .map_err(Error::from)
    }

    /// List all links, most recent first
    pub fn list_links(&self) -> Result<Vec<Link>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM links ORDER BY created_at DESC, id")?;
        let links = stmt
            .query_map([], Self::row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    fn row_to_link(row: &Row) -> rusqlite::Result<Link> {
        let kind_str: String = row.get("content_kind")?;
        let created_at_str: String = row.get("created_at")?;
        let metadata_str: Option<String> = row.get("metadata")?;

        Ok(Link {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            name: row.get("name")?,
            content_kind: ContentKind::from_str(&kind_str).unwrap_or(ContentKind::Other),
            total_pages: row.get("total_pages")?,
            created_at: parse_ts(&created_at_str),
            metadata: metadata_str
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }

    // ============================================
    // Session operations
    // ============================================

    /// Insert or update a session
    pub fn upsert_session(&self, session: &ViewSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sessions (
                id, link_id, viewer_email, ip_address, viewer_key,
                started_at, ended_at, duration_secs,
                pages_viewed, max_page_reached, total_pages, exit_page,
                idle_secs, tab_switches, max_scroll_depth_pct,
                downloaded, printed, copied, is_return_visit, return_visit_count,
                source, content_kind, video,
                engagement_score, intent, score_version, metadata
            )
            VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
            )
            ON CONFLICT(id) DO UPDATE SET
                viewer_email = excluded.viewer_email,
                ip_address = excluded.ip_address,
                viewer_key = excluded.viewer_key,
                ended_at = excluded.ended_at,
                duration_secs = excluded.duration_secs,
                pages_viewed = excluded.pages_viewed,
                max_page_reached = excluded.max_page_reached,
                total_pages = excluded.total_pages,
                exit_page = excluded.exit_page,
                idle_secs = excluded.idle_secs,
                tab_switches = excluded.tab_switches,
                max_scroll_depth_pct = excluded.max_scroll_depth_pct,
                downloaded = excluded.downloaded,
                printed = excluded.printed,
                copied = excluded.copied,
                is_return_visit = excluded.is_return_visit,
                return_visit_count = excluded.return_visit_count,
                source = excluded.source,
                content_kind = excluded.content_kind,
                video = excluded.video,
                engagement_score = excluded.engagement_score,
                intent = excluded.intent,
                score_version = excluded.score_version,
                metadata = excluded.metadata
            "#,
            params![
                session.id,
                session.link_id,
                session.viewer_email,
                session.ip_address,
                session.viewer_key,
                session.started_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.duration_secs,
                session.pages_viewed,
                session.max_page_reached,
                session.total_pages,
                session.exit_page,
                session.idle_secs,
                session.tab_switches,
                session.max_scroll_depth_pct,
                session.downloaded,
                session.printed,
                session.copied,
                session.is_return_visit,
                session.return_visit_count,
                session.source.as_str(),
                session.content_kind.as_str(),
                session
                    .video
                    .as_ref()
                    .map(|v| serde_json::to_string(v).unwrap_or_default()),
                session.engagement_score,
                session.intent.map(|i| i.as_str()),
                session.score_version,
                session.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Get a session by ID
    pub fn get_session(&self, id: &str) -> Result<Option<ViewSession>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM sessions WHERE id = ?",
            [id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List sessions matching a filter, oldest first
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ViewSession>> {
        let mut sql = String::from("SELECT * FROM sessions WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref link_id) = filter.link_id {
            sql.push_str(" AND link_id = ?");
            args.push(Box::new(link_id.clone()));
        }
        if let Some(ref viewer_key) = filter.viewer_key {
            sql.push_str(" AND viewer_key = ?");
            args.push(Box::new(viewer_key.clone()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND started_at >= ?");
            args.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND started_at < ?");
            args.push(Box::new(until.to_rfc3339()));
        }
        sql.push_str(" ORDER BY started_at, id");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let arg_refs: Vec<&dyn rusqlite::types::ToSql> =
            args.iter().map(|a| a.as_ref()).collect();
        let sessions = stmt
            .query_map(arg_refs.as_slice(), Self::row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Update a session's cached engagement score
    pub fn update_session_score(
        &self,
        session_id: &str,
        score: u8,
        intent: IntentSignal,
        score_version: i32,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET engagement_score = ?1, intent = ?2, score_version = ?3 WHERE id = ?4",
            params![score, intent.as_str(), score_version, session_id],
        )?;
        if updated == 0 {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Mark a session closed
    pub fn set_session_closed(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        duration_secs: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET ended_at = ?1, duration_secs = ?2 WHERE id = ?3",
            params![ended_at.to_rfc3339(), duration_secs, session_id],
        )?;
        if updated == 0 {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Most recent session activity for a link (start or close, whichever
    /// is later). Used as the rollup-cache freshness watermark.
    pub fn last_session_activity(&self, link_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(MAX(started_at, COALESCE(ended_at, started_at))) FROM sessions WHERE link_id = ?",
            [link_id],
            |row| row.get(0),
        )?;
        Ok(latest.map(|s| parse_ts(&s)))
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<ViewSession> {
        let started_at_str: String = row.get("started_at")?;
        let ended_at_str: Option<String> = row.get("ended_at")?;
        let source_str: String = row.get("source")?;
        let kind_str: String = row.get("content_kind")?;
        let video_str: Option<String> = row.get("video")?;
        let intent_str: Option<String> = row.get("intent")?;
        let metadata_str: Option<String> = row.get("metadata")?;

        Ok(ViewSession {
            id: row.get("id")?,
            link_id: row.get("link_id")?,
            viewer_email: row.get("viewer_email")?,
            ip_address: row.get("ip_address")?,
            viewer_key: row.get("viewer_key")?,
            started_at: parse_ts(&started_at_str),
            ended_at: ended_at_str.map(|s| parse_ts(&s)),
            duration_secs: row.get("duration_secs")?,
            pages_viewed: row.get("pages_viewed")?,
            max_page_reached: row.get("max_page_reached")?,
            total_pages: row.get("total_pages")?,
            exit_page: row.get("exit_page")?,
            idle_secs: row.get("idle_secs")?,
            tab_switches: row.get("tab_switches")?,
            max_scroll_depth_pct: row.get("max_scroll_depth_pct")?,
            downloaded: row.get("downloaded")?,
            printed: row.get("printed")?,
            copied: row.get("copied")?,
            is_return_visit: row.get("is_return_visit")?,
            return_visit_count: row.get("return_visit_count")?,
            source: TrafficSource::from_str(&source_str).unwrap_or(TrafficSource::Unknown),
            content_kind: ContentKind::from_str(&kind_str).unwrap_or(ContentKind::Other),
            video: video_str.and_then(|s| serde_json::from_str(&s).ok()),
            engagement_score: row.get("engagement_score")?,
            intent: intent_str.and_then(|s| IntentSignal::from_str(&s).ok()),
            score_version: row.get("score_version")?,
            metadata: metadata_str
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }

    // ============================================
    // Page view operations
    // ============================================

    /// Accumulate a page view into the (session, page) record.
    ///
    /// Dwell time sums across revisits, scroll depth keeps its maximum,
    /// and each call after the first bumps `revisit_count`.
    pub fn record_page_view(&self, view: &PageView) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO page_views (
                link_id, session_id, page_number, duration_secs,
                max_scroll_depth_pct, revisit_count
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 0)
            ON CONFLICT(session_id, page_number) DO UPDATE SET
                duration_secs = page_views.duration_secs + excluded.duration_secs,
                max_scroll_depth_pct = MAX(page_views.max_scroll_depth_pct, excluded.max_scroll_depth_pct),
                revisit_count = page_views.revisit_count + 1
            "#,
            params![
                view.link_id,
                view.session_id,
                view.page_number,
                view.duration_secs,
                view.max_scroll_depth_pct,
            ],
        )?;
        Ok(())
    }

    /// Number of distinct pages a session has visited
    pub fn count_session_pages(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM page_views WHERE session_id = ?",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All page views for a link
    pub fn list_page_views(&self, link_id: &str) -> Result<Vec<PageView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM page_views WHERE link_id = ? ORDER BY session_id, page_number",
        )?;
        let views = stmt
            .query_map([link_id], Self::row_to_page_view)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(views)
    }

    fn row_to_page_view(row: &Row) -> rusqlite::Result<PageView> {
        Ok(PageView {
            link_id: row.get("link_id")?,
            session_id: row.get("session_id")?,
            page_number: row.get("page_number")?,
            duration_secs: row.get("duration_secs")?,
            max_scroll_depth_pct: row.get("max_scroll_depth_pct")?,
            revisit_count: row.get("revisit_count")?,
        })
    }

    // ============================================
    // Contact operations
    // ============================================

    /// Merge a contact observation into the store.
    ///
    /// The merge is commutative and associative (counts and sums add, the
    /// hot-lead flag ORs, last-seen takes the max) and runs as a single
    /// atomic upsert, so concurrent session closes for the same viewer
    /// converge in any order.
    pub fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO contacts (
                account_id, fingerprint, identifier, view_count,
                engagement_sum, hot_lead, last_seen_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(account_id, fingerprint) DO UPDATE SET
                identifier = excluded.identifier,
                view_count = contacts.view_count + excluded.view_count,
                engagement_sum = contacts.engagement_sum + excluded.engagement_sum,
                hot_lead = MAX(contacts.hot_lead, excluded.hot_lead),
                last_seen_at = MAX(contacts.last_seen_at, excluded.last_seen_at)
            "#,
            params![
                contact.account_id,
                contact.fingerprint,
                contact.identifier,
                contact.view_count,
                contact.engagement_sum,
                contact.hot_lead,
                contact.last_seen_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a contact by its upsert key
    pub fn get_contact(&self, account_id: &str, fingerprint: &str) -> Result<Option<Contact>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM contacts WHERE account_id = ?1 AND fingerprint = ?2",
            params![account_id, fingerprint],
            Self::row_to_contact,
        )
        .optional()
        .map_err(Error::from)
    }

    /// List an account's contacts, most recently seen first
    pub fn list_contacts(&self, account_id: &str) -> Result<Vec<Contact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM contacts WHERE account_id = ? ORDER BY last_seen_at DESC, fingerprint",
        )?;
        let contacts = stmt
            .query_map([account_id], Self::row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contacts)
    }

    fn row_to_contact(row: &Row) -> rusqlite::Result<Contact> {
        let last_seen_str: String = row.get("last_seen_at")?;
        Ok(Contact {
            account_id: row.get("account_id")?,
            fingerprint: row.get("fingerprint")?,
            identifier: row.get("identifier")?,
            view_count: row.get("view_count")?,
            engagement_sum: row.get("engagement_sum")?,
            hot_lead: row.get("hot_lead")?,
            last_seen_at: parse_ts(&last_seen_str),
        })
    }

    // ============================================
    // Rollup cache operations
    // ============================================

    /// Get the cached rollup for a link
    pub fn get_link_rollup(
        &self,
        link_id: &str,
    ) -> Result<Option<crate::analytics::LinkRollup>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM link_rollups WHERE link_id = ?",
            [link_id],
            Self::row_to_rollup,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Store a link rollup in the cache
    pub fn put_link_rollup(&self, rollup: &crate::analytics::LinkRollup) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO link_rollups (
                link_id, content_kind, total_views, unique_viewers, hot_leads,
                avg_engagement, completion_rate, return_rate, downloads,
                qr_scans, direct_views, performance_score, computed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(link_id) DO UPDATE SET
                content_kind = excluded.content_kind,
                total_views = excluded.total_views,
                unique_viewers = excluded.unique_viewers,
                hot_leads = excluded.hot_leads,
                avg_engagement = excluded.avg_engagement,
                completion_rate = excluded.completion_rate,
                return_rate = excluded.return_rate,
                downloads = excluded.downloads,
                qr_scans = excluded.qr_scans,
                direct_views = excluded.direct_views,
                performance_score = excluded.performance_score,
                computed_at = excluded.computed_at
            "#,
            params![
                rollup.link_id,
                rollup.content_kind.as_str(),
                rollup.total_views,
                rollup.unique_viewers,
                rollup.hot_leads,
                rollup.avg_engagement,
                rollup.completion_rate,
                rollup.return_rate,
                rollup.downloads,
                rollup.qr_scans,
                rollup.direct_views,
                rollup.performance_score,
                rollup.computed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_rollup(row: &Row) -> rusqlite::Result<crate::analytics::LinkRollup> {
        let kind_str: String = row.get("content_kind")?;
        let computed_at_str: String = row.get("computed_at")?;
        Ok(crate::analytics::LinkRollup {
            link_id: row.get("link_id")?,
            content_kind: ContentKind::from_str(&kind_str).unwrap_or(ContentKind::Other),
            total_views: row.get("total_views")?,
            unique_viewers: row.get("unique_viewers")?,
            hot_leads: row.get("hot_leads")?,
            avg_engagement: row.get("avg_engagement")?,
            completion_rate: row.get("completion_rate")?,
            return_rate: row.get("return_rate")?,
            downloads: row.get("downloads")?,
            qr_scans: row.get("qr_scans")?,
            direct_views: row.get("direct_views")?,
            performance_score: row.get("performance_score")?,
            computed_at: parse_ts(&computed_at_str),
        })
    }

    // ============================================
    // Import checkpoints
    // ============================================

    /// Byte offset the last import of this file reached
    pub fn get_checkpoint(&self, source_path: &str) -> Result<Option<u64>> {
        let conn = self.conn.lock().unwrap();
        let offset: Option<i64> = conn
            .query_row(
                "SELECT byte_offset FROM import_checkpoints WHERE source_path = ?",
                [source_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(offset.map(|o| o.max(0) as u64))
    }

    /// Record the byte offset an import reached
    pub fn set_checkpoint(
        &self,
        source_path: &str,
        byte_offset: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO import_checkpoints (source_path, byte_offset, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(source_path) DO UPDATE SET
                byte_offset = excluded.byte_offset,
                updated_at = excluded.updated_at
            "#,
            params![source_path, byte_offset as i64, updated_at.to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Parse an RFC 3339 timestamp stored as text, falling back to the epoch
/// on corruption rather than failing the whole row.
fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!(value, "unparseable stored timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        })
}
