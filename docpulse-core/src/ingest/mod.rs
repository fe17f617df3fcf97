//! Event-log ingestion
//!
//! Folds raw JSONL tracking events into the canonical store. Design
//! principles:
//!
//! 1. **Resilience**: a malformed or out-of-order line becomes a warning,
//!    never a failed import
//! 2. **Incremental**: a byte-offset checkpoint per source file lets
//!    repeated imports pick up where the last one stopped
//! 3. **Score on close**: a `session_end` event routes through the
//!    analytics engine, which caches the engagement score and merges the
//!    viewer into the account's contacts

pub mod events;

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use chrono::Utc;

use crate::analytics::AnalyticsEngine;
use crate::config::ScoringConfig;
use crate::db::Database;
use crate::error::Result;
use crate::types::{
    ContentKind, Link, PageView, TrafficSource, ViewSession, ViewerKey,
};
use events::{ActionKind, RawEvent};

/// Account used when an event stream references a link nobody registered.
const FALLBACK_ACCOUNT: &str = "unassigned";

/// Outcome of one import run.
#[derive(Debug, Default)]
pub struct ImportSummary {
    /// Files processed
    pub files: usize,
    /// Events applied
    pub events: usize,
    /// Sessions created
    pub sessions_started: usize,
    /// Sessions closed and scored
    pub sessions_closed: usize,
    /// Page-view events folded
    pub page_views: usize,
    /// Lines skipped as malformed or orphaned
    pub skipped_lines: usize,
    /// Non-fatal problems encountered
    pub warnings: Vec<String>,
}

impl ImportSummary {
    fn absorb(&mut self, other: ImportSummary) {
        self.files += other.files;
        self.events += other.events;
        self.sessions_started += other.sessions_started;
        self.sessions_closed += other.sessions_closed;
        self.page_views += other.page_views;
        self.skipped_lines += other.skipped_lines;
        self.warnings.extend(other.warnings);
    }
}

/// Imports event-log files into the store.
pub struct ImportCoordinator<'a> {
    db: &'a Database,
    engine: AnalyticsEngine,
}

impl<'a> ImportCoordinator<'a> {
    pub fn new(db: &'a Database, config: ScoringConfig) -> Self {
        Self {
            db,
            engine: AnalyticsEngine::new(config),
        }
    }

    /// Import several files, accumulating one summary.
    pub fn import_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for path in paths {
            summary.absorb(self.import_file(path.as_ref())?);
        }
        Ok(summary)
    }

    /// Import one file, resuming from its checkpoint.
    pub fn import_file(&self, path: &Path) -> Result<ImportSummary> {
        let source_path = path.to_string_lossy().to_string();
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut offset = self.db.get_checkpoint(&source_path)?.unwrap_or(0);
        if offset > file_size {
            tracing::warn!(
                source = %source_path,
                checkpoint = offset,
                file_size,
                "Source file shrank since last import, re-reading from start"
            );
            offset = 0;
        }

        let mut summary = ImportSummary {
            files: 1,
            ..Default::default()
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            offset += read as u64;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match events::parse_line(trimmed) {
                Ok(event) => self.apply_event(event, &mut summary)?,
                Err(e) => {
                    summary.skipped_lines += 1;
                    summary
                        .warnings
                        .push(format!("{}: unparseable line: {}", source_path, e));
                    tracing::warn!(source = %source_path, error = %e, "Skipping unparseable line");
                }
            }
        }

        self.db.set_checkpoint(&source_path, offset, Utc::now())?;

        tracing::info!(
            source = %source_path,
            events = summary.events,
            skipped = summary.skipped_lines,
            "Import complete"
        );
        Ok(summary)
    }

    fn apply_event(&self, event: RawEvent, summary: &mut ImportSummary) -> Result<()> {
        summary.events += 1;
        match event {
            RawEvent::SessionStart(e) => {
                let link = self.ensure_link(&e, summary)?;
                let viewer_key = ViewerKey::for_session(
                    e.viewer_email.as_deref(),
                    e.ip_address.as_deref(),
                    &e.session_id,
                );
                let return_visit_count = e.return_visit_count.unwrap_or(0).max(0);
                let session = ViewSession {
                    id: e.session_id,
                    link_id: link.id.clone(),
                    viewer_key: viewer_key.storage_key(),
                    viewer_email: e.viewer_email,
                    ip_address: e.ip_address,
                    started_at: e.ts,
                    ended_at: None,
                    duration_secs: 0,
                    pages_viewed: 0,
                    max_page_reached: 0,
                    total_pages: link.total_pages.or(e.total_pages),
                    exit_page: None,
                    idle_secs: 0,
                    tab_switches: 0,
                    max_scroll_depth_pct: 0.0,
                    downloaded: false,
                    printed: false,
                    copied: false,
                    is_return_visit: return_visit_count > 0,
                    return_visit_count,
                    source: e.source.unwrap_or(TrafficSource::Unknown),
                    content_kind: link.content_kind,
                    video: None,
                    engagement_score: None,
                    intent: None,
                    score_version: None,
                    metadata: serde_json::json!({}),
                };
                self.db.upsert_session(&session)?;
                summary.sessions_started += 1;
            }
            RawEvent::PageView(e) => {
                let Some(mut session) = self.orphan_check(&e.session_id, "page_view", summary)?
                else {
                    return Ok(());
                };
                let duration = e.duration_secs.unwrap_or(0.0).max(0.0);
                let scroll = e.scroll_depth_pct.unwrap_or(0.0).clamp(0.0, 100.0);

                self.db.record_page_view(&PageView {
                    link_id: session.link_id.clone(),
                    session_id: session.id.clone(),
                    page_number: e.page,
                    duration_secs: duration,
                    max_scroll_depth_pct: scroll,
                    revisit_count: 0,
                })?;

                session.pages_viewed = self.db.count_session_pages(&session.id)? as i32;
                session.max_page_reached = session.max_page_reached.max(e.page);
                session.exit_page = Some(e.page);
                session.duration_secs += duration.round() as i64;
                session.max_scroll_depth_pct = session.max_scroll_depth_pct.max(scroll);
                self.db.upsert_session(&session)?;
                summary.page_views += 1;
            }
            RawEvent::VideoProgress(e) => {
                let Some(mut session) =
                    self.orphan_check(&e.session_id, "video_progress", summary)?
                else {
                    return Ok(());
                };
                let mut video = session.video.take().unwrap_or_default();
                // Counters are cumulative; keep the furthest point seen.
                video.watch_time_secs = video.watch_time_secs.max(e.watch_time_secs.unwrap_or(0.0));
                video.video_duration_secs = video
                    .video_duration_secs
                    .max(e.video_duration_secs.unwrap_or(0.0));
                video.completion_pct = video.completion_pct.max(e.completion_pct.unwrap_or(0.0));
                video.finished = video.finished || e.finished.unwrap_or(false);
                session.duration_secs = session.duration_secs.max(video.watch_time_secs.round() as i64);
                session.video = Some(video);
                self.db.upsert_session(&session)?;
            }
            RawEvent::Action(e) => {
                let Some(mut session) = self.orphan_check(&e.session_id, "action", summary)?
                else {
                    return Ok(());
                };
                match e.kind {
                    ActionKind::Download => session.downloaded = true,
                    ActionKind::Print => session.printed = true,
                    ActionKind::Copy => session.copied = true,
                }
                self.db.upsert_session(&session)?;
            }
            RawEvent::SessionEnd(e) => {
                let Some(mut session) =
                    self.orphan_check(&e.session_id, "session_end", summary)?
                else {
                    return Ok(());
                };
                if let Some(duration) = e.duration_secs {
                    session.duration_secs = duration.max(0);
                }
                session.idle_secs = e.idle_secs.unwrap_or(session.idle_secs).max(0);
                session.tab_switches = e.tab_switches.unwrap_or(session.tab_switches).max(0);
                self.db.upsert_session(&session)?;

                self.engine.close_session(self.db, &session.id, e.ts)?;
                summary.sessions_closed += 1;
            }
        }
        Ok(())
    }

    /// Fetch the session an event refers to, or record an orphan warning.
    fn orphan_check(
        &self,
        session_id: &str,
        event_kind: &str,
        summary: &mut ImportSummary,
    ) -> Result<Option<ViewSession>> {
        match self.db.get_session(session_id)? {
            Some(session) => Ok(Some(session)),
            None => {
                summary.events -= 1;
                summary.skipped_lines += 1;
                summary.warnings.push(format!(
                    "{} event for unknown session {}",
                    event_kind, session_id
                ));
                tracing::warn!(session_id, event_kind, "Dropping event for unknown session");
                Ok(None)
            }
        }
    }

    /// Look up the link a session refers to, auto-creating a stub when the
    /// event stream knows more than the store does.
    fn ensure_link(
        &self,
        e: &events::SessionStartEvent,
        summary: &mut ImportSummary,
    ) -> Result<Link> {
        if let Some(link) = self.db.get_link(&e.link_id)? {
            return Ok(link);
        }

        let link = Link {
            id: e.link_id.clone(),
            account_id: e
                .account_id
                .clone()
                .unwrap_or_else(|| FALLBACK_ACCOUNT.to_string()),
            name: e.link_name.clone().unwrap_or_else(|| e.link_id.clone()),
            content_kind: e.content_kind.unwrap_or(ContentKind::Other),
            total_pages: e.total_pages,
            created_at: e.ts,
            metadata: serde_json::json!({}),
        };
        self.db.upsert_link(&link)?;
        summary
            .warnings
            .push(format!("auto-created link {} from event stream", link.id));
        tracing::info!(link_id = %link.id, "Auto-created link from event stream");
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn write_fixture(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const BASIC_EVENTS: &str = r#"{"event":"session_start","session_id":"s-1","link_id":"l-1","ts":"2026-03-01T12:00:00Z","account_id":"acct-1","link_name":"Deck","content_kind":"document","total_pages":5,"viewer_email":"alice@example.com","source":"direct"}
{"event":"page_view","session_id":"s-1","ts":"2026-03-01T12:00:30Z","page":1,"duration_secs":30,"scroll_depth_pct":90}
{"event":"page_view","session_id":"s-1","ts":"2026-03-01T12:01:30Z","page":2,"duration_secs":60,"scroll_depth_pct":100}
{"event":"action","session_id":"s-1","ts":"2026-03-01T12:02:00Z","kind":"download"}
{"event":"session_end","session_id":"s-1","ts":"2026-03-01T12:02:00Z"}
"#;

    #[test]
    fn test_basic_import() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "events.jsonl", BASIC_EVENTS);

        let coordinator = ImportCoordinator::new(&db, ScoringConfig::default());
        let summary = coordinator.import_file(&path).unwrap();

        assert_eq!(summary.events, 5);
        assert_eq!(summary.sessions_started, 1);
        assert_eq!(summary.sessions_closed, 1);
        assert_eq!(summary.page_views, 2);
        assert_eq!(summary.skipped_lines, 0);

        let link = db.get_link("l-1").unwrap().unwrap();
        assert_eq!(link.account_id, "acct-1");
        assert_eq!(link.total_pages, Some(5));

        let session = db.get_session("s-1").unwrap().unwrap();
        assert!(session.is_closed());
        assert_eq!(session.duration_secs, 90);
        assert_eq!(session.max_page_reached, 2);
        assert_eq!(session.pages_viewed, 2);
        assert!(session.downloaded);
        // 90s of 120s = 22.5, completion 2/5 = 12, download 20: floor 54
        assert_eq!(session.engagement_score, Some(54));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        let content = format!("not json at all\n{}{{\"event\":\"bogus\"}}\n", BASIC_EVENTS);
        let path = write_fixture(&dir, "events.jsonl", &content);

        let coordinator = ImportCoordinator::new(&db, ScoringConfig::default());
        let summary = coordinator.import_file(&path).unwrap();

        assert_eq!(summary.skipped_lines, 2);
        assert_eq!(summary.events, 5);
        assert!(db.get_session("s-1").unwrap().is_some());
    }

    #[test]
    fn test_orphan_events_become_warnings() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        let content = r#"{"event":"page_view","session_id":"ghost","ts":"2026-03-01T12:00:00Z","page":1,"duration_secs":5}
"#;
        let path = write_fixture(&dir, "events.jsonl", content);

        let coordinator = ImportCoordinator::new(&db, ScoringConfig::default());
        let summary = coordinator.import_file(&path).unwrap();

        assert_eq!(summary.events, 0);
        assert_eq!(summary.skipped_lines, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("ghost"));
    }

    #[test]
    fn test_checkpoint_resume() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "events.jsonl", BASIC_EVENTS);
        let coordinator = ImportCoordinator::new(&db, ScoringConfig::default());

        let first = coordinator.import_file(&path).unwrap();
        assert_eq!(first.events, 5);

        // Re-import without new data: nothing to do.
        let second = coordinator.import_file(&path).unwrap();
        assert_eq!(second.events, 0);

        // Append another session and import again: only the new events run.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(
            concat!(
                r#"{"event":"session_start","session_id":"s-2","link_id":"l-1","ts":"2026-03-02T09:00:00Z","ip_address":"10.0.0.9"}"#,
                "\n"
            )
            .as_bytes(),
        )
        .unwrap();

        let third = coordinator.import_file(&path).unwrap();
        assert_eq!(third.events, 1);
        assert_eq!(third.sessions_started, 1);

        let s2 = db.get_session("s-2").unwrap().unwrap();
        assert_eq!(s2.viewer_key, "ip:10.0.0.9");
        // The stub link registered by the first session start carries over.
        assert_eq!(s2.content_kind, ContentKind::Document);
    }
}
