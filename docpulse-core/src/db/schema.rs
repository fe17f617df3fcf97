//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- LAYER 1: Canonical telemetry
    -- ============================================

    CREATE TABLE IF NOT EXISTS links (
        id                TEXT PRIMARY KEY,
        account_id        TEXT NOT NULL,
        name              TEXT NOT NULL,
        content_kind      TEXT NOT NULL,
        total_pages       INTEGER,
        created_at        DATETIME NOT NULL,
        metadata          JSON
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id                  TEXT PRIMARY KEY,
        link_id             TEXT NOT NULL REFERENCES links(id),
        viewer_email        TEXT,
        ip_address          TEXT,
        viewer_key          TEXT NOT NULL,
        started_at          DATETIME NOT NULL,
        ended_at            DATETIME,
        duration_secs       INTEGER NOT NULL DEFAULT 0,

        -- Document progress
        pages_viewed        INTEGER NOT NULL DEFAULT 0,
        max_page_reached    INTEGER NOT NULL DEFAULT 0,
        total_pages         INTEGER,
        exit_page           INTEGER,

        -- Engagement signals
        idle_secs           INTEGER NOT NULL DEFAULT 0,
        tab_switches        INTEGER NOT NULL DEFAULT 0,
        max_scroll_depth_pct REAL NOT NULL DEFAULT 0,

        -- Actions
        downloaded          INTEGER NOT NULL DEFAULT 0,
        printed             INTEGER NOT NULL DEFAULT 0,
        copied              INTEGER NOT NULL DEFAULT 0,
        is_return_visit     INTEGER NOT NULL DEFAULT 0,
        return_visit_count  INTEGER NOT NULL DEFAULT 0,

        source              TEXT NOT NULL DEFAULT 'unknown',
        content_kind        TEXT NOT NULL,
        video               JSON,

        -- Layer 2: derived, regenerable
        engagement_score    INTEGER,
        intent              TEXT,

        metadata            JSON
    );

    CREATE INDEX idx_sessions_link ON sessions(link_id);
    CREATE INDEX idx_sessions_viewer ON sessions(viewer_key);
    CREATE INDEX idx_sessions_started ON sessions(started_at);

    CREATE TABLE IF NOT EXISTS page_views (
        link_id             TEXT NOT NULL REFERENCES links(id),
        session_id          TEXT NOT NULL REFERENCES sessions(id),
        page_number         INTEGER NOT NULL,
        duration_secs       REAL NOT NULL DEFAULT 0,
        max_scroll_depth_pct REAL NOT NULL DEFAULT 0,
        revisit_count       INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (session_id, page_number)
    );

    CREATE INDEX idx_page_views_link ON page_views(link_id);

    -- ============================================
    -- LAYER 2: Derived (regenerable)
    -- ============================================

    CREATE TABLE IF NOT EXISTS contacts (
        account_id       TEXT NOT NULL,
        fingerprint      TEXT NOT NULL,
        identifier       TEXT NOT NULL,
        view_count       INTEGER NOT NULL DEFAULT 0,
        engagement_sum   INTEGER NOT NULL DEFAULT 0,
        hot_lead         INTEGER NOT NULL DEFAULT 0,
        last_seen_at     DATETIME NOT NULL,
        PRIMARY KEY (account_id, fingerprint)
    );

    -- ============================================
    -- Ingestion bookkeeping
    -- ============================================

    CREATE TABLE IF NOT EXISTS import_checkpoints (
        source_path      TEXT PRIMARY KEY,
        byte_offset      INTEGER NOT NULL,
        updated_at       DATETIME NOT NULL
    );
    "#,
    // Version 2: Cached link rollups and score versioning
    r#"
    CREATE TABLE IF NOT EXISTS link_rollups (
        link_id           TEXT PRIMARY KEY REFERENCES links(id),
        content_kind      TEXT NOT NULL,
        total_views       INTEGER NOT NULL,
        unique_viewers    INTEGER NOT NULL,
        hot_leads         INTEGER NOT NULL,
        avg_engagement    INTEGER NOT NULL,
        completion_rate   INTEGER NOT NULL,
        return_rate       INTEGER NOT NULL,
        downloads         INTEGER NOT NULL,
        qr_scans          INTEGER NOT NULL,
        direct_views      INTEGER NOT NULL,
        performance_score INTEGER NOT NULL,
        computed_at       DATETIME NOT NULL
    );

    ALTER TABLE sessions ADD COLUMN score_version INTEGER;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
