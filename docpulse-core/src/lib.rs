//! # docpulse-core
//!
//! Core library for docpulse - viewer engagement analytics for shared
//! documents and tracked links.
//!
//! This library provides:
//! - Domain types for links, sessions, page views and contacts
//! - Database storage layer with SQLite
//! - Event-log ingestion
//! - The engagement scoring and aggregation core
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Layer 0 (Raw):** JSONL event exports from the capture side (immutable)
//! - **Layer 1 (Canonical):** Normalized SQLite tables (links, sessions, page views)
//! - **Layer 2 (Derived):** Cached scores, rollups, contacts and insights (regenerable)
//!
//! ## Example
//!
//! ```rust,no_run
//! use docpulse_core::analytics::AnalyticsEngine;
//! use docpulse_core::{Config, Database};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let engine = AnalyticsEngine::new(config.scoring);
//! let report = engine
//!     .link_report(&db, "q3-deck", chrono::Utc::now())
//!     .expect("failed to build report");
//! println!("{} views", report.rollup.total_views);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Database, SessionFilter};
pub use error::{Error, Result};
pub use ingest::{ImportCoordinator, ImportSummary};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod types;
