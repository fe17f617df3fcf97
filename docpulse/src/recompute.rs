//! docpulse-recompute - batch refresh of cached scores and rollups
//!
//! Recomputes every cached session score and link rollup from raw
//! telemetry, reporting how many cached scores had drifted from the
//! scorer's output. Intended to run from cron after large imports or a
//! scorer upgrade.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use docpulse_core::analytics::AnalyticsEngine;
use docpulse_core::{Config, Database};

#[derive(Parser)]
#[command(name = "docpulse-recompute")]
#[command(about = "Recompute cached engagement scores and link rollups")]
#[command(version)]
struct Args {
    /// Database path (defaults to the XDG data directory)
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = docpulse_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let db_path = args.db.unwrap_or_else(Config::database_path);
    tracing::info!(db = %db_path.display(), "docpulse-recompute starting");
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let engine = AnalyticsEngine::new(config.scoring);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Recomputing scores and rollups...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let summary = engine
        .recompute_all(&db, Utc::now())
        .context("recompute failed")?;
    spinner.finish_and_clear();

    println!(
        "Recomputed {} session(s) across {} link(s)",
        summary.sessions_checked, summary.links
    );
    if summary.drifted > 0 {
        println!(
            "{} cached score(s) disagreed with recomputation and were corrected",
            summary.drifted
        );
    } else {
        println!("All cached scores matched recomputation");
    }
    Ok(())
}
