//! docpulse - viewer engagement analytics CLI
//!
//! Imports raw tracking events and renders the analytics the core
//! computes: link rollups, viewer lead rollups, page heatmaps, drop-off
//! tables, and insight/action lists. All score math lives in
//! `docpulse-core`; this binary only formats it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use docpulse_core::analytics::{registry, AnalyticsEngine};
use docpulse_core::config::PlanTier;
use docpulse_core::format::format_duration_secs;
use docpulse_core::ingest::ImportCoordinator;
use docpulse_core::{Config, Database, SessionFilter};

#[derive(Parser)]
#[command(name = "docpulse")]
#[command(about = "Viewer engagement analytics for shared documents and links")]
#[command(version)]
struct Cli {
    /// Database path (defaults to the XDG data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import event-log files into the store
    Import {
        /// JSONL event files to import
        files: Vec<PathBuf>,
    },
    /// List links with their rollup summaries
    Links,
    /// Full report for one link: rollup, heatmap, drop-off
    Report {
        /// Link id
        link: String,
    },
    /// Per-viewer lead rollups for one link
    Viewers {
        /// Link id
        link: String,
    },
    /// Insights and suggested actions for one link
    Insights {
        /// Link id
        link: String,
    },
    /// Export per-session rows as CSV (columns gated by plan tier)
    Export {
        /// Link id
        link: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the derived metrics this tool computes
    Metrics,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = docpulse_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let db_path = cli.db.clone().unwrap_or_else(Config::database_path);
    tracing::info!(db = %db_path.display(), "docpulse starting");
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let engine = AnalyticsEngine::new(config.scoring);

    match cli.command {
        Command::Import { files } => import(&db, &engine, &files),
        Command::Links => links(&db, &engine),
        Command::Report { link } => report(&db, &engine, &link),
        Command::Viewers { link } => viewers(&db, &engine, &link),
        Command::Insights { link } => insights(&db, &engine, &link),
        Command::Export { link, out } => export(&db, &engine, &link, out, config.plan.tier),
        Command::Metrics => metrics(),
    }
}

fn import(db: &Database, engine: &AnalyticsEngine, files: &[PathBuf]) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("no event files given");
    }

    let coordinator = ImportCoordinator::new(db, *engine.config());

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut total_events = 0usize;
    let mut total_skipped = 0usize;
    let mut warnings = Vec::new();
    for file in files {
        bar.set_message(file.display().to_string());
        let summary = coordinator
            .import_file(file)
            .with_context(|| format!("failed to import {}", file.display()))?;
        total_events += summary.events;
        total_skipped += summary.skipped_lines;
        warnings.extend(summary.warnings);
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!("Imported {} events from {} file(s)", total_events, files.len());
    if total_skipped > 0 {
        println!("Skipped {} line(s); see warnings below", total_skipped);
    }
    for warning in &warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

fn links(db: &Database, engine: &AnalyticsEngine) -> Result<()> {
    let all = db.list_links()?;
    if all.is_empty() {
        println!("No links in database.");
        println!("Run 'docpulse import <events.jsonl>' first.");
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<20} {:<10} {:>6} {:>8} {:>6} {:>6} {:>5}",
        "LINK", "KIND", "VIEWS", "VIEWERS", "ENG", "PERF", "HOT"
    );
    for link in all {
        let rollup = engine.ensure_link_rollup(db, &link.id, now)?;
        println!(
            "{:<20} {:<10} {:>6} {:>8} {:>6} {:>6} {:>5}",
            link.id,
            link.content_kind.as_str(),
            rollup.total_views,
            rollup.unique_viewers,
            rollup.avg_engagement,
            rollup.performance_score,
            rollup.hot_leads,
        );
    }
    Ok(())
}

fn report(db: &Database, engine: &AnalyticsEngine, link_id: &str) -> Result<()> {
    let report = engine.link_report(db, link_id, Utc::now())?;
    let rollup = &report.rollup;

    println!("{} ({})", report.link.name, report.link.content_kind);
    println!();
    println!("Total views:      {}", rollup.total_views);
    println!("Unique viewers:   {}", rollup.unique_viewers);
    println!("Hot leads:        {}", rollup.hot_leads);
    println!("Avg engagement:   {}", rollup.avg_engagement);
    println!("Completion rate:  {}%", rollup.completion_rate);
    println!("Return rate:      {}%", rollup.return_rate);
    println!("Downloads:        {}", rollup.downloads);
    println!("QR / direct:      {} / {}", rollup.qr_scans, rollup.direct_views);
    println!("Performance:      {}", rollup.performance_score);

    if !report.heatmap.is_empty() {
        println!();
        println!("{:<6} {:>10} {:>7}  HEAT", "PAGE", "AVG TIME", "VIEWS");
        for page in &report.heatmap {
            println!(
                "{:<6} {:>9.1}s {:>7}  {}",
                page.page_number,
                page.avg_time_secs,
                page.view_count,
                page.heat.as_str()
            );
        }
    }

    if !report.drop_offs.is_empty() {
        println!();
        println!("{:<6} {:>8} {:>8} {:>6}", "PAGE", "REACHED", "DROPPED", "RATE");
        for page in &report.drop_offs {
            println!(
                "{:<6} {:>8} {:>8} {:>5}%",
                page.page_number, page.viewers_reached, page.dropped, page.drop_off_rate
            );
        }
    }
    Ok(())
}

fn viewers(db: &Database, engine: &AnalyticsEngine, link_id: &str) -> Result<()> {
    let rollups = engine.viewer_rollups(db, link_id)?;
    if rollups.is_empty() {
        println!("No sessions recorded for {}", link_id);
        return Ok(());
    }

    println!(
        "{:<32} {:>6} {:>10} {:>6} {:>6}  INTENT",
        "VIEWER", "VIEWS", "TIME", "BEST", "SCORE"
    );
    for rollup in rollups {
        println!(
            "{:<32} {:>6} {:>10} {:>6} {:>6}  {}{}",
            rollup.key.display(),
            rollup.session_count,
            format_duration_secs(rollup.total_duration_secs),
            rollup.best_score,
            rollup.aggregated_score(),
            rollup.intent(),
            if rollup.is_hot_lead() { " *" } else { "" },
        );
    }
    Ok(())
}

fn insights(db: &Database, engine: &AnalyticsEngine, link_id: &str) -> Result<()> {
    let report = engine.link_insights(db, link_id, Utc::now())?;

    if report.actions.is_empty() && report.insights.is_empty() {
        println!("Nothing to report yet for {}", link_id);
        return Ok(());
    }

    if !report.actions.is_empty() {
        println!("Suggested actions:");
        for action in &report.actions {
            println!(
                "  [{}] {} {} - {}",
                action.priority.as_str(),
                action.icon,
                action.label,
                action.reason
            );
            let buttons: Vec<String> = action
                .buttons
                .iter()
                .map(|b| format!("{} {}", b.icon, b.label))
                .collect();
            println!("        {}", buttons.join("  |  "));
        }
    }

    if !report.insights.is_empty() {
        println!();
        println!("Insights:");
        for insight in &report.insights {
            println!(
                "  [{}] {} {} - {}",
                insight.priority.as_str(),
                insight.icon,
                insight.label,
                insight.reason
            );
        }
    }
    Ok(())
}

fn export(
    db: &Database,
    engine: &AnalyticsEngine,
    link_id: &str,
    out: Option<PathBuf>,
    tier: PlanTier,
) -> Result<()> {
    let sessions = db.list_sessions(&SessionFilter::for_link(link_id))?;

    let mut header = vec![
        "session_id",
        "viewer",
        "started_at",
        "duration_secs",
        "pages_viewed",
        "completion_pct",
    ];
    if tier.exposes_engagement() {
        header.extend(["engagement_score", "intent", "downloaded", "return_visit"]);
    }
    if tier.exposes_attention_detail() {
        header.extend(["idle_secs", "tab_switches", "max_scroll_depth_pct", "source"]);
    }

    let mut rows = vec![header.join(",")];
    for session in &sessions {
        let mut row = vec![
            csv_field(&session.id),
            csv_field(session.viewer().display()),
            session.started_at.to_rfc3339(),
            session.duration_secs.to_string(),
            session.pages_viewed.to_string(),
            format!("{:.0}", session.completion_pct()),
        ];
        if tier.exposes_engagement() {
            let score = engine.ensure_session_score(db, &session.id)?;
            row.push(score.score.to_string());
            row.push(score.intent.to_string());
            row.push(session.downloaded.to_string());
            row.push(session.is_return_visit.to_string());
        }
        if tier.exposes_attention_detail() {
            row.push(session.idle_secs.to_string());
            row.push(session.tab_switches.to_string());
            row.push(format!("{:.0}", session.max_scroll_depth_pct));
            row.push(session.source.as_str().to_string());
        }
        rows.push(row.join(","));
    }

    let csv = rows.join("\n") + "\n";
    match out {
        Some(path) => {
            std::fs::write(&path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {} row(s) to {}", sessions.len(), path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}

fn metrics() -> Result<()> {
    println!("{:<10} {:<20} {:<8}  SUMMARY", "ENTITY", "METRIC", "TYPE");
    for metric in registry::list_metrics() {
        println!(
            "{:<10} {:<20} {:<8}  {}",
            metric.entity_type,
            metric.name,
            metric.value_type.as_str(),
            metric.summary
        );
    }
    Ok(())
}

/// Quote a CSV field if it contains a delimiter.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
