//! Page heatmap and drop-off analysis.
//!
//! The heatmap classifies each page against the link's *own* dwell-time
//! distribution (quartile banding), so a dense legal contract and a
//! three-slide teaser both get a meaningful spread. Drop-off uses the
//! per-viewer max-page signal rather than raw page-view rows, so a viewer
//! rereading page three is not counted as leaving at page three.

use std::collections::BTreeMap;

use crate::types::{PageView, ViewSession};

/// Relative heat tier for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatLevel {
    /// Top quartile of page dwell time
    Hot,
    /// Above median
    Medium,
    /// Above the bottom quartile
    Cool,
    /// Bottom quartile
    Cold,
}

impl HeatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeatLevel::Hot => "hot",
            HeatLevel::Medium => "medium",
            HeatLevel::Cool => "cool",
            HeatLevel::Cold => "cold",
        }
    }
}

/// Dwell statistics and heat tier for one page.
#[derive(Debug, Clone)]
pub struct PageHeat {
    /// 1-based page number
    pub page_number: i32,
    /// Mean seconds spent on this page per page view
    pub avg_time_secs: f64,
    /// Number of page-view records folded in
    pub view_count: i64,
    /// Tier relative to the link's other pages
    pub heat: HeatLevel,
}

/// Retention statistics for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDropOff {
    /// 1-based page number
    pub page_number: i32,
    /// Viewers whose furthest page is at least this one
    pub viewers_reached: i64,
    /// Viewers who reached this page but not the next
    pub dropped: i64,
    /// `dropped / viewers_reached` as a rounded percentage
    pub drop_off_rate: i64,
}

/// Build the per-page heatmap for a link.
///
/// Returns one entry per page in [1, total_pages]. Empty input or an
/// unknown page count yields an empty result.
pub fn page_heatmap(page_views: &[PageView], total_pages: i32) -> Vec<PageHeat> {
    if total_pages <= 0 || page_views.is_empty() {
        return Vec::new();
    }

    let mut totals: BTreeMap<i32, (f64, i64)> = BTreeMap::new();
    for view in page_views {
        let page = view.page_number.clamp(1, total_pages);
        if page != view.page_number {
            tracing::warn!(
                session_id = %view.session_id,
                page_number = view.page_number,
                total_pages,
                "clamped out-of-range page number"
            );
        }
        let duration = if view.duration_secs.is_finite() && view.duration_secs >= 0.0 {
            view.duration_secs
        } else {
            tracing::warn!(
                session_id = %view.session_id,
                duration = view.duration_secs,
                "sanitized invalid page dwell time"
            );
            0.0
        };
        let entry = totals.entry(page).or_insert((0.0, 0));
        entry.0 += duration;
        entry.1 += 1;
    }

    let averages: Vec<(i32, f64, i64)> = (1..=total_pages)
        .map(|page| {
            let (sum, count) = totals.get(&page).copied().unwrap_or((0.0, 0));
            let avg = if count > 0 { sum / count as f64 } else { 0.0 };
            (page, avg, count)
        })
        .collect();

    let mut sorted: Vec<f64> = averages.iter().map(|(_, avg, _)| *avg).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q25 = percentile(&sorted, 0.25);
    let q50 = percentile(&sorted, 0.50);
    let q75 = percentile(&sorted, 0.75);

    averages
        .into_iter()
        .map(|(page_number, avg_time_secs, view_count)| PageHeat {
            page_number,
            avg_time_secs,
            view_count,
            heat: classify(avg_time_secs, q25, q50, q75),
        })
        .collect()
}

/// Per-page drop-off from the viewers' furthest-page signal.
///
/// The last page has a drop-off rate of zero; there is nowhere further to
/// go. Empty input or an unknown page count yields an empty result.
pub fn drop_off_by_page(sessions: &[ViewSession], total_pages: i32) -> Vec<PageDropOff> {
    if total_pages <= 0 || sessions.is_empty() {
        return Vec::new();
    }

    // Furthest page per viewer, across all of that viewer's sessions.
    let mut viewer_max: BTreeMap<String, i32> = BTreeMap::new();
    for session in sessions {
        let max_page = session.max_page_reached.clamp(0, total_pages);
        let entry = viewer_max
            .entry(session.viewer().storage_key())
            .or_insert(0);
        *entry = (*entry).max(max_page);
    }

    let reached = |page: i32| -> i64 {
        viewer_max.values().filter(|max| **max >= page).count() as i64
    };

    (1..=total_pages)
        .map(|page| {
            let viewers_reached = reached(page);
            let (dropped, drop_off_rate) = if page == total_pages || viewers_reached == 0 {
                (0, 0)
            } else {
                let dropped = viewers_reached - reached(page + 1);
                let rate = (dropped as f64 / viewers_reached as f64 * 100.0).round() as i64;
                (dropped, rate)
            };
            PageDropOff {
                page_number: page,
                viewers_reached,
                dropped,
                drop_off_rate,
            }
        })
        .collect()
}

/// Linear-interpolation percentile over a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = p * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn classify(avg: f64, q25: f64, q50: f64, q75: f64) -> HeatLevel {
    if avg >= q75 {
        HeatLevel::Hot
    } else if avg >= q50 {
        HeatLevel::Medium
    } else if avg >= q25 {
        HeatLevel::Cool
    } else {
        HeatLevel::Cold
    }
}
