//! Insight and action generation.
//!
//! A small rule engine over the link aggregates. Rules emit either an
//! insight (something worth knowing) or an action (something worth doing),
//! each tagged with a priority. Output is recomputed fresh on every read,
//! never cached, and is fully deterministic for identical input: items are
//! ordered by priority, then by deviation magnitude, then by label.
//!
//! Action buttons are plain data (label and icon); binding them to
//! commands is the presentation layer's concern.

use crate::analytics::engagement::HOT_INTENT_THRESHOLD;
use crate::analytics::heatmap::PageDropOff;
use crate::analytics::link::LinkRollup;

/// Drop-off rate above which a page urgently needs attention.
const DROP_OFF_HIGH_PCT: i64 = 30;
/// Drop-off rate at which a page is worth a look.
const DROP_OFF_MEDIUM_PCT: i64 = 15;
/// Completion rate below which a document is losing most viewers.
const LOW_COMPLETION_PCT: i64 = 25;
/// Minimum sessions before completion/trend rules fire.
const MIN_VIEWS_FOR_TRENDS: i64 = 5;

/// Urgency tier for insights and actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// A suggested follow-up button: display data only, no bound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub label: String,
    pub icon: &'static str,
}

impl ActionButton {
    fn new(label: &str, icon: &'static str) -> Self {
        Self {
            label: label.to_string(),
            icon,
        }
    }
}

/// Something worth knowing about a link.
#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub priority: Priority,
    pub icon: &'static str,
    pub label: String,
    pub reason: String,
    /// Deviation magnitude, used only for ordering within a priority tier
    pub magnitude: f64,
}

/// Something worth doing about a link.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionItem {
    pub priority: Priority,
    pub icon: &'static str,
    pub label: String,
    pub reason: String,
    pub buttons: Vec<ActionButton>,
    /// Deviation magnitude, used only for ordering within a priority tier
    pub magnitude: f64,
}

/// Inputs to one generation pass.
///
/// `recent` and `previous` are the two most recent equal-length time
/// windows; trend rules stay silent unless both carry sessions.
#[derive(Debug, Clone, Copy)]
pub struct InsightInputs<'a> {
    /// All-time aggregates for the link
    pub current: &'a LinkRollup,
    /// Most recent trend window
    pub recent: Option<&'a LinkRollup>,
    /// Window immediately before `recent`
    pub previous: Option<&'a LinkRollup>,
    pub drop_offs: &'a [PageDropOff],
}

/// Ordered insight and action lists for one link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    pub actions: Vec<ActionItem>,
}

/// Run every rule over the aggregates.
///
/// A link with no sessions yields empty lists; "no data yet" is the
/// caller's rendering decision, not a placeholder insight.
pub fn generate(inputs: InsightInputs<'_>) -> InsightReport {
    if inputs.current.total_views == 0 {
        return InsightReport::default();
    }

    let mut insights = Vec::new();
    let mut actions = Vec::new();

    drop_off_rules(inputs.drop_offs, &mut actions);
    engagement_rules(inputs.current, &mut insights);
    lead_rules(inputs.current, &mut actions);
    trend_rules(inputs.recent, inputs.previous, &mut insights);

    insights.sort_by(|a, b| {
        (a.priority.rank(), b.magnitude, &a.label)
            .partial_cmp(&(b.priority.rank(), a.magnitude, &b.label))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    actions.sort_by(|a, b| {
        (a.priority.rank(), b.magnitude, &a.label)
            .partial_cmp(&(b.priority.rank(), a.magnitude, &b.label))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    InsightReport { insights, actions }
}

fn drop_off_rules(drop_offs: &[PageDropOff], actions: &mut Vec<ActionItem>) {
    for page in drop_offs {
        let priority = if page.drop_off_rate > DROP_OFF_HIGH_PCT {
            Priority::High
        } else if page.drop_off_rate >= DROP_OFF_MEDIUM_PCT {
            Priority::Medium
        } else {
            continue;
        };

        actions.push(ActionItem {
            priority,
            icon: "📉",
            label: format!("Revise page {}", page.page_number),
            reason: format!(
                "{}% of viewers drop off at page {}",
                page.drop_off_rate, page.page_number
            ),
            buttons: vec![
                ActionButton::new("Edit page", "✏️"),
                ActionButton::new("Reorder pages", "🔀"),
            ],
            magnitude: page.drop_off_rate as f64,
        });
    }
}

fn engagement_rules(current: &LinkRollup, insights: &mut Vec<Insight>) {
    if current.avg_engagement >= HOT_INTENT_THRESHOLD as i64 {
        insights.push(Insight {
            priority: Priority::Medium,
            icon: "⚡",
            label: "Viewers are highly engaged".to_string(),
            reason: format!(
                "Average engagement is {} across {} views",
                current.avg_engagement, current.total_views
            ),
            magnitude: current.avg_engagement as f64,
        });
    }

    if current.content_kind.has_pages()
        && current.total_views >= MIN_VIEWS_FOR_TRENDS
        && current.completion_rate < LOW_COMPLETION_PCT
    {
        insights.push(Insight {
            priority: Priority::Medium,
            icon: "📖",
            label: "Most viewers never finish".to_string(),
            reason: format!(
                "Average completion is only {}% across {} views",
                current.completion_rate, current.total_views
            ),
            magnitude: (LOW_COMPLETION_PCT - current.completion_rate) as f64,
        });
    }
}

fn lead_rules(current: &LinkRollup, actions: &mut Vec<ActionItem>) {
    if current.hot_leads > 0 {
        let plural = if current.hot_leads == 1 { "lead" } else { "leads" };
        actions.push(ActionItem {
            priority: Priority::High,
            icon: "🎯",
            label: format!("Follow up with {} hot {}", current.hot_leads, plural),
            reason: format!(
                "{} of {} viewers show hot intent",
                current.hot_leads, current.unique_viewers
            ),
            buttons: vec![
                ActionButton::new("Email leads", "✉️"),
                ActionButton::new("Export contacts", "📇"),
            ],
            magnitude: current.hot_leads as f64,
        });
    }
}

fn trend_rules(
    recent: Option<&LinkRollup>,
    previous: Option<&LinkRollup>,
    insights: &mut Vec<Insight>,
) {
    let (Some(current), Some(previous)) = (recent, previous) else {
        return;
    };
    if current.total_views == 0 || previous.total_views == 0 {
        return;
    }

    if current.hot_leads > previous.hot_leads {
        insights.push(Insight {
            priority: Priority::Medium,
            icon: "📈",
            label: "Hot leads trending up".to_string(),
            reason: format!(
                "{} hot leads this period, up from {}",
                current.hot_leads, previous.hot_leads
            ),
            magnitude: (current.hot_leads - previous.hot_leads) as f64,
        });
    }

    if current.return_rate > previous.return_rate {
        insights.push(Insight {
            priority: Priority::Low,
            icon: "🔁",
            label: "Return visits trending up".to_string(),
            reason: format!(
                "Return rate is {}%, up from {}%",
                current.return_rate, previous.return_rate
            ),
            magnitude: (current.return_rate - previous.return_rate) as f64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentKind;
    use chrono::{TimeZone, Utc};

    fn rollup(total_views: i64) -> LinkRollup {
        LinkRollup {
            link_id: "l-1".to_string(),
            content_kind: ContentKind::Document,
            total_views,
            unique_viewers: total_views,
            hot_leads: 0,
            avg_engagement: 50,
            completion_rate: 60,
            return_rate: 10,
            downloads: 0,
            qr_scans: 0,
            direct_views: total_views,
            performance_score: 50,
            computed_at: Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    fn drop_off(page: i32, rate: i64) -> PageDropOff {
        PageDropOff {
            page_number: page,
            viewers_reached: 10,
            dropped: rate / 10,
            drop_off_rate: rate,
        }
    }

    #[test]
    fn test_no_sessions_yields_empty_lists() {
        let current = rollup(0);
        let report = generate(InsightInputs {
            current: &current,
            recent: None,
            previous: None,
            drop_offs: &[drop_off(1, 90)],
        });
        assert!(report.insights.is_empty());
        assert!(report.actions.is_empty());
    }

    #[test]
    fn test_drop_off_priorities() {
        let current = rollup(10);
        let report = generate(InsightInputs {
            current: &current,
            recent: None,
            previous: None,
            drop_offs: &[drop_off(1, 14), drop_off(2, 15), drop_off(3, 30), drop_off(4, 31)],
        });

        // 14% is below the rule floor, 15-30% is medium, above 30% is high.
        assert_eq!(report.actions.len(), 3);
        assert_eq!(report.actions[0].priority, Priority::High);
        assert_eq!(report.actions[0].label, "Revise page 4");
        assert_eq!(report.actions[1].priority, Priority::Medium);
        assert_eq!(report.actions[2].priority, Priority::Medium);
        assert!(report.actions[0].reason.contains("31%"));
    }

    #[test]
    fn test_ordering_by_magnitude_within_tier() {
        let current = rollup(10);
        let report = generate(InsightInputs {
            current: &current,
            recent: None,
            previous: None,
            drop_offs: &[drop_off(2, 35), drop_off(7, 80), drop_off(4, 50)],
        });

        let labels: Vec<&str> = report.actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["Revise page 7", "Revise page 4", "Revise page 2"]);
    }

    #[test]
    fn test_hot_lead_action_and_buttons_are_plain_data() {
        let mut current = rollup(10);
        current.hot_leads = 3;
        let report = generate(InsightInputs {
            current: &current,
            recent: None,
            previous: None,
            drop_offs: &[],
        });

        assert_eq!(report.actions.len(), 1);
        let action = &report.actions[0];
        assert_eq!(action.priority, Priority::High);
        assert_eq!(action.label, "Follow up with 3 hot leads");
        assert_eq!(action.buttons.len(), 2);
        assert_eq!(action.buttons[0].label, "Email leads");
    }

    #[test]
    fn test_trend_insights_need_previous_window() {
        let mut current = rollup(10);
        current.return_rate = 40;
        current.hot_leads = 2;

        let silent = generate(InsightInputs {
            current: &current,
            recent: None,
            previous: None,
            drop_offs: &[],
        });
        assert!(silent
            .insights
            .iter()
            .all(|i| !i.label.contains("trending")));

        let mut previous = rollup(10);
        previous.return_rate = 20;
        previous.hot_leads = 1;
        let report = generate(InsightInputs {
            current: &current,
            recent: Some(&current),
            previous: Some(&previous),
            drop_offs: &[],
        });

        let labels: Vec<&str> = report.insights.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"Hot leads trending up"));
        assert!(labels.contains(&"Return visits trending up"));
    }

    #[test]
    fn test_low_completion_insight() {
        let mut current = rollup(10);
        current.completion_rate = 12;
        let report = generate(InsightInputs {
            current: &current,
            recent: None,
            previous: None,
            drop_offs: &[],
        });
        assert!(report
            .insights
            .iter()
            .any(|i| i.label == "Most viewers never finish"));

        // Too few views: rule stays quiet.
        let mut sparse = rollup(2);
        sparse.completion_rate = 12;
        let report = generate(InsightInputs {
            current: &sparse,
            recent: None,
            previous: None,
            drop_offs: &[],
        });
        assert!(report.insights.is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let mut current = rollup(10);
        current.hot_leads = 2;
        current.avg_engagement = 75;
        let previous = rollup(10);
        let inputs = InsightInputs {
            current: &current,
            recent: Some(&current),
            previous: Some(&previous),
            drop_offs: &[drop_off(1, 40), drop_off(2, 20)],
        };

        let first = generate(inputs);
        let second = generate(inputs);
        assert_eq!(first, second);
        assert!(!first.actions.is_empty());
        assert!(!first.insights.is_empty());
    }
}
