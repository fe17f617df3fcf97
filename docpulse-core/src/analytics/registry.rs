//! Metrics registry for discovery and documentation.

/// Type of metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValueType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl MetricValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricValueType::Integer => "integer",
            MetricValueType::Float => "float",
            MetricValueType::Boolean => "boolean",
            MetricValueType::Text => "text",
        }
    }
}

/// Descriptor for a derived metric.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub entity_type: &'static str,
    pub name: &'static str,
    pub value_type: MetricValueType,
    pub summary: &'static str,
}

const SESSION_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        entity_type: "session",
        name: "engagement_score",
        value_type: MetricValueType::Integer,
        summary: "Engagement score in [0, 100] from the session's raw counters.",
    },
    MetricDescriptor {
        entity_type: "session",
        name: "intent",
        value_type: MetricValueType::Text,
        summary: "Intent signal (hot/warm/cold) for the engagement score.",
    },
];

const LINK_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        entity_type: "link",
        name: "total_views",
        value_type: MetricValueType::Integer,
        summary: "Total sessions recorded for the link.",
    },
    MetricDescriptor {
        entity_type: "link",
        name: "unique_viewers",
        value_type: MetricValueType::Integer,
        summary: "Distinct viewer grouping keys across the link's sessions.",
    },
    MetricDescriptor {
        entity_type: "link",
        name: "hot_leads",
        value_type: MetricValueType::Integer,
        summary: "Viewers whose aggregated score reaches the hot threshold.",
    },
    MetricDescriptor {
        entity_type: "link",
        name: "avg_engagement",
        value_type: MetricValueType::Integer,
        summary: "Mean per-session engagement score, rounded.",
    },
    MetricDescriptor {
        entity_type: "link",
        name: "completion_rate",
        value_type: MetricValueType::Integer,
        summary: "Mean completion percentage across sessions, rounded.",
    },
    MetricDescriptor {
        entity_type: "link",
        name: "return_rate",
        value_type: MetricValueType::Integer,
        summary: "Percentage of sessions that were return visits, rounded.",
    },
    MetricDescriptor {
        entity_type: "link",
        name: "performance_score",
        value_type: MetricValueType::Integer,
        summary: "Blended 0-100 content performance score.",
    },
];

const VIEWER_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        entity_type: "viewer",
        name: "aggregated_score",
        value_type: MetricValueType::Integer,
        summary: "Best session score plus the repeat-visit frequency bonus.",
    },
    MetricDescriptor {
        entity_type: "viewer",
        name: "hot_lead",
        value_type: MetricValueType::Boolean,
        summary: "Whether the aggregated score reaches the hot threshold.",
    },
];

/// List all registered metrics.
pub fn list_metrics() -> Vec<MetricDescriptor> {
    SESSION_METRICS
        .iter()
        .chain(LINK_METRICS)
        .chain(VIEWER_METRICS)
        .cloned()
        .collect()
}

/// List metrics for a given entity type.
pub fn list_metrics_for_entity(entity_type: &str) -> Vec<MetricDescriptor> {
    list_metrics()
        .into_iter()
        .filter(|m| m.entity_type == entity_type)
        .collect()
}
