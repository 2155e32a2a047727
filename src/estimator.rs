use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{Horizon, Metric, MetricSet, Projection, ResultBundle, SchoolProfile};

impl Horizon {
    /// Points added to a current score over this horizon.
    pub fn increment(self, metric: Metric) -> i32 {
        match (self, metric) {
            (Horizon::SixMonths, Metric::Belonging) => 15,
            (Horizon::SixMonths, Metric::Voice) => 18,
            (Horizon::SixMonths, Metric::Safety) => 12,
            (Horizon::SixMonths, Metric::Engagement) => 14,
            (Horizon::TwelveMonths, Metric::Belonging) => 28,
            (Horizon::TwelveMonths, Metric::Voice) => 32,
            (Horizon::TwelveMonths, Metric::Safety) => 25,
            (Horizon::TwelveMonths, Metric::Engagement) => 26,
            (Horizon::EighteenMonths, Metric::Belonging) => 40,
            (Horizon::EighteenMonths, Metric::Voice) => 45,
            (Horizon::EighteenMonths, Metric::Safety) => 38,
            (Horizon::EighteenMonths, Metric::Engagement) => 37,
        }
    }

    /// Ceiling applied to every projected score at this horizon.
    pub fn cap(self) -> i32 {
        match self {
            Horizon::SixMonths => 95,
            Horizon::TwelveMonths => 98,
            Horizon::EighteenMonths => 99,
        }
    }
}

/// `min(current + increment, cap)`. The current value is not clamped first,
/// so out-of-range input passes through the arithmetic unchanged.
pub fn project_metric(current: i32, horizon: Horizon, metric: Metric) -> i32 {
    current
        .saturating_add(horizon.increment(metric))
        .min(horizon.cap())
}

pub fn project(current: &MetricSet, horizon: Horizon) -> Projection {
    MetricSet::from_fn(|metric| project_metric(current.get(metric), horizon, metric))
}

/// Per-metric `projected - current`; negative when the current score already
/// sits above the horizon cap.
pub fn improvement(current: &MetricSet, projected: &Projection) -> MetricSet {
    MetricSet::from_fn(|metric| projected.get(metric).saturating_sub(current.get(metric)))
}

/// Builds the full result bundle for a submission. Total over any input and
/// free of side effects; the caller supplies the timestamp.
pub fn estimate(
    current: &MetricSet,
    school_name: &str,
    student_count: &str,
    computed_at: DateTime<Utc>,
) -> ResultBundle {
    let mut predicted = BTreeMap::new();
    let mut improvements = BTreeMap::new();

    for horizon in Horizon::ALL {
        let projection = project(current, horizon);
        improvements.insert(horizon, improvement(current, &projection));
        predicted.insert(horizon, projection);
    }

    ResultBundle {
        profile: SchoolProfile::with_defaults(school_name, student_count),
        current: *current,
        predicted,
        improvements,
        computed_at,
    }
}
