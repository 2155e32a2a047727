use std::fmt::Write;

use crate::models::{Horizon, Metric, ResultBundle, SCHOOL_NAME_MAX_CHARS};
use crate::theme::Palette;

const NEXT_STEPS: [&str; 4] = [
    "Schedule a 30-min call to discuss your specific context",
    "Explore implementation roadmap tailored to your school",
    "See case studies from similar schools (similar size/challenges)",
    "Get custom pricing for 6, 12, or 18-month partnership",
];

const KEY_INSIGHTS: [(&str, &str, &str); 3] = [
    (
        "Biggest Opportunity",
        "Voice & Agency",
        "Students want to be heard (+45% potential)",
    ),
    (
        "Fastest Win",
        "6 Months",
        "+15% improvement in belonging in first 6 months",
    ),
    (
        "Full Impact",
        "18 Months",
        "+40 points belonging = measurable academic gains",
    ),
];

/// Caption and description shown under each horizon's card.
pub fn milestone(horizon: Horizon) -> (&'static str, &'static str) {
    match horizon {
        Horizon::SixMonths => (
            "Quick wins visible",
            "Early interventions show immediate impact on belonging and engagement.",
        ),
        Horizon::TwelveMonths => (
            "Sustainable transformation",
            "Systemic changes take root. Metrics stabilize at higher levels.",
        ),
        Horizon::EighteenMonths => (
            "Full cultural shift",
            "New culture becomes normal. Sustaining systems in place.",
        ),
    }
}

/// Relative change as a percentage of the current score. Undefined for a
/// current score of zero or below.
pub fn percent_change(current: i32, predicted: i32) -> Option<f64> {
    if current <= 0 {
        return None;
    }
    Some((predicted as f64 - current as f64) / current as f64 * 100.0)
}

pub fn format_percent(current: i32, predicted: i32) -> String {
    match percent_change(current, predicted) {
        Some(pct) => format!("{pct:+.1}%"),
        None => "n/a".to_string(),
    }
}

pub fn display_name(name: &str) -> String {
    name.chars().take(SCHOOL_NAME_MAX_CHARS).collect()
}

pub fn build_report(bundle: &ResultBundle) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# {}'s Transformation Roadmap",
        display_name(&bundle.profile.name)
    );
    let _ = writeln!(
        output,
        "{} students • Evidence-based predictions",
        bundle.profile.student_count
    );
    let _ = writeln!(
        output,
        "Computed {}",
        bundle.computed_at.format("%Y-%m-%d %H:%M UTC")
    );

    for horizon in Horizon::ALL {
        let predicted = bundle.predicted_at(horizon);
        let improvement = bundle.improvement_at(horizon);
        let (caption, description) = milestone(horizon);

        let _ = writeln!(output);
        let _ = writeln!(output, "## {} Projection", horizon);
        let _ = writeln!(output, "| Metric | Now | Predicted | Change | Change % |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for metric in Metric::ALL {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:+} | {} |",
                metric.label(),
                bundle.current.get(metric),
                predicted.get(metric),
                improvement.get(metric),
                format_percent(bundle.current.get(metric), predicted.get(metric))
            );
        }
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "**{} by month {}.** {}",
            caption,
            horizon.months(),
            description
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Key Insights for {}",
        display_name(&bundle.profile.name)
    );
    for (title, value, desc) in KEY_INSIGHTS {
        let _ = writeln!(output, "- **{title}: {value}** {desc}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next Steps");
    for step in NEXT_STEPS {
        let _ = writeln!(output, "- {step}");
    }

    output
}

/// Compact terminal rendering, colored with the active theme's palette.
pub fn render_summary(bundle: &ResultBundle, palette: &Palette) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{}'s Transformation Roadmap",
        display_name(&bundle.profile.name)
    );
    let _ = writeln!(
        output,
        "{}",
        paint(
            &format!(
                "{} students • Evidence-based predictions",
                bundle.profile.student_count
            ),
            palette.body_text
        )
    );

    for horizon in Horizon::ALL {
        let predicted = bundle.predicted_at(horizon);
        let improvement = bundle.improvement_at(horizon);
        let (caption, _) = milestone(horizon);

        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "{} ({})",
            horizon,
            paint(caption, palette.muted_text)
        );
        for metric in Metric::ALL {
            let _ = writeln!(
                output,
                "  {:<16} {:>3} -> {:>3}  {}",
                metric.label(),
                bundle.current.get(metric),
                predicted.get(metric),
                paint(
                    &format!(
                        "{:+} ({})",
                        improvement.get(metric),
                        format_percent(bundle.current.get(metric), predicted.get(metric))
                    ),
                    palette.muted_text
                )
            );
        }
    }

    output
}

/// One muted line referring back to an already printed summary.
pub fn results_pointer(bundle: &ResultBundle, palette: &Palette) -> String {
    paint(
        &format!(
            "^ {}'s Transformation Roadmap",
            display_name(&bundle.profile.name)
        ),
        palette.muted_text,
    )
}

fn paint(text: &str, hex: &str) -> String {
    match hex_to_rgb(hex) {
        Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m{text}\x1b[0m"),
        None => text.to_string(),
    }
}

fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator;
    use crate::models::MetricSet;
    use crate::theme::Theme;
    use chrono::{TimeZone, Utc};

    fn bundle(name: &str, current: MetricSet) -> ResultBundle {
        let computed_at = Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap();
        estimator::estimate(&current, name, "", computed_at)
    }

    #[test]
    fn report_lists_every_horizon_and_metric() {
        let report = build_report(&bundle("Lincoln High", MetricSet::new(45, 38, 52, 61)));

        assert!(report.starts_with("# Lincoln High's Transformation Roadmap"));
        assert!(report.contains("500+ students • Evidence-based predictions"));
        assert!(report.contains("## 6-Month Projection"));
        assert!(report.contains("## 12-Month Projection"));
        assert!(report.contains("## 18-Month Projection"));
        assert!(report.contains("| Voice & Agency | 38 | 56 | +18 | +47.4% |"));
        assert!(report.contains("| Engagement | 61 | 98 | +37 | +60.7% |"));
        assert!(report.contains("## Key Insights for Lincoln High"));
        assert!(report.contains("**Full cultural shift by month 18.**"));
        assert!(report.contains("## Next Steps"));
    }

    #[test]
    fn report_shows_negative_change_with_sign() {
        let report = build_report(&bundle("", MetricSet::new(100, 0, 0, 0)));
        assert!(report.contains("| Belonging | 100 | 95 | -5 | -5.0% |"));
        assert!(report.contains("| Voice & Agency | 0 | 18 | +18 | n/a |"));
        assert!(report.contains("## Key Insights for Your School"));
    }

    #[test]
    fn percent_change_is_relative_to_current() {
        assert_eq!(format_percent(45, 60), "+33.3%");
        assert_eq!(format_percent(38, 56), "+47.4%");
        assert_eq!(format_percent(100, 95), "-5.0%");
        assert_eq!(format_percent(90, 90), "+0.0%");
        assert_eq!(percent_change(0, 40), None);
        assert_eq!(format_percent(-10, 5), "n/a");
    }

    #[test]
    fn summary_carries_percent_badges() {
        let summary = render_summary(
            &bundle("Harbor", MetricSet::new(45, 38, 52, 61)),
            &Theme::Dark.palette(),
        );
        assert!(summary.contains("+15 (+33.3%)"));
    }

    #[test]
    fn long_names_are_truncated_for_display_only() {
        let long_name = "x".repeat(200);
        let result = bundle(&long_name, MetricSet::default());
        assert_eq!(result.profile.name.len(), 200);
        assert_eq!(display_name(&result.profile.name).len(), SCHOOL_NAME_MAX_CHARS);
    }

    #[test]
    fn summary_uses_palette_colors() {
        let result = bundle("Harbor", MetricSet::default());
        let dark = render_summary(&result, &Theme::Dark.palette());
        let light = render_summary(&result, &Theme::Light.palette());

        assert!(dark.contains("\x1b[38;2;203;213;225m"));
        assert!(light.contains("\x1b[38;2;71;85;105m"));
        assert!(dark.contains("Harbor's Transformation Roadmap"));
    }

    #[test]
    fn pointer_names_school_in_muted_color() {
        let pointer = results_pointer(
            &bundle("Harbor", MetricSet::default()),
            &Theme::Dark.palette(),
        );
        assert!(pointer.starts_with("\x1b[38;2;148;163;184m"));
        assert!(pointer.contains("^ Harbor's Transformation Roadmap"));
    }

    #[test]
    fn invalid_hex_is_left_unpainted() {
        assert_eq!(paint("plain", "teal"), "plain");
        assert_eq!(hex_to_rgb("#94a3b8"), Some((148, 163, 184)));
    }
}
