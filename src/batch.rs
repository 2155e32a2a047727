use std::io::{Read, Write};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::estimator;
use crate::models::{parse_score, Horizon, MetricSet};

#[derive(Debug, Deserialize)]
struct ScenarioRow {
    #[serde(default)]
    school_name: String,
    #[serde(default)]
    student_count: String,
    #[serde(default)]
    belonging: String,
    #[serde(default)]
    voice: String,
    #[serde(default)]
    safety: String,
    #[serde(default)]
    engagement: String,
}

#[derive(Debug, Serialize)]
struct ProjectionRow<'a> {
    school_name: &'a str,
    student_count: &'a str,
    horizon_months: u8,
    belonging: i32,
    voice: i32,
    safety: i32,
    engagement: i32,
    belonging_change: i32,
    voice_change: i32,
    safety_change: i32,
    engagement_change: i32,
}

/// Projects every scenario row and writes one output row per horizon.
/// Returns the number of scenarios read.
pub fn project_csv<R: Read, W: Write>(input: R, output: W) -> anyhow::Result<usize> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut writer = csv::Writer::from_writer(output);
    let computed_at = Utc::now();
    let mut scenarios = 0usize;

    for (index, result) in reader.deserialize::<ScenarioRow>().enumerate() {
        let row = result.with_context(|| format!("invalid scenario on row {}", index + 1))?;
        let current = MetricSet::new(
            parse_score(&row.belonging),
            parse_score(&row.voice),
            parse_score(&row.safety),
            parse_score(&row.engagement),
        );
        let bundle = estimator::estimate(&current, &row.school_name, &row.student_count, computed_at);

        for horizon in Horizon::ALL {
            let predicted = bundle.predicted_at(horizon);
            let change = bundle.improvement_at(horizon);
            writer.serialize(ProjectionRow {
                school_name: &bundle.profile.name,
                student_count: &bundle.profile.student_count,
                horizon_months: horizon.months(),
                belonging: predicted.belonging,
                voice: predicted.voice,
                safety: predicted.safety,
                engagement: predicted.engagement,
                belonging_change: change.belonging,
                voice_change: change.voice,
                safety_change: change.safety,
                engagement_change: change.engagement,
            })?;
        }
        scenarios += 1;
    }

    writer.flush()?;
    tracing::info!(scenarios, "projected scenario batch");
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_each_scenario_per_horizon() {
        let input = "school_name,student_count,belonging,voice,safety,engagement\n\
                     Avery Middle,620,45,38,52,61\n\
                     ,,90,90,90,90\n";
        let mut output = Vec::new();

        let count = project_csv(input.as_bytes(), &mut output).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("school_name,student_count,horizon_months"));
        assert_eq!(lines[1], "Avery Middle,620,6,60,56,64,75,15,18,12,14");
        assert_eq!(lines[6], "Your School,500+,18,99,99,99,99,9,9,9,9");
    }

    #[test]
    fn unparseable_scores_count_as_zero() {
        let input = "school_name,student_count,belonging,voice,safety,engagement\n\
                     Ridge,300,n/a,12abc,,7.9\n";
        let mut output = Vec::new();
        project_csv(input.as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let six_month = text.lines().nth(1).unwrap();
        assert_eq!(six_month, "Ridge,300,6,15,18,12,21,15,18,12,14");
    }
}
