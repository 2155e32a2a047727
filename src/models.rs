use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_SCHOOL_NAME: &str = "Your School";
pub const DEFAULT_STUDENT_COUNT: &str = "500+";

/// Display-only limit on the school name field; the model never truncates.
pub const SCHOOL_NAME_MAX_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Belonging,
    Voice,
    Safety,
    Engagement,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Belonging,
        Metric::Voice,
        Metric::Safety,
        Metric::Engagement,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::Belonging => "belonging",
            Metric::Voice => "voice",
            Metric::Safety => "safety",
            Metric::Engagement => "engagement",
        }
    }

    /// Label used on the results cards.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Belonging => "Belonging",
            Metric::Voice => "Voice & Agency",
            Metric::Safety => "Safety",
            Metric::Engagement => "Engagement",
        }
    }

    /// Label and helper text used on the input form.
    pub fn form_label(self) -> (&'static str, &'static str) {
        match self {
            Metric::Belonging => ("Student Belonging Score", "Feel accepted and valued"),
            Metric::Voice => ("Voice & Agency Score", "Feel heard in decisions"),
            Metric::Safety => ("Classroom Safety Score", "Safe to be authentic"),
            Metric::Engagement => ("Learning Engagement Score", "Intrinsic drive to learn"),
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.key().eq_ignore_ascii_case(key.trim()))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub belonging: i32,
    pub voice: i32,
    pub safety: i32,
    pub engagement: i32,
}

impl MetricSet {
    pub fn new(belonging: i32, voice: i32, safety: i32, engagement: i32) -> Self {
        Self {
            belonging,
            voice,
            safety,
            engagement,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Metric) -> i32) -> Self {
        Self {
            belonging: f(Metric::Belonging),
            voice: f(Metric::Voice),
            safety: f(Metric::Safety),
            engagement: f(Metric::Engagement),
        }
    }

    pub fn get(&self, metric: Metric) -> i32 {
        match metric {
            Metric::Belonging => self.belonging,
            Metric::Voice => self.voice,
            Metric::Safety => self.safety,
            Metric::Engagement => self.engagement,
        }
    }

    pub fn set(&mut self, metric: Metric, value: i32) {
        match metric {
            Metric::Belonging => self.belonging = value,
            Metric::Voice => self.voice = value,
            Metric::Safety => self.safety = value,
            Metric::Engagement => self.engagement = value,
        }
    }
}

/// Projected scores for one horizon, shaped like the input metrics.
pub type Projection = MetricSet;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HorizonError {
    #[error("unsupported horizon of {0} months (expected 6, 12 or 18)")]
    Unsupported(u64),
    #[error("horizon must be a month count, got {0:?}")]
    NotANumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Horizon {
    SixMonths,
    TwelveMonths,
    EighteenMonths,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [
        Horizon::SixMonths,
        Horizon::TwelveMonths,
        Horizon::EighteenMonths,
    ];

    pub fn months(self) -> u8 {
        match self {
            Horizon::SixMonths => 6,
            Horizon::TwelveMonths => 12,
            Horizon::EighteenMonths => 18,
        }
    }

    pub fn from_months(months: u64) -> Result<Self, HorizonError> {
        match months {
            6 => Ok(Horizon::SixMonths),
            12 => Ok(Horizon::TwelveMonths),
            18 => Ok(Horizon::EighteenMonths),
            other => Err(HorizonError::Unsupported(other)),
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Month", self.months())
    }
}

impl Serialize for Horizon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.months())
    }
}

// JSON object keys arrive as strings, bare values as numbers; accept both.
impl<'de> Deserialize<'de> for Horizon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HorizonVisitor;

        impl<'de> Visitor<'de> for HorizonVisitor {
            type Value = Horizon;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a horizon of 6, 12 or 18 months")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Horizon, E> {
                Horizon::from_months(value).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Horizon, E> {
                let months = u64::try_from(value)
                    .map_err(|_| E::custom(HorizonError::NotANumber(value.to_string())))?;
                self.visit_u64(months)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Horizon, E> {
                let months = value
                    .parse::<u64>()
                    .map_err(|_| E::custom(HorizonError::NotANumber(value.to_string())))?;
                self.visit_u64(months)
            }
        }

        deserializer.deserialize_any(HorizonVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolProfile {
    #[serde(rename = "schoolName")]
    pub name: String,
    pub student_count: String,
}

impl SchoolProfile {
    /// Builds the labelled profile shown on results, substituting the
    /// placeholder label for each empty field.
    pub fn with_defaults(name: &str, student_count: &str) -> Self {
        Self {
            name: if name.is_empty() {
                DEFAULT_SCHOOL_NAME.to_string()
            } else {
                name.to_string()
            },
            student_count: if student_count.is_empty() {
                DEFAULT_STUDENT_COUNT.to_string()
            } else {
                student_count.to_string()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBundle {
    #[serde(flatten)]
    pub profile: SchoolProfile,
    pub current: MetricSet,
    pub predicted: BTreeMap<Horizon, Projection>,
    pub improvements: BTreeMap<Horizon, MetricSet>,
    #[serde(rename = "timestamp")]
    pub computed_at: DateTime<Utc>,
}

impl ResultBundle {
    pub fn predicted_at(&self, horizon: Horizon) -> Projection {
        self.predicted.get(&horizon).copied().unwrap_or_default()
    }

    pub fn improvement_at(&self, horizon: Horizon) -> MetricSet {
        self.improvements.get(&horizon).copied().unwrap_or_default()
    }
}

/// Draft state behind the input form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatorForm {
    pub school_name: String,
    pub student_count: String,
    pub metrics: MetricSet,
}

impl CalculatorForm {
    pub const DEFAULT_METRICS: MetricSet = MetricSet {
        belonging: 45,
        voice: 38,
        safety: 52,
        engagement: 61,
    };
}

impl Default for CalculatorForm {
    fn default() -> Self {
        Self {
            school_name: String::new(),
            student_count: String::new(),
            metrics: Self::DEFAULT_METRICS,
        }
    }
}

/// Parses a form value into a score, yielding 0 for anything that is not a
/// plain (optionally signed) integer or a finite decimal. Decimals truncate
/// toward zero.
pub fn parse_score(raw: &str) -> i32 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i32>() {
        return value;
    }
    let looks_decimal = !trimmed.is_empty()
        && trimmed
            .trim_start_matches(|c| c == '+' || c == '-')
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.');
    match trimmed.parse::<f64>() {
        Ok(value) if looks_decimal && value.is_finite() => {
            let truncated = value.trunc();
            if truncated >= i32::MIN as f64 && truncated <= i32::MAX as f64 {
                truncated as i32
            } else {
                0
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_score_accepts_plain_integers() {
        assert_eq!(parse_score("45"), 45);
        assert_eq!(parse_score("  7 "), 7);
        assert_eq!(parse_score("-12"), -12);
        assert_eq!(parse_score("+3"), 3);
        assert_eq!(parse_score("150"), 150);
    }

    #[test]
    fn parse_score_truncates_decimals() {
        assert_eq!(parse_score("12.9"), 12);
        assert_eq!(parse_score("-4.5"), -4);
        assert_eq!(parse_score(".5"), 0);
    }

    #[test]
    fn parse_score_defaults_to_zero() {
        assert_eq!(parse_score(""), 0);
        assert_eq!(parse_score("abc"), 0);
        assert_eq!(parse_score("42abc"), 0);
        assert_eq!(parse_score("1e3"), 0);
        assert_eq!(parse_score("NaN"), 0);
        assert_eq!(parse_score("inf"), 0);
        assert_eq!(parse_score("99999999999"), 0);
    }

    #[test]
    fn profile_defaults_replace_empty_fields_only() {
        let profile = SchoolProfile::with_defaults("", "");
        assert_eq!(profile.name, "Your School");
        assert_eq!(profile.student_count, "500+");

        let profile = SchoolProfile::with_defaults("Lincoln High", "1200");
        assert_eq!(profile.name, "Lincoln High");
        assert_eq!(profile.student_count, "1200");
    }

    #[test]
    fn horizon_keys_round_trip_through_json_objects() {
        let mut map = BTreeMap::new();
        map.insert(Horizon::TwelveMonths, 1);
        map.insert(Horizon::SixMonths, 2);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"6":2,"12":1}"#);

        let parsed: BTreeMap<Horizon, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn unknown_horizon_is_rejected() {
        assert_eq!(
            Horizon::from_months(9),
            Err(HorizonError::Unsupported(9))
        );
        assert!(serde_json::from_str::<Horizon>("24").is_err());
        assert_eq!(serde_json::from_str::<Horizon>("18").unwrap(), Horizon::EighteenMonths);
    }

    #[test]
    fn metric_lookup_by_key() {
        assert_eq!(Metric::from_key("Voice"), Some(Metric::Voice));
        assert_eq!(Metric::from_key(" safety "), Some(Metric::Safety));
        assert_eq!(Metric::from_key("grit"), None);

        let mut set = MetricSet::default();
        set.set(Metric::Engagement, 9);
        assert_eq!(set.get(Metric::Engagement), 9);
        assert_eq!(set, MetricSet::new(0, 0, 0, 9));
    }
}
