//! Scoring scales: what a judge may answer for a guideline and how those
//! answers aggregate across a run.
//!
//! The scale is a closed enum. Adding a scale means adding a variant and
//! letting the compiler point at every `match` that needs a new arm.

use crate::errors::ScaleError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringScale {
    Boolean,
    Percentage,
    Numeric { min_value: i64, max_value: i64 },
    CustomCategory { categories: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    Categorical,
    Numeric,
}

/// A single valid judge answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Bool(bool),
    Int(i64),
    Category(String),
}

impl Score {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Score::Int(v) => Some(*v as f64),
            Score::Bool(_) | Score::Category(_) => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Bool(b) => write!(f, "{}", b),
            Score::Int(v) => write!(f, "{}", v),
            Score::Category(c) => f.write_str(c),
        }
    }
}

/// Machine-checkable shape of a judge answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerContract {
    Boolean,
    IntegerRange { min: i64, max: i64 },
    OneOf(Vec<String>),
}

impl AnswerContract {
    /// JSON schema of the judge's structured output: `{"answer": <value>}`.
    pub fn json_schema(&self) -> Value {
        let answer = match self {
            AnswerContract::Boolean => serde_json::json!({ "type": "boolean" }),
            AnswerContract::IntegerRange { min, max } => serde_json::json!({
                "type": "integer",
                "minimum": min,
                "maximum": max
            }),
            AnswerContract::OneOf(values) => serde_json::json!({
                "type": "string",
                "enum": values
            }),
        };
        serde_json::json!({
            "type": "object",
            "properties": { "answer": answer },
            "required": ["answer"],
            "additionalProperties": false
        })
    }

    /// Check a raw answer value and convert it into a [`Score`].
    ///
    /// Judges are sloppy about JSON types, so `"true"`, `"7"` and `7.0` are
    /// accepted where they are unambiguous. Anything else is a violation.
    pub fn check(&self, value: &Value) -> Result<Score, String> {
        match self {
            AnswerContract::Boolean => match value {
                Value::Bool(b) => Ok(Score::Bool(*b)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Score::Bool(true)),
                    "false" => Ok(Score::Bool(false)),
                    _ => Err(format!("expected true or false, got {:?}", s)),
                },
                other => Err(format!("expected a boolean, got {}", other)),
            },
            AnswerContract::IntegerRange { min, max } => {
                let v = integer_of(value)
                    .ok_or_else(|| format!("expected an integer, got {}", value))?;
                if v < *min || v > *max {
                    return Err(format!("{} is outside the range [{}, {}]", v, min, max));
                }
                Ok(Score::Int(v))
            }
            AnswerContract::OneOf(values) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("expected a string category, got {}", value))?
                    .trim();
                if values.iter().any(|c| c == s) {
                    Ok(Score::Category(s.to_string()))
                } else {
                    Err(format!(
                        "{:?} is not one of the allowed categories [{}]",
                        s,
                        values.join(", ")
                    ))
                }
            }
        }
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

impl ScoringScale {
    pub fn name(&self) -> &'static str {
        match self {
            ScoringScale::Boolean => "boolean",
            ScoringScale::Percentage => "percentage",
            ScoringScale::Numeric { .. } => "numeric",
            ScoringScale::CustomCategory { .. } => "custom_category",
        }
    }

    /// Reject configurations that can never produce a valid answer.
    pub fn validate(&self) -> Result<(), ScaleError> {
        match self {
            ScoringScale::Numeric {
                min_value,
                max_value,
            } if min_value > max_value => Err(ScaleError::InvertedRange {
                min_value: *min_value,
                max_value: *max_value,
            }),
            ScoringScale::CustomCategory { categories } => {
                if categories.is_empty() {
                    return Err(ScaleError::NoCategories);
                }
                for (i, c) in categories.iter().enumerate() {
                    if categories[..i].contains(c) {
                        return Err(ScaleError::DuplicateCategory(c.clone()));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> ScaleKind {
        match self {
            ScoringScale::Boolean | ScoringScale::CustomCategory { .. } => ScaleKind::Categorical,
            ScoringScale::Percentage | ScoringScale::Numeric { .. } => ScaleKind::Numeric,
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self.kind(), ScaleKind::Numeric)
    }

    pub fn answer_contract(&self) -> AnswerContract {
        match self {
            ScoringScale::Boolean => AnswerContract::Boolean,
            ScoringScale::Percentage => AnswerContract::IntegerRange { min: 0, max: 100 },
            ScoringScale::Numeric {
                min_value,
                max_value,
            } => AnswerContract::IntegerRange {
                min: *min_value,
                max: *max_value,
            },
            ScoringScale::CustomCategory { categories } => {
                AnswerContract::OneOf(categories.clone())
            }
        }
    }

    /// Instruction appended to the judge prompt describing valid answers.
    pub fn prompt_suffix(&self) -> String {
        match self {
            ScoringScale::Boolean => "Answer with true or false.".to_string(),
            ScoringScale::Percentage => {
                "Answer with an integer percentage between 0 and 100.".to_string()
            }
            ScoringScale::Numeric {
                min_value,
                max_value,
            } => format!(
                "Answer with an integer between {} and {} (inclusive).",
                min_value, max_value
            ),
            ScoringScale::CustomCategory { categories } => {
                let quoted: Vec<String> = categories.iter().map(|c| format!("\"{}\"", c)).collect();
                format!("Answer with exactly one of: {}.", quoted.join(", "))
            }
        }
    }

    /// Aggregate the valid scores of one guideline. Pure: same input, same output.
    pub fn aggregate(&self, scores: &[Score]) -> Aggregate {
        match self.kind() {
            ScaleKind::Categorical => {
                let histogram = Histogram::from_scores(scores);
                let mode = histogram.mode().map(str::to_string);
                Aggregate::Categorical { histogram, mode }
            }
            ScaleKind::Numeric => {
                let values: Vec<f64> = scores.iter().filter_map(Score::as_f64).collect();
                let (mean, std) = mean_std(&values);
                Aggregate::Numeric { mean, std }
            }
        }
    }
}

/// Arithmetic mean and sample standard deviation.
///
/// Mean is 0.0 for no values; std is 0.0 for fewer than two values.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, variance.sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aggregate {
    Categorical {
        histogram: Histogram,
        mode: Option<String>,
    },
    Numeric {
        mean: f64,
        std: f64,
    },
}

/// Value counts in first-seen order.
///
/// Order matters: the mode tie-break is "first value encountered", so this
/// is a list rather than a hash map. It serializes as a JSON object whose
/// keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    entries: Vec<(String, u64)>,
}

impl Histogram {
    pub fn from_scores(scores: &[Score]) -> Self {
        let mut h = Histogram::default();
        for s in scores {
            h.add(s.to_string());
        }
        h
    }

    pub fn add(&mut self, key: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((key, 1)),
        }
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, c)| *c)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), *c))
    }

    /// Most frequent value; ties go to the value seen first.
    pub fn mode(&self) -> Option<&str> {
        let mut best: Option<(&str, u64)> = None;
        for (k, c) in self.iter() {
            match best {
                Some((_, best_count)) if c <= best_count => {}
                _ => best = Some((k, c)),
            }
        }
        best.map(|(k, _)| k)
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, c) in &self.entries {
            map.serialize_entry(k, c)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Histogram {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HistogramVisitor;

        impl<'de> Visitor<'de> for HistogramVisitor {
            type Value = Histogram;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of value -> count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Histogram, A::Error> {
                let mut entries = Vec::new();
                while let Some((k, c)) = access.next_entry::<String, u64>()? {
                    entries.push((k, c));
                }
                Ok(Histogram { entries })
            }
        }

        deserializer.deserialize_map(HistogramVisitor)
    }
}
