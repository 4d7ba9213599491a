//! Descriptive statistics over raw scores.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::score::Outcome;

/// Summary of the scores collected for one (group, guideline) cell.
///
/// `average` and `stddev` are NaN when `count == 0`. That is the
/// empty-sample sentinel, not an error; [`StatSummary::outcome`] turns it
/// into [`Outcome::NoSamples`]. In JSON the sentinel is written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    #[serde(with = "nan_as_null")]
    pub average: f64,
    /// Population standard deviation.
    #[serde(with = "nan_as_null")]
    pub stddev: f64,
    pub count: usize,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Tagged failure measurements seen for this cell, kept or not.
    #[serde(default)]
    pub failures: usize,
}

impl StatSummary {
    /// Summary of an empty sample.
    pub fn empty() -> Self {
        summarize(&[])
    }

    pub fn with_failures(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub fn outcome(&self) -> Outcome {
        if self.count == 0 {
            Outcome::NoSamples
        } else {
            Outcome::Score(self.average)
        }
    }
}

impl Default for StatSummary {
    fn default() -> Self {
        Self::empty()
    }
}

/// Mean, population standard deviation, min and max of `scores`.
pub fn summarize(scores: &[f64]) -> StatSummary {
    if scores.is_empty() {
        return StatSummary {
            average: f64::NAN,
            stddev: f64::NAN,
            count: 0,
            min: None,
            max: None,
            failures: 0,
        };
    }

    let count = scores.len();
    let n = count as f64;
    let average = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - average).powi(2)).sum::<f64>() / n;

    StatSummary {
        average,
        stddev: variance.sqrt(),
        count,
        min: scores.iter().copied().reduce(f64::min),
        max: scores.iter().copied().reduce(f64::max),
        failures: 0,
    }
}

mod nan_as_null {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
