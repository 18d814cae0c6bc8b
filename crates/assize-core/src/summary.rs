//! Per-guideline run summary built from collected judge scores.

use crate::model::Guideline;
use crate::scale::{Aggregate, Score};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{type, <aggregate fields>, failed}` for one guideline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineSummary {
    #[serde(flatten)]
    pub aggregate: Aggregate,
    /// Samples without a valid score for this guideline.
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunSummary {
    pub guidelines: BTreeMap<String, GuidelineSummary>,
}

impl RunSummary {
    pub fn get(&self, name: &str) -> Option<&GuidelineSummary> {
        self.guidelines.get(name)
    }

    pub fn to_value(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Collects valid scores per guideline in the order they are recorded.
#[derive(Debug, Default)]
pub struct ScoreBook {
    scores: BTreeMap<String, Vec<Score>>,
}

impl ScoreBook {
    pub fn record(&mut self, guideline: &str, score: Score) {
        self.scores
            .entry(guideline.to_string())
            .or_default()
            .push(score);
    }

    pub fn valid_count(&self, guideline: &str) -> usize {
        self.scores.get(guideline).map_or(0, Vec::len)
    }

    /// Aggregate every guideline over `total_samples` samples.
    pub fn summarize(&self, guidelines: &[Guideline], total_samples: usize) -> anyhow::Result<RunSummary> {
        let mut out = BTreeMap::new();
        for g in guidelines {
            let scores = self.scores.get(&g.name).map(Vec::as_slice).unwrap_or(&[]);
            if scores.len() > total_samples {
                anyhow::bail!(
                    "guideline {} has {} scores for {} samples",
                    g.name,
                    scores.len(),
                    total_samples
                );
            }
            out.insert(
                g.name.clone(),
                GuidelineSummary {
                    aggregate: g.scale.aggregate(scores),
                    failed: (total_samples - scores.len()) as u64,
                },
            );
        }
        Ok(RunSummary { guidelines: out })
    }
}
