//! Merged index, aggregate report and usage report documents.

use crate::identifiers::{EvaluationId, ModelId};
use crate::pricing::{UsageCost, ValueMetric};
use crate::suite::Suite;
use crate::trace::TokenUsage;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// All suites of one evaluation, ordered by model display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationGroup {
    pub evaluation_id: EvaluationId,
    pub evaluation_name: String,
    pub suites: Vec<Suite>,
}

/// Deduplicated consolidation of suite files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedIndex {
    pub generated_at: DateTime<Utc>,
    /// Ordered by evaluation name
    pub evaluations: Vec<EvaluationGroup>,
    /// Unweighted mean of every retained suite score
    pub overall_score: Option<f64>,
}

impl MergedIndex {
    pub fn suites(&self) -> impl Iterator<Item = &Suite> {
        self.evaluations.iter().flat_map(|group| group.suites.iter())
    }

    pub fn suite_count(&self) -> usize {
        self.evaluations.iter().map(|group| group.suites.len()).sum()
    }

    pub fn into_suites(self) -> impl Iterator<Item = Suite> {
        self.evaluations.into_iter().flat_map(|group| group.suites)
    }
}

/// Anything the merge engine accepts as input.
///
/// Suite files and merged index files share the `kind` discriminator so a
/// merged index can be merged again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultDocument {
    Suite(Suite),
    MergedIndex(MergedIndex),
}

impl ResultDocument {
    pub fn into_suites(self) -> Vec<Suite> {
        match self {
            Self::Suite(suite) => vec![suite],
            Self::MergedIndex(index) => index.into_suites().collect(),
        }
    }
}

/// Token usage and cost of one model's generation calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    #[serde(flatten)]
    pub tokens: TokenUsage,
    #[serde(flatten)]
    pub cost: UsageCost,
}

/// Per-model leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAggregate {
    /// 1-based position after ranking
    pub rank: usize,
    pub model_id: ModelId,
    pub display_name: String,
    /// Mean over variants, keyed by evaluation id
    pub evaluation_scores: IndexMap<EvaluationId, f64>,
    pub category_scores: IndexMap<String, f64>,
    /// Mean of evaluation scores, descriptive-only evaluations excluded
    pub overall_score: Option<f64>,
    pub usage: ModelUsage,
    pub value: ValueMetric,
}

/// Terminal output of aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub generated_at: DateTime<Utc>,
    /// Ranked, best first
    pub models: Vec<ModelAggregate>,
    #[serde(default)]
    pub descriptive_only: Vec<EvaluationId>,
    /// Rule applied when two models share an overall score
    pub tie_break: String,
}

impl AggregateReport {
    pub fn model(&self, id: &ModelId) -> Option<&ModelAggregate> {
        self.models.iter().find(|m| &m.model_id == id)
    }
}

/// Usage and cost for one provider slug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub slug: String,
    pub calls: u64,
    pub failed_calls: u64,
    #[serde(flatten)]
    pub tokens: TokenUsage,
    #[serde(flatten)]
    pub cost: UsageCost,
}

/// Per-slug token totals and computed cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub generated_at: DateTime<Utc>,
    /// Ordered by slug
    pub entries: Vec<UsageEntry>,
    /// Sum over priced entries only
    pub total_cost: f64,
    pub unpriced_slugs: Vec<String>,
}
