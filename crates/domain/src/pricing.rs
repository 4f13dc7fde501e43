//! Token pricing and the derived value metric.

use crate::trace::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-token rates for one provider model slug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub slug: String,
    /// Cost per input token
    pub prompt_rate: f64,
    /// Cost per output token
    pub completion_rate: f64,
    /// Explicitly marked free by the catalog
    #[serde(default)]
    pub free: bool,
}

impl PricingEntry {
    pub fn new(slug: impl Into<String>, prompt_rate: f64, completion_rate: f64) -> Self {
        Self {
            slug: slug.into(),
            prompt_rate,
            completion_rate,
            free: false,
        }
    }

    pub fn free(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            prompt_rate: 0.0,
            completion_rate: 0.0,
            free: true,
        }
    }

    /// Genuinely free: flagged as such, or both rates are zero
    pub fn is_free(&self) -> bool {
        self.free || (self.prompt_rate == 0.0 && self.completion_rate == 0.0)
    }

    pub fn cost(&self, usage: &TokenUsage) -> UsageCost {
        let input_cost = usage.input_tokens as f64 * self.prompt_rate;
        let output_cost = usage.output_tokens as f64 * self.completion_rate;
        UsageCost {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
            unpriced: false,
            free: self.is_free(),
        }
    }
}

/// Pricing catalog keyed by slug
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    entries: HashMap<String, PricingEntry>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: PricingEntry) {
        self.entries.insert(entry.slug.clone(), entry);
    }

    pub fn lookup(&self, slug: &str) -> Option<&PricingEntry> {
        self.entries.get(slug)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cost of `usage` for `slug`. A lookup miss yields an unpriced cost,
    /// never a silent zero.
    pub fn cost_for(&self, slug: &str, usage: &TokenUsage) -> UsageCost {
        match self.lookup(slug) {
            Some(entry) => entry.cost(usage),
            None => UsageCost::unpriced(),
        }
    }
}

impl FromIterator<PricingEntry> for PricingTable {
    fn from_iter<I: IntoIterator<Item = PricingEntry>>(iter: I) -> Self {
        let mut table = Self::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

/// Monetary cost of some token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    /// No catalog entry; the cost fields are zero but meaningless
    pub unpriced: bool,
    /// Priced, at zero
    #[serde(default)]
    pub free: bool,
}

impl UsageCost {
    pub fn unpriced() -> Self {
        Self {
            unpriced: true,
            ..Self::default()
        }
    }

    /// Combine costs; unpriced is sticky and free only survives if both are free
    pub fn combine(self, other: Self) -> Self {
        Self {
            input_cost: self.input_cost + other.input_cost,
            output_cost: self.output_cost + other.output_cost,
            total_cost: self.total_cost + other.total_cost,
            unpriced: self.unpriced || other.unpriced,
            free: self.free && other.free,
        }
    }
}

/// Score per unit of cost
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ValueMetric {
    Finite(f64),
    /// Genuinely free model with a score
    Unbounded,
    /// Pricing missing, or nothing to divide
    Unknown,
}

impl ValueMetric {
    pub fn compute(overall_score: Option<f64>, cost: &UsageCost) -> Self {
        let Some(score) = overall_score else {
            return Self::Unknown;
        };
        if cost.unpriced {
            return Self::Unknown;
        }
        if cost.total_cost > 0.0 {
            return Self::Finite(score / cost.total_cost);
        }
        if cost.free {
            Self::Unbounded
        } else {
            // priced at a non-zero rate but no tokens recorded
            Self::Unknown
        }
    }

    pub fn as_finite(&self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finite(v) => write!(f, "{:.2}", v),
            Self::Unbounded => f.write_str("unbounded"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}
