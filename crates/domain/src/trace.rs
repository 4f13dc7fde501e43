//! Per-call token accounting records.

use crate::identifiers::{ModelId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Token counts of one provider call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// Why a call was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    Generation,
    Judge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure,
}

/// One attempt against the provider, as recorded by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub model_id: ModelId,
    /// Provider-side model name, the join key for pricing
    pub slug: String,
    pub purpose: CallPurpose,
    pub attempt: u32,
    pub outcome: CallOutcome,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total_is_sum() {
        let usage = TokenUsage::new(1000, 500);
        assert_eq!(usage.total_tokens, 1500);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage::new(10, 5);
        total += TokenUsage::new(1, 2);
        assert_eq!(total, TokenUsage::new(11, 7));
    }

    #[test]
    fn test_trace_record_flattens_usage() {
        let record = TraceRecord {
            run_id: None,
            model_id: ModelId::new("m"),
            slug: "vendor/m".into(),
            purpose: CallPurpose::Generation,
            attempt: 1,
            outcome: CallOutcome::Success,
            usage: TokenUsage::new(3, 4),
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["input_tokens"], 3);
        assert_eq!(json["total_tokens"], 7);
        assert!(json.get("run_id").is_none());
    }
}
