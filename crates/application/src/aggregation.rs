//! Aggregation engine - rolls a merged index up into per-model leaderboard rows
//!
//! Test case scores are already folded into suites; this step averages
//! variants into evaluation scores, evaluations into categories and an overall
//! score, joins generation traces against the pricing table, and ranks.

use chrono::Utc;
use indexmap::IndexMap;
use llm_leaderboard_common::config::AggregationConfig;
use llm_leaderboard_domain::{
    score::mean, AggregateReport, CallOutcome, CallPurpose, EvaluationId, MergedIndex,
    ModelAggregate, ModelId, ModelUsage, PricingTable, TokenUsage, TraceRecord, UsageCost,
    UsageEntry, UsageReport, ValueMetric,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Human-readable statement of the ranking rule, stored in every report
pub const TIE_BREAK_RULE: &str =
    "overall score descending, then display name ascending, then model id ascending; \
     models without an overall score rank last";

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("merged index contains no suites")]
    EmptyIndex,

    #[error("evaluation '{evaluation}' is listed in categories '{first}' and '{second}'")]
    OverlappingCategories {
        evaluation: EvaluationId,
        first: String,
        second: String,
    },
}

/// Both documents produced by one aggregation
#[derive(Debug, Clone)]
pub struct AggregationOutput {
    pub report: AggregateReport,
    pub usage: UsageReport,
}

/// Aggregation engine
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    categories: BTreeMap<String, Vec<EvaluationId>>,
    descriptive_only: Vec<EvaluationId>,
}

#[derive(Default)]
struct ModelAccumulator {
    display_name: String,
    // variant scores per evaluation, in index order
    samples: IndexMap<EvaluationId, Vec<f64>>,
}

impl AggregationEngine {
    pub fn new(config: &AggregationConfig) -> Result<Self, AggregationError> {
        let mut owner: HashMap<&EvaluationId, &String> = HashMap::new();
        for (category, members) in &config.categories {
            for evaluation in members {
                if let Some(first) = owner.insert(evaluation, category) {
                    if first != category {
                        return Err(AggregationError::OverlappingCategories {
                            evaluation: evaluation.clone(),
                            first: first.clone(),
                            second: category.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self {
            categories: config.categories.clone(),
            descriptive_only: config.descriptive_only.clone(),
        })
    }

    /// Produce the ranked report and the usage report
    #[instrument(skip_all, fields(suites = index.suite_count(), traces = traces.len()))]
    pub fn aggregate(
        &self,
        index: &MergedIndex,
        traces: &[TraceRecord],
        pricing: &PricingTable,
    ) -> Result<AggregationOutput, AggregationError> {
        if index.suite_count() == 0 {
            return Err(AggregationError::EmptyIndex);
        }

        let usage = self.usage_report(traces, pricing);
        let generation_usage = generation_usage_by_model(traces);
        let descriptive: HashSet<&EvaluationId> = self.descriptive_only.iter().collect();

        let mut accumulators: IndexMap<ModelId, ModelAccumulator> = IndexMap::new();
        for suite in index.suites() {
            let acc = accumulators.entry(suite.model_id.clone()).or_default();
            if acc.display_name.is_empty() {
                acc.display_name = suite.model_name.clone();
            }
            acc.samples
                .entry(suite.evaluation_id.clone())
                .or_default()
                .push(suite.score);
        }

        let mut models: Vec<ModelAggregate> = accumulators
            .into_iter()
            .map(|(model_id, acc)| {
                let evaluation_scores: IndexMap<EvaluationId, f64> = acc
                    .samples
                    .into_iter()
                    .filter_map(|(evaluation, samples)| mean(&samples).map(|m| (evaluation, m)))
                    .collect();

                let category_scores = self.category_scores(&evaluation_scores);

                let counted: Vec<f64> = evaluation_scores
                    .iter()
                    .filter(|(evaluation, _)| !descriptive.contains(evaluation))
                    .map(|(_, score)| *score)
                    .collect();
                let overall_score = mean(&counted);

                let usage = model_usage(generation_usage.get(&model_id), pricing);
                let value = ValueMetric::compute(overall_score, &usage.cost);

                ModelAggregate {
                    rank: 0,
                    model_id,
                    display_name: acc.display_name,
                    evaluation_scores,
                    category_scores,
                    overall_score,
                    usage,
                    value,
                }
            })
            .collect();

        rank(&mut models);

        info!(
            models = models.len(),
            unpriced = usage.unpriced_slugs.len(),
            "Aggregation complete"
        );

        Ok(AggregationOutput {
            report: AggregateReport {
                generated_at: Utc::now(),
                models,
                descriptive_only: self.descriptive_only.clone(),
                tie_break: TIE_BREAK_RULE.to_string(),
            },
            usage,
        })
    }

    fn category_scores(&self, evaluation_scores: &IndexMap<EvaluationId, f64>) -> IndexMap<String, f64> {
        self.categories
            .iter()
            .filter_map(|(category, members)| {
                let scores: Vec<f64> = members
                    .iter()
                    .filter_map(|m| evaluation_scores.get(m).copied())
                    .collect();
                mean(&scores).map(|score| (category.clone(), score))
            })
            .collect()
    }

    /// Token totals and cost per slug over every trace (judge calls included)
    pub fn usage_report(&self, traces: &[TraceRecord], pricing: &PricingTable) -> UsageReport {
        let mut by_slug: BTreeMap<&str, (u64, u64, TokenUsage)> = BTreeMap::new();
        for trace in traces {
            let (calls, failed, tokens) = by_slug.entry(trace.slug.as_str()).or_default();
            *calls += 1;
            if trace.outcome == CallOutcome::Failure {
                *failed += 1;
            }
            *tokens += trace.usage;
        }

        let mut unpriced_slugs = Vec::new();
        let mut total_cost = 0.0;
        let entries: Vec<UsageEntry> = by_slug
            .into_iter()
            .map(|(slug, (calls, failed_calls, tokens))| {
                let cost = pricing.cost_for(slug, &tokens);
                if cost.unpriced {
                    warn!(slug, "No pricing entry; cost reported as unpriced");
                    unpriced_slugs.push(slug.to_string());
                } else {
                    total_cost += cost.total_cost;
                }
                UsageEntry {
                    slug: slug.to_string(),
                    calls,
                    failed_calls,
                    tokens,
                    cost,
                }
            })
            .collect();

        UsageReport {
            generated_at: Utc::now(),
            entries,
            total_cost,
            unpriced_slugs,
        }
    }
}

/// Generation-purpose tokens per model, split by slug
fn generation_usage_by_model(traces: &[TraceRecord]) -> HashMap<ModelId, BTreeMap<String, TokenUsage>> {
    let mut usage: HashMap<ModelId, BTreeMap<String, TokenUsage>> = HashMap::new();
    for trace in traces
        .iter()
        .filter(|t| t.purpose == CallPurpose::Generation)
    {
        *usage
            .entry(trace.model_id.clone())
            .or_default()
            .entry(trace.slug.clone())
            .or_default() += trace.usage;
    }
    usage
}

fn model_usage(by_slug: Option<&BTreeMap<String, TokenUsage>>, pricing: &PricingTable) -> ModelUsage {
    let Some(by_slug) = by_slug.filter(|m| !m.is_empty()) else {
        // no trace to price: value cannot be known
        return ModelUsage {
            tokens: TokenUsage::default(),
            cost: UsageCost::unpriced(),
        };
    };

    let mut tokens = TokenUsage::default();
    let mut cost: Option<UsageCost> = None;
    for (slug, usage) in by_slug {
        tokens += *usage;
        let slug_cost = pricing.cost_for(slug, usage);
        cost = Some(match cost {
            Some(total) => total.combine(slug_cost),
            None => slug_cost,
        });
    }

    ModelUsage {
        tokens,
        cost: cost.unwrap_or_else(UsageCost::unpriced),
    }
}

fn rank(models: &mut [ModelAggregate]) {
    models.sort_by(|a, b| {
        let by_score = match (a.overall_score, b.overall_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_score
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
    for (position, model) in models.iter_mut().enumerate() {
        model.rank = position + 1;
        debug!(rank = model.rank, model = %model.model_id, "Ranked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeEngine;
    use llm_leaderboard_domain::{ResultDocument, Suite};
    use llm_leaderboard_testing::{create_failed_trace, create_pricing_table, create_trace, SuiteBuilder};
    use std::path::PathBuf;

    fn index(suites: Vec<Suite>) -> MergedIndex {
        let documents = suites
            .into_iter()
            .map(|s| (PathBuf::from("x.json"), ResultDocument::Suite(s)))
            .collect();
        MergeEngine::new().merge_documents(documents).0
    }

    fn suite(evaluation: &str, model: &str, score: f64) -> Suite {
        SuiteBuilder::new(evaluation, model)
            .with_names(evaluation, format!("Model {}", model))
            .with_snapshot(score, 1)
            .build()
    }

    fn config() -> AggregationConfig {
        let mut categories = BTreeMap::new();
        categories.insert(
            "knowledge".to_string(),
            vec![EvaluationId::new("facts"), EvaluationId::new("math")],
        );
        AggregationConfig {
            categories,
            descriptive_only: vec![EvaluationId::new("spectrum")],
        }
    }

    #[test]
    fn test_variants_are_averaged_and_descriptive_excluded() {
        let engine = AggregationEngine::new(&config()).unwrap();
        let index = index(vec![
            suite("facts", "paid", 1.0),
            SuiteBuilder::new("persona", "paid").with_variant("pirate").with_snapshot(0.2, 1).build(),
            SuiteBuilder::new("persona", "paid").with_variant("poet").with_snapshot(0.6, 1).build(),
            suite("spectrum", "paid", 0.0),
        ]);

        let output = engine.aggregate(&index, &[], &create_pricing_table()).unwrap();
        let model = output.report.model(&ModelId::new("paid")).unwrap();

        assert!((model.evaluation_scores[&EvaluationId::new("persona")] - 0.4).abs() < 1e-12);
        assert_eq!(model.evaluation_scores[&EvaluationId::new("spectrum")], 0.0);
        // (1.0 + 0.4) / 2, spectrum left out
        assert!((model.overall_score.unwrap() - 0.7).abs() < 1e-12);
        assert_eq!(model.category_scores["knowledge"], 1.0);
        assert_eq!(model.category_scores.len(), 1);
    }

    #[test]
    fn test_descriptive_only_model_has_no_overall_score() {
        let engine = AggregationEngine::new(&config()).unwrap();
        let index = index(vec![suite("spectrum", "m", 0.9), suite("facts", "n", 0.1)]);

        let report = engine.aggregate(&index, &[], &PricingTable::new()).unwrap().report;

        let m = report.model(&ModelId::new("m")).unwrap();
        assert_eq!(m.overall_score, None);
        assert_eq!(m.value, ValueMetric::Unknown);
        assert_eq!(m.rank, 2);
    }

    #[test]
    fn test_value_metric_cases() {
        let engine = AggregationEngine::new(&AggregationConfig::default()).unwrap();
        let index = index(vec![
            suite("facts", "paid", 0.8),
            suite("facts", "free", 0.6),
            suite("facts", "mystery", 0.4),
        ]);
        let traces = vec![
            create_trace("paid", "vendor/paid", CallPurpose::Generation, 1000, 500),
            create_trace("free", "vendor/free", CallPurpose::Generation, 1000, 500),
            create_trace("mystery", "vendor/mystery", CallPurpose::Generation, 1000, 500),
        ];

        let output = engine.aggregate(&index, &traces, &create_pricing_table()).unwrap();
        let report = output.report;

        let paid = report.model(&ModelId::new("paid")).unwrap();
        // 1000 * 1e-6 + 500 * 2e-6 = 0.002
        assert!((paid.usage.cost.total_cost - 0.002).abs() < 1e-12);
        assert!((paid.value.as_finite().unwrap() - 400.0).abs() < 1e-6);

        let free = report.model(&ModelId::new("free")).unwrap();
        assert_eq!(free.value, ValueMetric::Unbounded);
        assert!(!free.usage.cost.unpriced);

        let mystery = report.model(&ModelId::new("mystery")).unwrap();
        assert_eq!(mystery.value, ValueMetric::Unknown);
        assert!(mystery.usage.cost.unpriced);
        assert_eq!(mystery.usage.cost.total_cost, 0.0);

        assert_eq!(output.usage.unpriced_slugs, vec!["vendor/mystery".to_string()]);
        assert!((output.usage.total_cost - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_usage_report_counts_calls_and_judge_slugs() {
        let engine = AggregationEngine::new(&AggregationConfig::default()).unwrap();
        let traces = vec![
            create_failed_trace("paid", "vendor/paid", 1),
            create_trace("paid", "vendor/paid", CallPurpose::Generation, 10, 5),
            create_trace("paid", "vendor/judge", CallPurpose::Judge, 100, 20),
        ];

        let report = engine.usage_report(&traces, &create_pricing_table());

        assert_eq!(report.entries.len(), 2);
        let judge = &report.entries[0];
        assert_eq!(judge.slug, "vendor/judge");
        assert!(judge.cost.unpriced);
        let paid = &report.entries[1];
        assert_eq!(paid.calls, 2);
        assert_eq!(paid.failed_calls, 1);
        assert_eq!(paid.tokens, TokenUsage::new(10, 5));
    }

    #[test]
    fn test_judge_tokens_do_not_count_against_the_model() {
        let engine = AggregationEngine::new(&AggregationConfig::default()).unwrap();
        let index = index(vec![suite("facts", "paid", 0.5)]);
        let traces = vec![
            create_trace("paid", "vendor/paid", CallPurpose::Generation, 10, 10),
            create_trace("paid", "vendor/judge", CallPurpose::Judge, 500, 500),
        ];

        let report = engine.aggregate(&index, &traces, &create_pricing_table()).unwrap().report;
        let paid = report.model(&ModelId::new("paid")).unwrap();

        assert_eq!(paid.usage.tokens, TokenUsage::new(10, 10));
        assert!(!paid.usage.cost.unpriced);
    }

    #[test]
    fn test_ranking_ties_break_on_display_name_then_id() {
        let engine = AggregationEngine::new(&AggregationConfig::default()).unwrap();
        let index = index(vec![
            SuiteBuilder::new("facts", "b").with_names("facts", "Same").with_snapshot(0.5, 1).build(),
            SuiteBuilder::new("facts", "a").with_names("facts", "Same").with_snapshot(0.5, 1).build(),
            SuiteBuilder::new("facts", "c").with_names("facts", "Alpha").with_snapshot(0.5, 1).build(),
            SuiteBuilder::new("facts", "d").with_names("facts", "Zed").with_snapshot(0.9, 1).build(),
        ]);

        let report = engine.aggregate(&index, &[], &PricingTable::new()).unwrap().report;
        let order: Vec<(&str, usize)> = report
            .models
            .iter()
            .map(|m| (m.model_id.as_str(), m.rank))
            .collect();

        assert_eq!(order, vec![("d", 1), ("c", 2), ("a", 3), ("b", 4)]);
        assert_eq!(report.tie_break, TIE_BREAK_RULE);
    }

    #[test]
    fn test_overlapping_categories_rejected() {
        let mut config = config();
        config
            .categories
            .insert("reasoning".to_string(), vec![EvaluationId::new("math")]);
        assert!(matches!(
            AggregationEngine::new(&config),
            Err(AggregationError::OverlappingCategories { .. })
        ));
    }

    #[test]
    fn test_empty_index_is_an_error() {
        let engine = AggregationEngine::new(&AggregationConfig::default()).unwrap();
        let empty = MergedIndex {
            generated_at: Utc::now(),
            evaluations: vec![],
            overall_score: None,
        };
        assert!(matches!(
            engine.aggregate(&empty, &[], &PricingTable::new()),
            Err(AggregationError::EmptyIndex)
        ));
    }
}
