//! Bounded-concurrency execution of a run plan

use futures::future::join_all;
use llm_leaderboard_application::{
    CachePolicy, GenerationGateway, JudgeBackend, ScorerHarness, SuiteAccumulator,
    TestCaseOutcome,
};
use llm_leaderboard_domain::{
    CallPurpose, EvaluationDefinition, GenerationRequest, ModelVariant, RunId, SuiteKey,
    SuiteStatus, TestCase,
};
use llm_leaderboard_infrastructure::SuiteStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument};

use crate::metrics::{MetricsSnapshot, RunMetrics};
use crate::selection::RunPlan;
use crate::RunError;

/// Result of one (evaluation, model) suite in a run
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub key: SuiteKey,
    pub evaluation_name: String,
    pub model_name: String,
    pub score: f64,
    pub status: SuiteStatus,
    /// Where the suite was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Why the suite could not be written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub suites: Vec<SuiteReport>,
    pub metrics: MetricsSnapshot,
}

impl RunSummary {
    pub fn write_failures(&self) -> usize {
        self.suites.iter().filter(|s| s.write_error.is_some()).count()
    }
}

/// Runs every (test case × model) unit of a plan, at most
/// `max_concurrency` at a time, and persists each suite as soon as its
/// units are done.
pub struct EvaluationRunner {
    gateway: Arc<GenerationGateway>,
    judge: Option<Arc<JudgeBackend>>,
    store: SuiteStore,
    permits: Arc<Semaphore>,
    metrics: RunMetrics,
}

impl EvaluationRunner {
    pub fn new(gateway: Arc<GenerationGateway>, store: SuiteStore, max_concurrency: usize) -> Self {
        Self {
            gateway,
            judge: None,
            store,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            metrics: RunMetrics::new(),
        }
    }

    pub fn with_judge(mut self, judge: Arc<JudgeBackend>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &SuiteStore {
        &self.store
    }

    /// Execute `plan`.
    ///
    /// Scorer configuration errors abort before any generation. Failures of
    /// individual units never abort the run; a suite that cannot be written
    /// is reported in the summary.
    #[instrument(skip(self, plan), fields(run_id = %plan.run_id))]
    pub async fn run(&self, plan: &RunPlan) -> Result<RunSummary, RunError> {
        let harnesses = plan
            .evaluations
            .iter()
            .map(|evaluation| {
                ScorerHarness::from_definitions(&evaluation.scorers, self.judge.clone())
                    .map_err(RunError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            evaluations = plan.evaluations.len(),
            models = plan.models.len(),
            units = plan.unit_count(),
            max_concurrency = self.permits.available_permits(),
            "Run started"
        );

        let suites = plan
            .evaluations
            .iter()
            .zip(&harnesses)
            .flat_map(|(evaluation, harness)| {
                plan.models
                    .iter()
                    .map(move |model| self.run_suite(plan.run_id, evaluation, model, harness))
            });
        let suites = join_all(suites).await;

        self.metrics.log_summary();
        Ok(RunSummary {
            run_id: plan.run_id,
            suites,
            metrics: self.metrics.snapshot(),
        })
    }

    #[instrument(skip_all, fields(evaluation = %evaluation.id, model = %model.id))]
    async fn run_suite(
        &self,
        run_id: RunId,
        evaluation: &EvaluationDefinition,
        model: &ModelVariant,
        harness: &ScorerHarness,
    ) -> SuiteReport {
        let outcomes = join_all(
            evaluation
                .test_cases
                .iter()
                .map(|case| self.run_unit(evaluation, model, case, harness)),
        )
        .await;

        let mut accumulator = SuiteAccumulator::new(evaluation, model);
        for outcome in outcomes {
            accumulator.push(outcome);
        }
        let snapshot = accumulator.finish(run_id);
        let mut report = SuiteReport {
            key: accumulator.key().clone(),
            evaluation_name: accumulator.evaluation_name().to_string(),
            model_name: accumulator.model_name().to_string(),
            score: snapshot.score,
            status: snapshot.status(),
            path: None,
            write_error: None,
        };

        // suite files are written with blocking fs calls and fsync
        let store = self.store.clone();
        let key = accumulator.key().clone();
        let evaluation_name = report.evaluation_name.clone();
        let model_name = report.model_name.clone();
        let written = tokio::task::spawn_blocking(move || {
            store.record(&key, &evaluation_name, &model_name, snapshot)
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|result| result.map_err(|e| e.to_string()));

        match written {
            Ok((_, path)) => {
                self.metrics.increment_suites_written();
                info!(
                    score = report.score,
                    status = ?report.status,
                    path = %path.display(),
                    "Suite written"
                );
                report.path = Some(path);
            }
            Err(e) => {
                self.metrics.increment_suite_write_failures();
                error!(error = %e, "Failed to write suite");
                report.write_error = Some(e);
            }
        }
        report
    }

    async fn run_unit(
        &self,
        evaluation: &EvaluationDefinition,
        model: &ModelVariant,
        case: &TestCase,
        harness: &ScorerHarness,
    ) -> TestCaseOutcome {
        // the semaphore is never closed, so acquire cannot fail
        let _permit = self.permits.acquire().await.ok();
        let started = Instant::now();

        let request = GenerationRequest::for_model(model, case.input.as_str())
            .with_system(evaluation.system_prompt.clone());
        let output = self
            .gateway
            .execute(model, request, CallPurpose::Generation, CachePolicy::Use)
            .await;
        let cached = output.as_ref().map(|g| g.cached).unwrap_or(false);

        let outcome = harness.score(case, &output).await;
        self.metrics.record_unit(
            started.elapsed(),
            outcome.generation_failed(),
            cached,
            outcome.scoring_errors(),
        );
        outcome
    }
}
