//! Fluent builders for evaluation definitions and suites.

use llm_leaderboard_domain::{
    EvaluationDefinition, EvaluationId, RunId, ScorerDefinition, ScorerMetadata, Suite, SuiteKey,
    SuiteSnapshot, SuiteStatus, TestCase,
};

use crate::fixtures::{create_snapshot, suite_key};

/// Builder for [`EvaluationDefinition`]
#[derive(Clone)]
pub struct EvaluationBuilder {
    definition: EvaluationDefinition,
}

impl EvaluationBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            definition: EvaluationDefinition {
                id: EvaluationId::new(id),
                name: id.to_string(),
                variant: None,
                system_prompt: None,
                test_cases: Vec::new(),
                scorers: Vec::new(),
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.definition.name = name.into();
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.definition.variant = Some(variant.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.definition.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_case(mut self, id: &str, input: &str, expected: &str) -> Self {
        self.definition
            .test_cases
            .push(TestCase::new(id, input, expected));
        self
    }

    pub fn with_case_metadata(
        mut self,
        id: &str,
        input: &str,
        expected: &str,
        metadata: ScorerMetadata,
    ) -> Self {
        self.definition
            .test_cases
            .push(TestCase::new(id, input, expected).with_metadata(metadata));
        self
    }

    pub fn with_scorer(mut self, scorer: ScorerDefinition) -> Self {
        self.definition.scorers.push(scorer);
        self
    }

    pub fn build(self) -> EvaluationDefinition {
        self.definition
    }
}

/// Builder for [`Suite`] with an explicit history
#[derive(Clone)]
pub struct SuiteBuilder {
    key: SuiteKey,
    evaluation_name: String,
    model_name: String,
    history: Vec<SuiteSnapshot>,
}

impl SuiteBuilder {
    pub fn new(evaluation: &str, model: &str) -> Self {
        Self {
            key: suite_key(evaluation, model),
            evaluation_name: evaluation.to_string(),
            model_name: model.to_string(),
            history: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.key.variant = Some(variant.into());
        self
    }

    pub fn with_names(mut self, evaluation: impl Into<String>, model: impl Into<String>) -> Self {
        self.evaluation_name = evaluation.into();
        self.model_name = model.into();
        self
    }

    /// Append a snapshot recorded at `minute`
    pub fn with_snapshot(mut self, score: f64, minute: u32) -> Self {
        self.history.push(create_snapshot(score, minute));
        self
    }

    /// Append a snapshot with a fixed run id
    pub fn with_run(mut self, run_id: RunId, score: f64, minute: u32) -> Self {
        self.history.push(SuiteSnapshot {
            run_id,
            ..create_snapshot(score, minute)
        });
        self
    }

    pub fn build(self) -> Suite {
        let mut history = self.history.into_iter();
        let Some(first) = history.next() else {
            return Suite {
                evaluation_id: self.key.evaluation,
                evaluation_name: self.evaluation_name,
                variant: self.key.variant,
                model_id: self.key.model,
                model_name: self.model_name,
                score: 0.0,
                status: SuiteStatus::Error,
                history: Vec::new(),
            };
        };

        let mut suite = Suite::new(self.key, self.evaluation_name, self.model_name, first);
        for snapshot in history {
            suite.record(snapshot);
        }
        suite
    }
}
