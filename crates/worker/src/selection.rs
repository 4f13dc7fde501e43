//! Choosing which evaluations and models a run covers

use llm_leaderboard_domain::{EvaluationDefinition, ModelVariant, RunId};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

use crate::RunError;

/// What a selection filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    Models,
    Evaluations,
}

impl fmt::Display for SelectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Models => f.write_str("models"),
            Self::Evaluations => f.write_str("evaluations"),
        }
    }
}

/// Optional filters from the command line.
///
/// `None` selects everything in the catalog. A filter is a list of ids;
/// models also match on their provider slug.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub models: Option<Vec<String>>,
    pub evaluations: Option<Vec<String>>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_evaluations(mut self, evaluations: Vec<String>) -> Self {
        self.evaluations = Some(evaluations);
        self
    }
}

/// The work of one run: every selected evaluation against every selected model
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run_id: RunId,
    pub evaluations: Vec<EvaluationDefinition>,
    pub models: Vec<ModelVariant>,
}

impl RunPlan {
    /// Apply `selection` to the catalogs.
    ///
    /// A filter (or catalog) that leaves nothing to run is
    /// [`RunError::EmptySelection`]; it never widens to "all".
    pub fn build(
        run_id: RunId,
        evaluations: Vec<EvaluationDefinition>,
        models: Vec<ModelVariant>,
        selection: &Selection,
    ) -> Result<Self, RunError> {
        let evaluations = filter(
            evaluations,
            selection.evaluations.as_deref(),
            SelectionTarget::Evaluations,
            |evaluation, wanted| evaluation.id.as_str() == wanted,
        )?;
        let models = filter(
            models,
            selection.models.as_deref(),
            SelectionTarget::Models,
            |model, wanted| model.id.as_str() == wanted || model.slug == wanted,
        )?;

        let plan = Self {
            run_id,
            evaluations,
            models,
        };
        info!(
            run_id = %plan.run_id,
            evaluations = plan.evaluations.len(),
            models = plan.models.len(),
            units = plan.unit_count(),
            "Run planned"
        );
        Ok(plan)
    }

    /// Number of (test case × model) units
    pub fn unit_count(&self) -> usize {
        let cases: usize = self.evaluations.iter().map(|e| e.test_cases.len()).sum();
        cases * self.models.len()
    }

    /// Number of suites the run will write
    pub fn suite_count(&self) -> usize {
        self.evaluations.len() * self.models.len()
    }
}

fn filter<T>(
    items: Vec<T>,
    wanted: Option<&[String]>,
    target: SelectionTarget,
    matches: impl Fn(&T, &str) -> bool,
) -> Result<Vec<T>, RunError> {
    let selected: Vec<T> = match wanted {
        None => items,
        Some(wanted) => {
            let mut matched: HashSet<&str> = HashSet::new();
            let selected: Vec<T> = items
                .into_iter()
                .filter(|item| {
                    let mut hit = false;
                    for w in wanted.iter().filter(|w| matches(item, w.as_str())) {
                        matched.insert(w.as_str());
                        hit = true;
                    }
                    hit
                })
                .collect();

            for name in wanted.iter().filter(|w| !matched.contains(w.as_str())) {
                warn!(target_kind = %target, name = %name, "Selection entry matched nothing");
            }
            selected
        }
    };

    if selected.is_empty() {
        return Err(RunError::EmptySelection {
            target,
            filter: wanted.map(|w| w.to_vec()).unwrap_or_default(),
        });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_leaderboard_testing::{create_test_evaluation, create_test_model};

    fn catalogs() -> (Vec<EvaluationDefinition>, Vec<ModelVariant>) {
        (
            vec![create_test_evaluation("math", 2), create_test_evaluation("logic", 3)],
            vec![create_test_model("alpha"), create_test_model("beta")],
        )
    }

    #[test]
    fn test_no_filter_selects_everything() {
        let (evaluations, models) = catalogs();
        let plan = RunPlan::build(RunId::new(), evaluations, models, &Selection::all()).unwrap();

        assert_eq!(plan.evaluations.len(), 2);
        assert_eq!(plan.models.len(), 2);
        assert_eq!(plan.unit_count(), 10);
        assert_eq!(plan.suite_count(), 4);
    }

    #[test]
    fn test_models_match_by_id_or_slug() {
        let (evaluations, models) = catalogs();
        let selection = Selection::all()
            .with_models(vec!["vendor/beta".to_string()])
            .with_evaluations(vec!["logic".to_string(), "unknown".to_string()]);

        let plan = RunPlan::build(RunId::new(), evaluations, models, &selection).unwrap();

        assert_eq!(plan.models.len(), 1);
        assert_eq!(plan.models[0].id.as_str(), "beta");
        assert_eq!(plan.evaluations.len(), 1);
        assert_eq!(plan.unit_count(), 3);
    }

    #[test]
    fn test_filter_matching_nothing_is_an_error() {
        let (evaluations, models) = catalogs();
        let selection = Selection::all().with_models(vec!["gamma".to_string()]);

        let err = RunPlan::build(RunId::new(), evaluations, models, &selection).unwrap_err();

        match err {
            RunError::EmptySelection { target, filter } => {
                assert_eq!(target, SelectionTarget::Models);
                assert_eq!(filter, vec!["gamma".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_filter_list_is_not_all() {
        let (evaluations, models) = catalogs();
        let selection = Selection::all().with_evaluations(Vec::new());

        let err = RunPlan::build(RunId::new(), evaluations, models, &selection).unwrap_err();
        assert!(matches!(
            err,
            RunError::EmptySelection {
                target: SelectionTarget::Evaluations,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let (evaluations, _) = catalogs();
        let err = RunPlan::build(RunId::new(), evaluations, Vec::new(), &Selection::all())
            .unwrap_err();
        assert!(err.to_string().contains("models"));
    }
}
