//! Static inputs of a run: the model registry and the evaluation catalog

use llm_leaderboard_common::io::{list_files, read_json};
use llm_leaderboard_domain::{EvaluationDefinition, ModelVariant};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument};

use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct RegistryFile {
    models: Vec<ModelVariant>,
}

/// Load the model registry from a TOML or JSON file (`models = [...]`)
#[instrument]
pub fn load_model_registry(path: &Path) -> Result<Vec<ModelVariant>> {
    let registry: RegistryFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => read_json(path)?,
        _ => {
            let content =
                std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            toml::from_str(&content).map_err(|e| Error::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        }
    };

    validate_models(&registry.models).map_err(|reason| Error::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    info!(models = registry.models.len(), "Loaded model registry");
    Ok(registry.models)
}

fn validate_models(models: &[ModelVariant]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for model in models {
        if model.id.is_empty() {
            return Err("model with empty id".to_string());
        }
        if model.slug.trim().is_empty() {
            return Err(format!("model '{}' has an empty slug", model.id));
        }
        if !seen.insert(&model.id) {
            return Err(format!("duplicate model id '{}'", model.id));
        }
    }
    Ok(())
}

/// Load every `*.json` evaluation definition in `dir`
#[instrument]
pub fn load_evaluations(dir: &Path) -> Result<Vec<EvaluationDefinition>> {
    let mut evaluations = Vec::new();
    let mut seen = HashSet::new();

    for path in list_files(dir, "json")? {
        let evaluation: EvaluationDefinition = read_json(&path)?;

        if evaluation.id.is_empty() {
            return Err(Error::Invalid {
                path,
                reason: "evaluation id is empty".to_string(),
            });
        }
        if evaluation.scorers.is_empty() {
            return Err(Error::Invalid {
                path,
                reason: format!("evaluation '{}' declares no scorers", evaluation.id),
            });
        }
        if !seen.insert((evaluation.id.clone(), evaluation.variant.clone())) {
            return Err(Error::Invalid {
                path,
                reason: format!("duplicate evaluation '{}'", evaluation.id),
            });
        }

        evaluations.push(evaluation);
    }

    info!(evaluations = evaluations.len(), "Loaded evaluation catalog");
    Ok(evaluations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_leaderboard_domain::ProviderTier;

    #[test]
    fn test_toml_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.toml");
        std::fs::write(
            &path,
            r#"
[[models]]
id = "acme-7b"
display_name = "Acme 7B"
slug = "acme/acme-7b:free"
tier = "rate_constrained"

[[models]]
id = "big"
display_name = "Big Model"
slug = "vendor/big"

[models.parameters]
temperature = 0.0
"#,
        )
        .unwrap();

        let models = load_model_registry(&path).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].tier, ProviderTier::RateConstrained);
        assert_eq!(models[1].parameters.temperature, Some(0.0));
    }

    #[test]
    fn test_duplicate_model_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{"models": [
                {"id": "a", "display_name": "A", "slug": "x/a"},
                {"id": "a", "display_name": "A again", "slug": "x/a2"}
            ]}"#,
        )
        .unwrap();

        assert!(load_model_registry(&path).is_err());
    }

    #[test]
    fn test_load_evaluations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("capitals.json"),
            r#"{
                "id": "capitals",
                "name": "Capitals",
                "test_cases": [{"id": "fr", "input": "Capital of France?", "expected": "Paris"}],
                "scorers": [{"name": "exact", "kind": {"type": "exact_match"}}]
            }"#,
        )
        .unwrap();

        let evaluations = load_evaluations(dir.path()).unwrap();
        assert_eq!(evaluations.len(), 1);
        assert_eq!(evaluations[0].test_cases[0].expected, "Paris");
    }
}
