//! Generation requests and their successful results.

use crate::model::{GenerationParameters, ModelVariant};
use crate::trace::TokenUsage;
use serde::{Deserialize, Serialize};

/// Structured output constraint for a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

/// One prompt sent to one provider model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub parameters: GenerationParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl GenerationRequest {
    pub fn new(slug: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            system: None,
            prompt: prompt.into(),
            parameters: GenerationParameters::default(),
            response_format: None,
        }
    }

    /// Request for `model` using its configured sampling parameters
    pub fn for_model(model: &ModelVariant, prompt: impl Into<String>) -> Self {
        Self::new(model.slug.clone(), prompt).with_parameters(model.parameters.clone())
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// Text produced by a provider. Failures are never represented here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    /// Served from the cache without contacting the provider
    pub cached: bool,
    /// Provider attempts spent (0 when cached)
    pub attempts: u32,
}
