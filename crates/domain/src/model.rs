//! Model variant types.

use crate::identifiers::ModelId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rate-limit sensitivity of a model's provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    /// Free or heavily throttled endpoints that need request spacing
    RateConstrained,
    /// Paid endpoints that accept requests as fast as we send them
    Unconstrained,
}

impl ProviderTier {
    /// Stable string form used in config keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateConstrained => "rate_constrained",
            Self::Unconstrained => "unconstrained",
        }
    }
}

impl Default for ProviderTier {
    fn default() -> Self {
        Self::Unconstrained
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A configured model under evaluation.
///
/// `id` is the stable key used in suites and reports, `slug` is the
/// provider-side model name used for dispatch, traces and pricing lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVariant {
    pub id: ModelId,
    pub display_name: String,
    pub slug: String,
    #[serde(default)]
    pub tier: ProviderTier,
    #[serde(default)]
    pub parameters: GenerationParameters,
}

impl ModelVariant {
    pub fn new(
        id: impl Into<ModelId>,
        display_name: impl Into<String>,
        slug: impl Into<String>,
        tier: ProviderTier,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            slug: slug.into(),
            tier,
            parameters: GenerationParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }
}
