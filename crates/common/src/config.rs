//! Configuration management for the leaderboard.
//!
//! Settings are layered from defaults, configuration files and environment
//! variables.
//!
//! ## Example Configuration
//!
//! ```toml
//! [provider]
//! base_url = "https://openrouter.ai/api/v1"
//! api_key_env = "OPENROUTER_API_KEY"
//!
//! [judge]
//! slug = "deepseek/deepseek-r1:free"
//! tier = "rate_constrained"
//!
//! [scheduler]
//! rate_constrained_interval_ms = 3500
//!
//! [cache]
//! backend = "redis"
//! redis_url = "redis://localhost:6379"
//!
//! [aggregation]
//! descriptive_only = ["political_compass"]
//!
//! [aggregation.categories]
//! reasoning = ["logic_puzzles", "math_word_problems"]
//! ```

use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use llm_leaderboard_domain::{EvaluationId, ProviderTier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Generation provider connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible API root (the client appends `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Retry policy of the generation gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Total attempts per generation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Judge scorer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Provider slug of the reasoning model
    #[serde(default = "default_judge_slug")]
    pub slug: String,

    /// Total attempts per judge call, malformed verdicts included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub temperature: f64,

    /// Scheduler tier the judge provider is admitted under
    #[serde(default = "default_judge_tier")]
    pub tier: ProviderTier,
}

/// Per-tier admission spacing. Zero disables spacing for that tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_rate_constrained_interval")]
    pub rate_constrained_interval_ms: u64,

    #[serde(default)]
    pub unconstrained_interval_ms: u64,
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local cache
    #[default]
    Memory,
    /// Shared Redis cache
    Redis,
    /// No caching
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_cache_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Units (test case × model) in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_suites_dir")]
    pub suites_dir: PathBuf,
    #[serde(default = "default_traces_dir")]
    pub traces_dir: PathBuf,
    #[serde(default = "default_merged_index")]
    pub merged_index: PathBuf,
    #[serde(default = "default_aggregate_report")]
    pub aggregate_report: PathBuf,
    #[serde(default = "default_usage_report")]
    pub usage_report: PathBuf,
    #[serde(default = "default_pricing_catalog")]
    pub pricing_catalog: PathBuf,
    #[serde(default = "default_model_registry")]
    pub model_registry: PathBuf,
    #[serde(default = "default_evaluations_dir")]
    pub evaluations_dir: PathBuf,
}

/// Static inputs of the aggregation step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Category name → member evaluations
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<EvaluationId>>,

    /// Evaluations that never count towards the overall score
    #[serde(default)]
    pub descriptive_only: Vec<EvaluationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_judge_tier() -> ProviderTier {
    ProviderTier::Unconstrained
}

fn default_judge_slug() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_rate_constrained_interval() -> u64 {
    3500
}

fn default_cache_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_cache_prefix() -> String {
    "leaderboard:gen:".to_string()
}

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

fn default_suites_dir() -> PathBuf {
    PathBuf::from("results/suites")
}

fn default_traces_dir() -> PathBuf {
    PathBuf::from("results/traces")
}

fn default_merged_index() -> PathBuf {
    PathBuf::from("results/merged_index.json")
}

fn default_aggregate_report() -> PathBuf {
    PathBuf::from("results/aggregate_report.json")
}

fn default_usage_report() -> PathBuf {
    PathBuf::from("results/usage_report.json")
}

fn default_pricing_catalog() -> PathBuf {
    PathBuf::from("data/pricing.json")
}

fn default_model_registry() -> PathBuf {
    PathBuf::from("config/models.toml")
}

fn default_evaluations_dir() -> PathBuf {
    PathBuf::from("evaluations")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            slug: default_judge_slug(),
            max_attempts: default_max_attempts(),
            temperature: 0.0,
            tier: default_judge_tier(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_constrained_interval_ms: default_rate_constrained_interval(),
            unconstrained_interval_ms: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_secs: default_cache_ttl(),
            redis_url: None,
            key_prefix: default_cache_prefix(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            suites_dir: default_suites_dir(),
            traces_dir: default_traces_dir(),
            merged_index: default_merged_index(),
            aggregate_report: default_aggregate_report(),
            usage_report: default_usage_report(),
            pricing_catalog: default_pricing_catalog(),
            model_registry: default_model_registry(),
            evaluations_dir: default_evaluations_dir(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logging: false,
            log_level: default_log_level(),
        }
    }
}

impl GatewayConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts, Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
    }
}

impl SchedulerConfig {
    /// Minimum admission interval per tier; tiers without spacing are absent
    pub fn intervals(&self) -> HashMap<ProviderTier, Duration> {
        [
            (ProviderTier::RateConstrained, self.rate_constrained_interval_ms),
            (ProviderTier::Unconstrained, self.unconstrained_interval_ms),
        ]
        .into_iter()
        .filter(|(_, ms)| *ms > 0)
        .map(|(tier, ms)| (tier, Duration::from_millis(ms)))
        .collect()
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/{environment}.toml (if exists, where environment is from LEADERBOARD_ENV)
    /// 4. `explicit`, when given (must exist)
    /// 5. Environment variables (prefixed with LEADERBOARD__)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use llm_leaderboard_common::config::AppConfig;
    ///
    /// let config = AppConfig::load(None).expect("Failed to load configuration");
    /// println!("Suites are written to {}", config.paths.suites_dir.display());
    /// ```
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env = std::env::var("LEADERBOARD_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // Example: LEADERBOARD__DISPATCH__MAX_CONCURRENCY=8
        let config = builder
            .add_source(
                config::Environment::with_prefix("LEADERBOARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway.max_attempts == 0 {
            anyhow::bail!("Gateway attempt budget must be greater than 0");
        }

        if self.judge.max_attempts == 0 {
            anyhow::bail!("Judge attempt budget must be greater than 0");
        }

        let multiplier = self.gateway.backoff_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            anyhow::bail!("Backoff multiplier must be positive");
        }

        if self.provider.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than 0");
        }

        if self.dispatch.max_concurrency == 0 {
            anyhow::bail!("Dispatch concurrency must be greater than 0");
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            anyhow::bail!("Redis cache backend requires cache.redis_url");
        }

        let mut seen: HashSet<&EvaluationId> = HashSet::new();
        for (category, members) in &self.aggregation.categories {
            for evaluation in members {
                if !seen.insert(evaluation) {
                    anyhow::bail!(
                        "Evaluation '{}' is listed under more than one category (again in '{}')",
                        evaluation,
                        category
                    );
                }
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_scheduler_intervals() {
        let intervals = SchedulerConfig::default().intervals();
        assert_eq!(
            intervals.get(&ProviderTier::RateConstrained),
            Some(&Duration::from_millis(3500))
        );
        assert!(!intervals.contains_key(&ProviderTier::Unconstrained));
    }

    #[test]
    fn test_rejects_zero_budgets() {
        let mut config = AppConfig::default();
        config.gateway.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dispatch.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_evaluation_in_two_categories() {
        let mut config = AppConfig::default();
        config
            .aggregation
            .categories
            .insert("reasoning".into(), vec![EvaluationId::new("logic")]);
        config
            .aggregation
            .categories
            .insert("knowledge".into(), vec![EvaluationId::new("logic")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = AppConfig::default();
        config.telemetry.log_level = "verbose".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaderboard.toml");
        std::fs::write(
            &path,
            r#"
[dispatch]
max_concurrency = 2

[aggregation]
descriptive_only = ["compass"]
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.dispatch.max_concurrency, 2);
        assert_eq!(config.aggregation.descriptive_only, vec![EvaluationId::new("compass")]);
    }
}
