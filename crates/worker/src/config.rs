//! Assembling a runner from application configuration

use llm_leaderboard_application::{DispatchScheduler, GenerationGateway, JudgeBackend};
use llm_leaderboard_common::config::{AppConfig, CacheBackend};
use llm_leaderboard_domain::{GenerationParameters, ModelVariant, RunId};
use llm_leaderboard_infrastructure::{
    load_evaluations, load_model_registry, GenerationCache, InMemoryGenerationCache,
    JsonlTraceLog, OpenAiCompatibleClient, ProviderClientConfig, RedisGenerationCache,
    SuiteStore, TraceSink,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::runner::EvaluationRunner;
use crate::selection::{RunPlan, Selection};
use crate::RunError;

/// Load the catalogs named in `config` and apply `selection`
pub fn load_plan(config: &AppConfig, run_id: RunId, selection: &Selection) -> Result<RunPlan, RunError> {
    let evaluations = load_evaluations(&config.paths.evaluations_dir)?;
    let models = load_model_registry(&config.paths.model_registry)?;
    RunPlan::build(run_id, evaluations, models, selection)
}

/// The judge model as a dispatchable variant
pub fn judge_model(config: &AppConfig) -> Option<ModelVariant> {
    let slug = config.judge.slug.trim();
    if slug.is_empty() {
        return None;
    }

    let parameters = GenerationParameters {
        temperature: Some(config.judge.temperature),
        ..Default::default()
    };
    Some(
        ModelVariant::new(slug, format!("Judge ({})", slug), slug, config.judge.tier)
            .with_parameters(parameters),
    )
}

/// A runner wired to the provider, cache, trace log and suite store
pub struct RunContext {
    pub runner: EvaluationRunner,
    pub trace_path: PathBuf,
}

impl RunContext {
    pub async fn from_config(config: &AppConfig, run_id: RunId) -> Result<Self, RunError> {
        let api_key = std::env::var(&config.provider.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = %config.provider.api_key_env,
                "Provider API key is not set; requests will be unauthenticated"
            );
        }

        let client = OpenAiCompatibleClient::new(
            ProviderClientConfig::new(config.provider.base_url.clone())
                .with_api_key(api_key)
                .with_timeout(config.request_timeout()),
        )?;

        let trace_log = JsonlTraceLog::for_run(&config.paths.traces_dir, run_id).await?;
        let trace_path = trace_log.path().to_path_buf();
        let traces: Arc<dyn TraceSink> = Arc::new(trace_log);

        let mut gateway = GenerationGateway::new(
            Arc::new(client),
            Arc::new(DispatchScheduler::new(config.scheduler.intervals())),
            traces,
        )
        .with_retry(config.gateway.retry_config())
        .with_request_timeout(config.request_timeout())
        .with_run_id(run_id);

        if let Some(cache) = build_cache(config).await? {
            gateway = gateway.with_cache(cache);
        }
        let gateway = Arc::new(gateway);

        let mut runner = EvaluationRunner::new(
            gateway.clone(),
            SuiteStore::new(&config.paths.suites_dir),
            config.dispatch.max_concurrency,
        );

        if let Some(model) = judge_model(config) {
            let mut retry = config.gateway.retry_config();
            retry.max_attempts = config.judge.max_attempts;
            info!(judge = %model.slug, attempts = retry.max_attempts, "Judge model configured");
            runner = runner.with_judge(Arc::new(JudgeBackend::new(gateway, model, retry)));
        }

        info!(
            run_id = %run_id,
            cache = ?config.cache.backend,
            traces = %trace_path.display(),
            "Run context ready"
        );
        Ok(Self { runner, trace_path })
    }
}

async fn build_cache(config: &AppConfig) -> Result<Option<Arc<dyn GenerationCache>>, RunError> {
    let ttl = config.cache_ttl();
    let cache: Option<Arc<dyn GenerationCache>> = match config.cache.backend {
        CacheBackend::Memory => Some(Arc::new(InMemoryGenerationCache::new(ttl))),
        CacheBackend::Redis => {
            let url = config.cache.redis_url.as_deref().ok_or_else(|| {
                RunError::Configuration("the redis cache backend needs cache.redis_url".to_string())
            })?;
            let cache = RedisGenerationCache::connect(url, ttl, config.cache.key_prefix.clone()).await?;
            Some(Arc::new(cache))
        }
        CacheBackend::None => None,
    };
    Ok(cache)
}
