//! Generation gateway: cache, admission, retry and tracing around a provider.

use chrono::Utc;
use llm_leaderboard_common::retry::{retry_with_predicate, RetryConfig};
use llm_leaderboard_domain::{
    CallOutcome, CallPurpose, FailureKind, Generation, GenerationFailure, GenerationRequest,
    ModelVariant, RunId, TokenUsage, TraceRecord,
};
use llm_leaderboard_infrastructure::{
    CacheKey, CachedGeneration, GenerationCache, TextGenerator, TraceSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::DispatchScheduler;

/// Whether a call may be answered from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve hits; store successes
    Use,
    /// Skip the lookup but store the fresh result
    Refresh,
}

/// Fault-tolerant front door to the provider.
///
/// A call either returns a [`Generation`] or a [`GenerationFailure`]; failure
/// text never travels in the success channel.
pub struct GenerationGateway {
    generator: Arc<dyn TextGenerator>,
    scheduler: Arc<DispatchScheduler>,
    cache: Option<Arc<dyn GenerationCache>>,
    traces: Arc<dyn TraceSink>,
    retry: RetryConfig,
    request_timeout: Duration,
    run_id: Option<RunId>,
}

impl GenerationGateway {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        scheduler: Arc<DispatchScheduler>,
        traces: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            generator,
            scheduler,
            cache: None,
            traces,
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(120),
            run_id: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn GenerationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Tag every trace with `run_id`
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Generate a response to `prompt` with the model's own parameters
    pub async fn generate(
        &self,
        model: &ModelVariant,
        prompt: &str,
    ) -> Result<Generation, GenerationFailure> {
        let request = GenerationRequest::for_model(model, prompt);
        self.execute(model, request, CallPurpose::Generation, CachePolicy::Use)
            .await
    }

    /// Run a fully specified request
    #[instrument(skip(self, model, request), fields(model = %model.id, slug = %request.slug, purpose = ?purpose))]
    pub async fn execute(
        &self,
        model: &ModelVariant,
        request: GenerationRequest,
        purpose: CallPurpose,
        policy: CachePolicy,
    ) -> Result<Generation, GenerationFailure> {
        let key = self.cache.as_ref().map(|_| CacheKey::for_request(&request));

        if policy == CachePolicy::Use {
            if let Some(hit) = self.lookup(key.as_ref()).await {
                debug!("Cache hit");
                return Ok(Generation {
                    text: hit.text,
                    usage: hit.usage,
                    cached: true,
                    attempts: 0,
                });
            }
        }

        let request = &request;
        let result = retry_with_predicate(
            self.retry.clone(),
            move |attempt| self.attempt(model, request, purpose, attempt),
            GenerationFailure::is_transient,
        )
        .await;

        match result {
            Ok(generation) => {
                self.store(key.as_ref(), &generation).await;
                Ok(generation)
            }
            Err(failure) => {
                warn!(
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    error = %failure.message,
                    "Generation failed"
                );
                Err(failure)
            }
        }
    }

    async fn attempt(
        &self,
        model: &ModelVariant,
        request: &GenerationRequest,
        purpose: CallPurpose,
        attempt: u32,
    ) -> Result<Generation, GenerationFailure> {
        self.scheduler.admit(model.tier).await;

        let outcome =
            match tokio::time::timeout(self.request_timeout, self.generator.complete(request))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(GenerationFailure::new(
                    FailureKind::Timeout,
                    format!("no response within {}s", self.request_timeout.as_secs_f64()),
                )),
            };

        let (call_outcome, usage) = match &outcome {
            Ok(response) => (CallOutcome::Success, response.usage),
            Err(_) => (CallOutcome::Failure, TokenUsage::default()),
        };
        self.trace(model, &request.slug, purpose, attempt, call_outcome, usage)
            .await;

        outcome
            .map(|response| Generation {
                text: response.text,
                usage: response.usage,
                cached: false,
                attempts: attempt,
            })
            .map_err(|failure| failure.with_attempts(attempt))
    }

    async fn trace(
        &self,
        model: &ModelVariant,
        slug: &str,
        purpose: CallPurpose,
        attempt: u32,
        outcome: CallOutcome,
        usage: TokenUsage,
    ) {
        let record = TraceRecord {
            run_id: self.run_id,
            model_id: model.id.clone(),
            slug: slug.to_string(),
            purpose,
            attempt,
            outcome,
            usage,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.traces.record(&record).await {
            warn!(error = %e, "Failed to record trace");
        }
    }

    async fn lookup(&self, key: Option<&CacheKey>) -> Option<CachedGeneration> {
        let (cache, key) = (self.cache.as_ref()?, key?);
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, dispatching");
                None
            }
        }
    }

    async fn store(&self, key: Option<&CacheKey>, generation: &Generation) {
        let (Some(cache), Some(key)) = (self.cache.as_ref(), key) else {
            return;
        };
        let entry = CachedGeneration {
            text: generation.text.clone(),
            usage: generation.usage,
        };
        if let Err(e) = cache.put(key, &entry).await {
            warn!(error = %e, "Failed to cache generation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_leaderboard_domain::ProviderTier;
    use llm_leaderboard_infrastructure::{InMemoryGenerationCache, InMemoryTraceSink};
    use llm_leaderboard_testing::{create_rate_constrained_model, create_test_model, ScriptedGenerator};
    use std::collections::HashMap;

    struct Harness {
        generator: Arc<ScriptedGenerator>,
        traces: Arc<InMemoryTraceSink>,
        gateway: GenerationGateway,
    }

    fn harness(generator: ScriptedGenerator) -> Harness {
        let generator = Arc::new(generator);
        let traces = Arc::new(InMemoryTraceSink::new());
        let mut intervals = HashMap::new();
        intervals.insert(ProviderTier::RateConstrained, Duration::from_millis(3500));

        let gateway = GenerationGateway::new(
            generator.clone(),
            Arc::new(DispatchScheduler::new(intervals)),
            traces.clone(),
        )
        .with_retry(RetryConfig::new(3, Duration::from_millis(100)))
        .with_request_timeout(Duration::from_secs(5))
        .with_run_id(RunId::new());

        Harness {
            generator,
            traces,
            gateway,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let h = harness(ScriptedGenerator::failing_then(
            2,
            FailureKind::ServerError(503),
            "Paris",
        ));
        let model = create_test_model("m");

        let generation = h.gateway.generate(&model, "Capital of France?").await.unwrap();

        assert_eq!(generation.text, "Paris");
        assert_eq!(generation.attempts, 3);
        assert!(!generation.cached);

        let traces = h.traces.records();
        assert_eq!(traces.len(), 3);
        assert_eq!(traces[0].outcome, CallOutcome::Failure);
        assert_eq!(traces[0].usage, TokenUsage::default());
        assert_eq!(traces[2].outcome, CallOutcome::Success);
        assert_eq!(traces[2].attempt, 3);
        assert!(traces.iter().all(|t| t.run_id == h.gateway.run_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_returns_structured_failure() {
        let h = harness(ScriptedGenerator::failing_then(
            5,
            FailureKind::RateLimited,
            "never",
        ));
        let model = create_test_model("m");

        let failure = h.gateway.generate(&model, "hi").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.attempts, 3);
        assert_eq!(h.generator.calls(), 3);
        assert_eq!(h.traces.records().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let h = harness(ScriptedGenerator::failing_then(
            1,
            FailureKind::InvalidCredential,
            "never",
        ));
        let model = create_test_model("m");

        let failure = h.gateway.generate(&model, "hi").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::InvalidCredential);
        assert_eq!(failure.attempts, 1);
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_and_retries() {
        let h = harness(ScriptedGenerator::new().with_delay(Duration::from_secs(30)));
        let model = create_test_model("m");

        let failure = h.gateway.generate(&model, "hi").await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.attempts, 3);
        assert_eq!(h.generator.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_provider_and_traces() {
        let h = harness(ScriptedGenerator::new());
        let gateway = h
            .gateway
            .with_cache(Arc::new(InMemoryGenerationCache::new(Duration::from_secs(60))));
        let model = create_test_model("m");

        let first = gateway.generate(&model, "hi").await.unwrap();
        let second = gateway.generate(&model, "hi").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.attempts, 0);
        assert_eq!(second.text, first.text);
        assert_eq!(h.generator.calls(), 1);
        assert_eq!(h.traces.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let h = harness(ScriptedGenerator::failing_then(
            1,
            FailureKind::BadRequest(400),
            "later",
        ));
        let gateway = h
            .gateway
            .with_cache(Arc::new(InMemoryGenerationCache::new(Duration::from_secs(60))));
        let model = create_test_model("m");

        assert!(gateway.generate(&model, "hi").await.is_err());
        let retried = gateway.generate(&model, "hi").await.unwrap();

        assert_eq!(retried.text, "later");
        assert!(!retried.cached);
        assert_eq!(h.generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_policy_bypasses_lookup() {
        let h = harness(ScriptedGenerator::new());
        let gateway = h
            .gateway
            .with_cache(Arc::new(InMemoryGenerationCache::new(Duration::from_secs(60))));
        let model = create_test_model("m");
        let request = GenerationRequest::for_model(&model, "hi");

        gateway
            .execute(&model, request.clone(), CallPurpose::Judge, CachePolicy::Use)
            .await
            .unwrap();
        let refreshed = gateway
            .execute(&model, request, CallPurpose::Judge, CachePolicy::Refresh)
            .await
            .unwrap();

        assert!(!refreshed.cached);
        assert_eq!(h.generator.calls(), 2);
        assert!(h
            .traces
            .records()
            .iter()
            .all(|t| t.purpose == CallPurpose::Judge));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_wait_for_admission() {
        let h = harness(ScriptedGenerator::failing_then(
            1,
            FailureKind::Network,
            "ok",
        ));
        let model = create_rate_constrained_model("slow");
        let start = tokio::time::Instant::now();

        h.gateway.generate(&model, "hi").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(3500));
    }
}
