//! Mock provider for exercising the gateway without HTTP.

use async_trait::async_trait;
use llm_leaderboard_domain::{FailureKind, GenerationFailure, GenerationRequest, TokenUsage};
use llm_leaderboard_infrastructure::{ProviderResponse, TextGenerator};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

type Scripted = Result<ProviderResponse, GenerationFailure>;

pub fn ok_response(text: &str) -> Scripted {
    Ok(ProviderResponse {
        text: text.to_string(),
        usage: TokenUsage::new(10, 5),
    })
}

pub fn failure(kind: FailureKind) -> Scripted {
    Err(GenerationFailure::new(kind, "scripted failure"))
}

/// Provider stand-in that replays a script.
///
/// Queued responses are consumed first; after that a per-slug response is
/// used when one is configured, otherwise the fallback.
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Scripted>>,
    by_slug: HashMap<String, Scripted>,
    fallback: Scripted,
    delay: Option<Duration>,
    calls: AtomicU32,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Always answers "ok"
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            by_slug: HashMap::new(),
            fallback: ok_response("ok"),
            delay: None,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails `failures` times with `kind`, then answers `text`
    pub fn failing_then(failures: usize, kind: FailureKind, text: &str) -> Self {
        let generator = Self::new().with_fallback(ok_response(text));
        for _ in 0..failures {
            generator.push(failure(kind));
        }
        generator
    }

    pub fn with_fallback(mut self, response: Scripted) -> Self {
        self.fallback = response;
        self
    }

    pub fn for_slug(mut self, slug: &str, response: Scripted) -> Self {
        self.by_slug.insert(slug.to_string(), response);
        self
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: Scripted) {
        self.queue.lock().push_back(response);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<ProviderResponse, GenerationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(next) = self.queue.lock().pop_front() {
            return next;
        }
        self.by_slug
            .get(&request.slug)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
