//! Routes an analysis/translation task to a local or remote LLM provider,
//! with fallback, rate limiting, and response parsing.

use crate::response_parser::{parse_and_validate, ParseFailureKind};
use pipeline_core::{retry_with_backoff, ErrorKind, PipelineError, RetryPolicy};
use pipeline_llm::chat::{ChatModel, ChatRequest, Message};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The kind of task being routed; keys the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    HighlightDetection,
    ChapterDetection,
    Translation,
    TitleGeneration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Remote,
}

/// Token-bucket limiter gating remote calls. Refill rate is `rpm / 60`
/// tokens per second up to a capacity of `rpm`.
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
}

struct RateLimiterState {
    capacity: f64,
    tokens: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rpm: u32) -> Self {
        let capacity = rpm.max(1) as f64;
        Self {
            state: Mutex::new(RateLimiterState {
                capacity,
                tokens: capacity,
                refill_per_second: capacity / 60.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until a token is available, polling at a fixed short interval.
    pub async fn acquire(&self) {
        loop {
            {
                let mut state = self.state.lock().await;
                state.refill();
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl RateLimiterState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }
}

#[derive(Debug, Clone)]
pub struct LlmRouterConfig {
    pub routing: HashMap<TaskKind, ProviderKind>,
    pub fallback_enabled: bool,
    pub rpm: u32,
    pub temperature: f32,
    pub retry_policy: RetryPolicy,
}

impl Default for LlmRouterConfig {
    fn default() -> Self {
        let mut routing = HashMap::new();
        routing.insert(TaskKind::HighlightDetection, ProviderKind::Local);
        routing.insert(TaskKind::ChapterDetection, ProviderKind::Local);
        routing.insert(TaskKind::Translation, ProviderKind::Remote);
        routing.insert(TaskKind::TitleGeneration, ProviderKind::Local);
        Self {
            routing,
            fallback_enabled: true,
            rpm: 60,
            temperature: 0.2,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Selects a provider per task kind, applies remote rate limiting, parses
/// and validates the response, and falls back from local to remote on
/// transport/timeout/parse failure.
pub struct LlmRouter {
    local: Arc<dyn ChatModel>,
    remote: Arc<dyn ChatModel>,
    config: LlmRouterConfig,
    limiter: RateLimiter,
    fallback_count: AtomicU64,
    both_failed_count: AtomicU64,
}

impl LlmRouter {
    pub fn new(local: Arc<dyn ChatModel>, remote: Arc<dyn ChatModel>, config: LlmRouterConfig) -> Self {
        let limiter = RateLimiter::new(config.rpm);
        Self {
            local,
            remote,
            config,
            limiter,
            fallback_count: AtomicU64::new(0),
            both_failed_count: AtomicU64::new(0),
        }
    }

    /// Number of `execute` calls that fell back from local to remote.
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// Number of `execute` calls where both the local primary and the
    /// remote fallback failed (invariant §8 #3).
    pub fn both_failed_count(&self) -> u64 {
        self.both_failed_count.load(Ordering::Relaxed)
    }

    fn provider_for(&self, task: TaskKind) -> ProviderKind {
        *self.config.routing.get(&task).unwrap_or(&ProviderKind::Local)
    }

    fn model_for(&self, kind: ProviderKind) -> &Arc<dyn ChatModel> {
        match kind {
            ProviderKind::Local => &self.local,
            ProviderKind::Remote => &self.remote,
        }
    }

    /// Executes `task` with `prompt`, validating the parsed response against
    /// `schema`. Applies local-to-remote fallback and remote rate limiting
    /// per the routing table.
    pub async fn execute(
        &self,
        task: TaskKind,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, PipelineError> {
        let primary = self.provider_for(task);
        match self.call_and_parse(primary, prompt, schema, false).await {
            Ok(value) => Ok(value),
            Err(err) if primary == ProviderKind::Local && self.config.fallback_enabled => {
                warn!(
                    task = ?task,
                    error = %err,
                    "primary local provider failed, falling back to remote"
                );
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                let result = self
                    .call_and_parse(ProviderKind::Remote, prompt, schema, true)
                    .await;
                if result.is_err() {
                    self.both_failed_count.fetch_add(1, Ordering::Relaxed);
                }
                result
            }
            Err(err) => Err(err),
        }
    }

    async fn call_and_parse(
        &self,
        provider: ProviderKind,
        prompt: &str,
        schema: &Value,
        strict: bool,
    ) -> Result<Value, PipelineError> {
        let augmented = if strict {
            format!(
                "{prompt}\n\nRespond with ONLY valid JSON matching the required schema exactly. No prose, no markdown fences."
            )
        } else {
            prompt.to_string()
        };

        if provider == ProviderKind::Remote {
            self.limiter.acquire().await;
        }

        let policy = self.config.retry_policy.clone();
        let model = self.model_for(provider).clone();
        let temperature = self.config.temperature;
        let prompt_for_call = augmented.clone();

        let raw = retry_with_backoff(
            &policy,
            |err: &LlmCallError| err.retryable,
            || {
                let model = model.clone();
                let prompt = prompt_for_call.clone();
                async move { call_provider(&*model, &prompt, temperature).await }
            },
        )
        .await
        .map_err(|e| classify_call_error(&e))?;

        match parse_and_validate(&raw, schema) {
            Ok(value) => Ok(value),
            Err(parse_err) if !strict => {
                debug!(detail = %parse_err.detail, "response parse failed, retrying once in strict mode");
                self.call_and_parse_strict_retry(provider, prompt, schema).await
            }
            Err(parse_err) => Err(PipelineError::new(
                match parse_err.kind {
                    ParseFailureKind::ParseFailure => ErrorKind::ParseFailure,
                    ParseFailureKind::SchemaFailure => ErrorKind::ParseFailure,
                },
                pipeline_checkpoint::Stage::Analyze,
                parse_err.detail,
            )),
        }
    }

    async fn call_and_parse_strict_retry(
        &self,
        provider: ProviderKind,
        prompt: &str,
        schema: &Value,
    ) -> Result<Value, PipelineError> {
        Box::pin(self.call_and_parse(provider, prompt, schema, true)).await
    }
}

#[derive(Debug, Clone)]
struct LlmCallError {
    message: String,
    retryable: bool,
    quota_exceeded: bool,
}

async fn call_provider(
    model: &dyn ChatModel,
    prompt: &str,
    temperature: f32,
) -> Result<String, LlmCallError> {
    let request = ChatRequest::new(vec![Message::human(prompt)]).with_temperature(temperature);
    let response = model.chat(request).await.map_err(|e| LlmCallError {
        message: e.to_string(),
        retryable: e.is_retryable(),
        quota_exceeded: matches!(e, pipeline_llm::error::LlmError::QuotaExceeded(_)),
    })?;
    Ok(response.message.text().unwrap_or_default().to_string())
}

fn classify_call_error(err: &LlmCallError) -> PipelineError {
    let kind = if err.quota_exceeded {
        ErrorKind::InvalidInput
    } else if err.retryable {
        ErrorKind::RateLimited
    } else {
        ErrorKind::ProviderUnavailable
    };
    PipelineError::new(kind, pipeline_checkpoint::Stage::Analyze, err.message.clone())
}
