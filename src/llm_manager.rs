use crate::config::RequestsConfig;
use crate::error::EcoError;
use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::impl_event_emitter;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Input for the remote structured-analysis capability.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system_instruction: String,
    pub user_prompt: String,
    pub output_schema: Value,
    pub temperature: f32,
}

/// Input for the remote image capability.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub image_count: u32,
    pub output_mime_type: String,
    pub aspect_ratio: String,
}

impl ImageRequest {
    /// One 16:9 JPEG for the given prompt.
    pub fn single(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_count: 1,
            output_mime_type: "image/jpeg".to_string(),
            aspect_ratio: "16:9".to_string(),
        }
    }
}

/// Trait representing a remote model provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Model used for structured text generation.
    fn model_name(&self) -> &str {
        "Unknown"
    }

    /// Model used for image generation.
    fn image_model_name(&self) -> &str {
        "Unknown"
    }

    /// Produce raw text expected to contain one JSON object matching the schema.
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String, EcoError>;

    /// Produce zero or one image as raw bytes.
    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<Vec<u8>>, EcoError>;
}

/// Timeout and retry limits applied to every remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub analysis_timeout: Duration,
    pub image_timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            analysis_timeout: Duration::from_secs(60),
            image_timeout: Duration::from_secs(90),
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl From<&RequestsConfig> for RetryPolicy {
    fn from(config: &RequestsConfig) -> Self {
        Self {
            analysis_timeout: Duration::from_secs(config.timeout_secs),
            image_timeout: Duration::from_secs(config.image_timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Wraps the provider with timeouts, one retry on transient errors, and API events.
pub struct LLMManager {
    provider: Box<dyn LLMProvider>,
    policy: RetryPolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl LLMManager {
    pub fn new(provider: Box<dyn LLMProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.set_event_bus(bus);
        self
    }

    pub fn provider(&self) -> &dyn LLMProvider {
        self.provider.as_ref()
    }

    /// Send a structured-analysis request to the active provider.
    pub async fn send_structured(&self, request: &StructuredRequest) -> Result<String, EcoError> {
        let provider = self.provider();
        let result = self
            .call_with_retry(provider, provider.model_name(), self.policy.analysis_timeout, || {
                provider.generate_structured(request)
            })
            .await;
        if let Ok(text) = &result {
            debug!("{} returned {} bytes of analysis text", provider.name(), text.len());
            self.emit_completed(provider, provider.model_name(), text.len()).await;
        }
        result
    }

    /// Ask the active provider for one image.
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<Option<Vec<u8>>, EcoError> {
        let provider = self.provider();
        let result = self
            .call_with_retry(provider, provider.image_model_name(), self.policy.image_timeout, || {
                provider.generate_image(request)
            })
            .await;
        if let Ok(image) = &result {
            let bytes = image.as_ref().map_or(0, |b| b.len());
            self.emit_completed(provider, provider.image_model_name(), bytes).await;
        }
        result
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        provider: &dyn LLMProvider,
        model: &str,
        timeout: Duration,
        mut call: F,
    ) -> Result<T, EcoError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EcoError>>,
    {
        let mut attempt = 0;
        loop {
            let _ = self
                .emit_event(Event::APICallStarted {
                    provider: provider.name().to_string(),
                    model: model.to_string(),
                })
                .await;

            let outcome = match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(EcoError::transient(format!(
                    "{} request timed out after {}s",
                    provider.name(),
                    timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} call failed ({}), retrying ({}/{})",
                        provider.name(),
                        err,
                        attempt,
                        self.policy.max_retries
                    );
                    let _ = self
                        .emit_event(Event::APIRetry {
                            provider: provider.name().to_string(),
                            attempt,
                            error: err.to_string(),
                        })
                        .await;
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(err) => {
                    let _ = self
                        .emit_event(Event::APIError {
                            provider: provider.name().to_string(),
                            error: err.to_string(),
                        })
                        .await;
                    return Err(err);
                }
            }
        }
    }

    async fn emit_completed(&self, provider: &dyn LLMProvider, model: &str, bytes: usize) {
        let _ = self
            .emit_event(Event::APICallCompleted {
                provider: provider.name().to_string(),
                model: model.to_string(),
                bytes,
            })
            .await;
    }
}

// Implement EventEmitter trait for LLMManager
impl_event_emitter!(LLMManager);
