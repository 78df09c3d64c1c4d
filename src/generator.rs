//! The "generate content" capability consumed by the retry engine.
//!
//! [`GeminiGenerator`] talks to the Gemini API; [`MockGenerator`] answers from a
//! closure or a script so the engine can be exercised without network access.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gemini_rust::{Content, FileData, Gemini, GenerationConfig, Message, Model, Part, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::error::{AnalysisError, Result};

/// One call to the generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Fully resolved instruction text for this attempt.
    pub prompt: String,
    /// Reference to the media object, e.g. a Gemini file URI or `gs://` URI.
    pub file_uri: String,
    pub mime_type: String,
}

/// Anything that can turn a prompt plus a media reference into raw model text.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[async_trait]
impl<G: ContentGenerator + ?Sized> ContentGenerator for Arc<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request).await
    }
}

/// Builder for [`GeminiGenerator`].
pub struct GeminiGeneratorBuilder {
    api_key: String,
    model: Model,
    config: GenerationConfig,
    timeout: Duration,
    network_retries: usize,
}

impl GeminiGeneratorBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Model::Gemini25Flash,
            config: GeminiGenerator::default_generation_config(),
            timeout: Duration::from_secs(120),
            network_retries: 0,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Set the sampling temperature (default: 0.2).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    /// Override the generation config wholesale.
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Upper bound for a single call, including the response body (default: 120s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Transport-level retries for 429/503 responses and timeouts (default: 0).
    ///
    /// These happen inside one attempt of the retry engine and are invisible to it.
    pub fn with_network_retries(mut self, retries: usize) -> Self {
        self.network_retries = retries;
        self
    }

    pub fn build(self) -> Result<GeminiGenerator> {
        let client = Arc::new(Gemini::with_model(&self.api_key, self.model)?);
        Ok(GeminiGenerator {
            client,
            config: self.config,
            timeout: self.timeout,
            network_retries: self.network_retries,
        })
    }
}

/// Generation capability backed by a Gemini vision model.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Arc<Gemini>,
    config: GenerationConfig,
    timeout: Duration,
    network_retries: usize,
}

impl GeminiGenerator {
    /// Wrap an existing client, e.g. one shared with a [`crate::FileManager`].
    pub fn from_client(client: Arc<Gemini>) -> Self {
        Self {
            client,
            config: Self::default_generation_config(),
            timeout: Duration::from_secs(120),
            network_retries: 0,
        }
    }

    pub fn default_generation_config() -> GenerationConfig {
        GenerationConfig {
            temperature: Some(0.2),
            max_output_tokens: Some(8192),
            ..Default::default()
        }
    }

    /// Access the underlying Gemini client.
    pub fn raw(&self) -> Arc<Gemini> {
        self.client.clone()
    }

    fn message_for(request: &GenerationRequest) -> Message {
        let content = Content {
            parts: Some(vec![
                Part::FileData {
                    file_data: FileData {
                        mime_type: request.mime_type.clone(),
                        file_uri: request.file_uri.clone(),
                    },
                },
                Part::Text {
                    text: request.prompt.clone(),
                    thought: None,
                    thought_signature: None,
                },
            ]),
            role: Some(Role::User),
        };
        Message {
            role: Role::User,
            content,
        }
    }

    async fn call_once(&self, message: &Message) -> Result<String> {
        let call = self
            .client
            .generate_content()
            .with_message(message.clone())
            .with_generation_config(self.config.clone())
            .execute();

        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AnalysisError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        let text = response.text();
        debug!(raw_response_length = text.len(), "Received model response");
        trace!(raw_response = %text, "Raw model text");
        if text.trim().is_empty() {
            return Err(AnalysisError::Generation(
                "model returned no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    #[instrument(skip_all, fields(file_uri = %request.file_uri, mime_type = %request.mime_type))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let message = Self::message_for(request);
        let mut attempt = 0usize;
        loop {
            let err = match self.call_once(&message).await {
                Ok(text) => return Ok(text),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.network_retries {
                return Err(err);
            }
            // Use the provider-advised delay when present, otherwise exponential backoff.
            let delay_secs = err
                .retry_delay()
                .unwrap_or_else(|| 2u64.pow(attempt as u32));
            warn!(
                "Call {}/{} failed: {}. Retrying in {}s...",
                attempt + 1,
                self.network_retries + 1,
                err,
                delay_secs
            );
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            attempt += 1;
        }
    }
}

/// Lightweight view of a call passed to a mock handler.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// Zero-based index of this call on the mock.
    pub call_index: usize,
    pub request: GenerationRequest,
}

/// Handler used to answer calls during tests.
pub type MockHandler = Arc<dyn Fn(MockRequest) -> Result<String> + Send + Sync>;

/// A scripted reply for [`MockGenerator::scripted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// Offline generation capability that records every request it receives.
#[derive(Clone)]
pub struct MockGenerator {
    handler: MockHandler,
    calls: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockGenerator {
    pub fn new(handler: impl Fn(MockRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer calls with `replies` in order, repeating the last one once exhausted.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self::new(move |req: MockRequest| {
            let reply = replies
                .get(req.call_index)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(|| MockReply::fail("no scripted reply"));
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Fail(message) => Err(AnalysisError::Generation(message)),
            }
        })
    }

    /// Always answer with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::scripted(vec![MockReply::Text(text.into())])
    }

    /// Requests received so far, in call order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.prompt).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len() - 1
        };
        (self.handler)(MockRequest {
            call_index,
            request: request.clone(),
        })
    }
}
