
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::EmbedderConfig;
use crate::embeddings::Embedder;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// HTTP client for an Ollama-style embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: Url,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let base_url = config
            .embedder_url()
            .context("Failed to generate embedder URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            dimension: config.dimension as usize,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if embed_response.embedding.len() != self.dimension {
            return Err(anyhow::anyhow!(
                "Embedding has {} dimensions, expected {}",
                embed_response.embedding.len(),
                self.dimension
            ));
        }

        Ok(embed_response.embedding)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl Embedder for EmbeddingClient {
    #[inline]
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        self.generate_embedding(text)
            .map_err(|e| crate::RecsError::Embedding(format!("{e:#}")))
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}
