//! Analysis service client: send the assembled document text to a
//! chat-completions endpoint and return the raw reply, retrying transient
//! failures per the configured [`RetryPolicy`].
//!
//! The wire transport sits behind [`AnalysisTransport`] so the retry logic
//! can be tested against deterministic fakes and embedders can interpose
//! middleware. Classification happens at the transport boundary: the
//! transport decides *what kind* of failure occurred, the client decides
//! *what to do* about it.

use crate::config::{AnalyzerConfig, RetryPolicy};
use crate::error::AnalyzeError;
use crate::output::AnalysisResponse;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A request to the analysis service, already rendered to a single user
/// message.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub model: String,
    pub message: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A successful reply from the transport.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub content: String,
    pub status: u16,
}

/// How a transport call failed. Determines retry behaviour.
#[derive(Debug, Clone)]
pub enum TransportFailure {
    /// Timeout, connection failure, 429, or 5xx. Retried.
    Transient { detail: String },
    /// Credential rejected (401/403). Never retried.
    Auth { detail: String },
    /// Any other failure the service will repeat deterministically
    /// (malformed request, unknown model). Not retried.
    Permanent { detail: String },
}

/// The wire boundary to the analysis service.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    async fn send(&self, request: &AnalysisRequest) -> Result<TransportReply, TransportFailure>;
}

// ── Chat-completions wire format ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// HTTP transport speaking the OpenAI-compatible chat-completions protocol
/// (OpenRouter and most gateways).
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, AnalyzeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalyzeError::Internal(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl AnalysisTransport for HttpTransport {
    async fn send(&self, request: &AnalysisRequest) -> Result<TransportReply, TransportFailure> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.message,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportFailure::Transient {
                detail: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure::Auth {
                detail: format!("HTTP {status}: {}", body.trim()),
            });
        }
        if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure::Transient {
                detail: format!("HTTP {status}: {}", body.trim()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportFailure::Permanent {
                detail: format!("HTTP {status}: {}", body.trim()),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| TransportFailure::Permanent {
                    detail: format!("malformed response envelope: {e}"),
                })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TransportFailure::Permanent {
                detail: "response contained no choices".to_string(),
            })?;

        Ok(TransportReply {
            content,
            status: status.as_u16(),
        })
    }
}

/// Retrying client over an [`AnalysisTransport`].
pub struct AnalysisClient {
    transport: Arc<dyn AnalysisTransport>,
    retry: RetryPolicy,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl AnalysisClient {
    /// Build a client from configuration, constructing the HTTP transport
    /// unless one was injected.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, AnalyzeError> {
        let transport: Arc<dyn AnalysisTransport> = match &config.transport {
            Some(t) => Arc::clone(t),
            None => {
                let key = config.api_key.as_deref().ok_or_else(|| {
                    AnalyzeError::InvalidConfig(
                        "an API key (or a custom transport) is required".into(),
                    )
                })?;
                Arc::new(HttpTransport::new(
                    key,
                    &config.api_base_url,
                    config.api_timeout_secs,
                )?)
            }
        };

        Ok(Self {
            transport,
            retry: config.retry,
            model: config.model.clone(),
            max_tokens: config.max_response_tokens,
            temperature: config.temperature,
        })
    }

    /// Send `message` to the analysis service, retrying transient failures
    /// with exponential backoff. Auth failures abort on the first attempt.
    pub async fn analyze_text(
        &self,
        message: String,
        progress: Option<&ProgressCallback>,
    ) -> Result<AnalysisResponse, AnalyzeError> {
        let request = AnalysisRequest {
            model: self.model.clone(),
            message,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let max_attempts = self.retry.max_attempts();

        for attempt in 1..=max_attempts {
            if let Some(cb) = progress {
                cb.on_request_attempt(attempt, max_attempts);
            }
            debug!("Analysis request attempt {}/{}", attempt, max_attempts);

            match self.transport.send(&request).await {
                Ok(reply) => {
                    return Ok(AnalysisResponse {
                        content: reply.content,
                        status: reply.status,
                        attempts: attempt,
                    });
                }
                Err(TransportFailure::Auth { detail }) => {
                    return Err(AnalyzeError::Auth { detail });
                }
                Err(TransportFailure::Permanent { detail }) => {
                    return Err(AnalyzeError::Transport {
                        attempts: attempt,
                        detail,
                    });
                }
                Err(TransportFailure::Transient { detail }) => {
                    if attempt == max_attempts {
                        return Err(AnalyzeError::Transport {
                            attempts: attempt,
                            detail,
                        });
                    }
                    let delay = self.retry.delay_before(attempt);
                    warn!(
                        "Analysis attempt {}/{} failed ({}); retrying in {:?}",
                        attempt, max_attempts, detail, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // Loop always returns; max_attempts >= 1.
        Err(AnalyzeError::Internal("retry loop exited unexpectedly".into()))
    }
}
