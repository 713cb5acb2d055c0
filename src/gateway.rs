//! Per-role AI invocation with bounded retry.
//!
//! The gateway builds the role prompt, submits it to an injected
//! inference backend, and parses the reply as a structured
//! `ExecutiveAnalysis`. Transient failures (network, non-2xx, timeout,
//! malformed content) each consume one attempt; when the budget is
//! exhausted the error is attributed to that role alone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::{ExecutiveAnalysis, Role};
use crate::prompt;

/// Chat request sent to the inference backend.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// One message in the chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat response returned by the inference backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: String,
}

/// Boundary to the external inference service. Injected at composition
/// time; tests swap in mocks.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// HTTP implementation speaking the chat-completions wire shape.
pub struct HttpInferenceBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpInferenceBackend {
    pub fn new(url: String, api_key: Option<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!("request timed out")
            } else if e.is_connect() {
                anyhow!("cannot connect to inference backend at {}", self.url)
            } else {
                anyhow!("failed to send request: {e}")
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("inference backend error {status}: {body}"));
        }

        response
            .json::<ChatResponse>()
            .await
            .context("failed to parse backend response")
    }
}

/// Retry and timeout settings for one role invocation.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub model: String,
    pub temperature: f32,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Per-attempt cancellation boundary.
    pub attempt_timeout: Duration,
    /// Pause between attempts; avoids tight-loop retry.
    pub retry_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_retries: 2,
            attempt_timeout: Duration::from_secs(120),
            retry_delay: Duration::from_millis(500),
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a senior business analyst. \
Answer only with the JSON object the instructions describe.";

/// Invokes the inference backend for one role, with bounded retry.
#[derive(Clone)]
pub struct AnalysisGateway {
    backend: Arc<dyn InferenceBackend>,
    config: GatewayConfig,
}

impl AnalysisGateway {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: GatewayConfig) -> Self {
        Self { backend, config }
    }

    /// Run one role's analysis of `content`.
    ///
    /// Fails with `AnalysisFailed` once the retry budget is exhausted;
    /// the error names the role and the last attempt's reason.
    pub async fn invoke(
        &self,
        role: Role,
        content: &str,
    ) -> Result<ExecutiveAnalysis, PipelineError> {
        let prompt = prompt::build(content, role)?;
        let attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(role, &prompt).await {
                Ok(analysis) => {
                    debug!(%role, attempt, "role analysis succeeded");
                    return Ok(analysis);
                }
                Err(err) => {
                    warn!(%role, attempt, attempts, error = %err, "role analysis attempt failed");
                    last_error = err.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(PipelineError::AnalysisFailed {
            role,
            reason: format!("{attempts} attempts exhausted; last error: {last_error}"),
        })
    }

    async fn attempt(&self, role: Role, prompt: &str) -> Result<ExecutiveAnalysis> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
        };

        let response = tokio::time::timeout(self.config.attempt_timeout, self.backend.complete(request))
            .await
            .map_err(|_| {
                anyhow!(
                    "attempt timed out after {}s",
                    self.config.attempt_timeout.as_secs()
                )
            })??;

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| anyhow!("backend returned no choices"))?;

        let mut analysis: ExecutiveAnalysis = serde_json::from_str(content.trim())
            .with_context(|| format!("backend content is not valid analysis JSON: {content}"))?;
        analysis.role = role;

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock backend scripted with a sequence of replies; each call
    /// consumes the next one.
    struct ScriptedBackend {
        replies: Vec<Result<String, String>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let reply = self
                .replies
                .get(index)
                .cloned()
                .unwrap_or(Err("script exhausted".to_string()));

            match reply {
                Ok(content) => Ok(ChatResponse {
                    choices: vec![Choice {
                        message: ChoiceMessage { content },
                    }],
                }),
                Err(message) => Err(anyhow!(message)),
            }
        }
    }

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            retry_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
            ..GatewayConfig::default()
        }
    }

    fn valid_reply() -> String {
        r#"{"analysis": "Solid quarter.", "keyInsights": ["Margins improved"], "recommendations": ["Keep pricing"]}"#
            .to_string()
    }

    #[tokio::test]
    async fn test_success_stamps_role() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(valid_reply())]));
        let gateway = AnalysisGateway::new(backend.clone(), fast_config());

        let analysis = gateway.invoke(Role::Cmo, "quarterly data").await.unwrap();
        assert_eq!(analysis.role, Role::Cmo);
        assert_eq!(analysis.key_insights, vec!["Margins improved"]);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err("connection reset".to_string()),
            Ok(valid_reply()),
        ]));
        let gateway = AnalysisGateway::new(backend.clone(), fast_config());

        let analysis = gateway.invoke(Role::Cfo, "quarterly data").await.unwrap();
        assert_eq!(analysis.role, Role::Cfo);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_content_consumes_attempts() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("not json at all".to_string()),
            Ok("{\"broken\": true".to_string()),
            Ok(valid_reply()),
        ]));
        let gateway = AnalysisGateway::new(backend.clone(), fast_config());

        let analysis = gateway.invoke(Role::Coo, "quarterly data").await.unwrap();
        assert_eq!(analysis.analysis, "Solid quarter.");
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_names_the_role() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err("503".to_string()),
            Err("503".to_string()),
            Err("503".to_string()),
        ]));
        let gateway = AnalysisGateway::new(backend.clone(), fast_config());

        let err = gateway.invoke(Role::Cmo, "quarterly data").await.unwrap_err();
        match err {
            PipelineError::AnalysisFailed { role, reason } => {
                assert_eq!(role, Role::Cmo);
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Default budget: first attempt + 2 retries.
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_content_fails_before_any_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(valid_reply())]));
        let gateway = AnalysisGateway::new(backend.clone(), fast_config());

        let err = gateway.invoke(Role::Cfo, "  ").await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_backend_hits_attempt_timeout() {
        struct StalledBackend;

        #[async_trait]
        impl InferenceBackend for StalledBackend {
            async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                unreachable!("timeout should cancel the attempt")
            }
        }

        let config = GatewayConfig {
            max_retries: 0,
            attempt_timeout: Duration::from_millis(20),
            retry_delay: Duration::from_millis(1),
            ..GatewayConfig::default()
        };
        let gateway = AnalysisGateway::new(Arc::new(StalledBackend), config);

        let err = gateway.invoke(Role::Coo, "quarterly data").await.unwrap_err();
        match err {
            PipelineError::AnalysisFailed { reason, .. } => {
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
