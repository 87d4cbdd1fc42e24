use async_trait::async_trait;
use dbagent_types::AgentError;

use crate::{Request, Response};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response, AgentError>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, AgentError> {
        self.0.complete(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }
}

// ---------------------------------------------------------------------------
// HTTP error mapping shared by the adapters
// ---------------------------------------------------------------------------

pub(crate) fn map_http_error(provider: &str, status: u16, body: &str) -> AgentError {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());

    match status {
        429 => {
            let retry_after_ms = parsed
                .as_ref()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            AgentError::RateLimited {
                provider: provider.into(),
                retry_after_ms,
            }
        }
        401 | 403 => AgentError::AuthError {
            provider: provider.into(),
        },
        500 | 502 | 503 | 504 => AgentError::ProviderError {
            provider: provider.into(),
            status,
            message,
            retryable: true,
        },
        _ => AgentError::ProviderError {
            provider: provider.into(),
            status,
            message,
            retryable: false,
        },
    }
}

/// Transport failures (connect, read) are worth retrying.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        return AgentError::RequestTimeout {
            provider: provider.into(),
            timeout_ms: 0,
        };
    }
    AgentError::ProviderError {
        provider: provider.into(),
        status: 0,
        message: err.to_string(),
        retryable: true,
    }
}

pub(crate) fn malformed_body(provider: &str, status: u16, message: impl Into<String>) -> AgentError {
    AgentError::ProviderError {
        provider: provider.into(),
        status,
        message: message.into(),
        retryable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Usage};

    struct MockProvider;

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, AgentError> {
            Ok(Response {
                id: "mock-resp-1".into(),
                text: format!("echo: {}", request.messages.len()),
                usage: Usage::default(),
                model: "mock-model".into(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }
    }

    #[tokio::test]
    async fn dyn_provider_complete() {
        let provider = DynProvider::new(MockProvider);
        let req = Request::new("mock-model", "sys", "hi");
        let resp = provider.complete(&req).await.unwrap();
        assert_eq!(resp.id, "mock-resp-1");
        assert_eq!(resp.text, "echo: 2");
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.default_model(), "mock-model");
    }

    #[test]
    fn map_http_error_rate_limit_reads_retry_after() {
        let body = r#"{"error": {"message": "slow down", "retry_after": 2.5}}"#;
        match map_http_error("openai", 429, body) {
            AgentError::RateLimited {
                provider,
                retry_after_ms,
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(retry_after_ms, 2500);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn map_http_error_auth_and_server() {
        assert!(matches!(
            map_http_error("gemini", 403, ""),
            AgentError::AuthError { .. }
        ));
        let err = map_http_error("gemini", 503, r#"{"error": {"message": "overloaded"}}"#);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn map_http_error_bad_request_keeps_raw_body() {
        let err = map_http_error("openai", 400, "not json");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("not json"));
    }
}
