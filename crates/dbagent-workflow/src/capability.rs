//! The external collaborators a workflow run depends on.

use std::sync::Arc;

use async_trait::async_trait;
use dbagent_llm::{FinishReason, LlmClient, Request};
use dbagent_types::{AgentError, ExecutionResult, OperationKind, Result};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Free-text reasoning: one system prompt and one user prompt in, text out.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Produces the human-readable schema description embedded in prompts.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn describe(&self) -> Result<String>;
}

/// Runs one generated statement. Read kinds return rows, write kinds return
/// the affected-row count.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str, kind: OperationKind) -> Result<ExecutionResult>;
}

// ---------------------------------------------------------------------------
// LlmReasoner
// ---------------------------------------------------------------------------

/// [`Reasoner`] backed by an [`LlmClient`]. `model` may carry a provider
/// prefix such as `openai/gpt-4o`.
pub struct LlmReasoner {
    client: Arc<LlmClient>,
    model: String,
}

impl LlmReasoner {
    pub fn new(client: Arc<LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let response = self
            .client
            .complete(&Request::new(self.model.as_str(), system, user))
            .await?;
        if response.text.trim().is_empty() && response.finish_reason == FinishReason::ContentFilter
        {
            return Err(AgentError::CapabilityError {
                collaborator: "reasoner".into(),
                message: "response blocked by content filter".into(),
            });
        }
        Ok(response.text)
    }
}

// ---------------------------------------------------------------------------
// StaticSchema
// ---------------------------------------------------------------------------

/// A fixed schema description, for tests and for databases whose schema is
/// known ahead of time.
#[derive(Debug, Clone)]
pub struct StaticSchema(pub String);

impl StaticSchema {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }
}

#[async_trait]
impl SchemaSource for StaticSchema {
    async fn describe(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbagent_llm::{ProviderAdapter, Response, Usage};

    struct FixedProvider {
        text: &'static str,
        finish_reason: FinishReason,
    }

    #[async_trait]
    impl ProviderAdapter for FixedProvider {
        async fn complete(&self, request: &Request) -> Result<Response> {
            assert_eq!(request.messages.len(), 2);
            Ok(Response {
                id: "r".into(),
                text: self.text.into(),
                usage: Usage::default(),
                model: request.model.clone(),
                finish_reason: self.finish_reason,
            })
        }

        fn name(&self) -> &str {
            "openai"
        }

        fn default_model(&self) -> &str {
            "gpt-4o"
        }
    }

    #[tokio::test]
    async fn llm_reasoner_returns_text() {
        let mut client = LlmClient::new();
        client.register_provider(FixedProvider {
            text: "OPERATION: SELECT",
            finish_reason: FinishReason::EndTurn,
        });
        let reasoner = LlmReasoner::new(Arc::new(client), "openai/gpt-4o");
        assert_eq!(reasoner.model(), "openai/gpt-4o");
        let text = reasoner.complete("system", "user").await.unwrap();
        assert_eq!(text, "OPERATION: SELECT");
    }

    #[tokio::test]
    async fn llm_reasoner_rejects_filtered_empty_response() {
        let mut client = LlmClient::new();
        client.register_provider(FixedProvider {
            text: "",
            finish_reason: FinishReason::ContentFilter,
        });
        let reasoner = LlmReasoner::new(Arc::new(client), "gpt-4o");
        let err = reasoner.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("content filter"));
    }

    #[tokio::test]
    async fn static_schema_describes() {
        let schema = StaticSchema::new("Table: users");
        assert_eq!(schema.describe().await.unwrap(), "Table: users");
    }
}
