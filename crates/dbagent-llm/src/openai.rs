use async_trait::async_trait;
use dbagent_types::AgentError;
use serde_json::json;

use crate::provider::{malformed_body, map_http_error, transport_error};
use crate::{FinishReason, ProviderAdapter, Request, Response, Usage};

const PROVIDER: &str = "openai";

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

/// Chat Completions client.
#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, AgentError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| AgentError::AuthError {
            provider: PROVIDER.into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<Response, AgentError> {
        let choice = body["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| malformed_body(PROVIDER, 200, "Response has no choices"))?;

        let finish_reason = match choice["finish_reason"].as_str() {
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::EndTurn,
        };

        let usage_obj = &body["usage"];
        let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
        let usage = Usage {
            input_tokens,
            output_tokens,
            total_tokens: usage_obj["total_tokens"]
                .as_u64()
                .unwrap_or(input_tokens + output_tokens),
        };

        Ok(Response {
            id: body["id"].as_str().unwrap_or("").to_string(),
            text: choice["message"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
            usage,
            model: body["model"].as_str().unwrap_or("").to_string(),
            finish_reason,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, AgentError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status().as_u16();
        let response_body = resp.text().await.map_err(|e| transport_error(PROVIDER, e))?;

        if !(200..300).contains(&status) {
            return Err(map_http_error(PROVIDER, status, &response_body));
        }

        let json: serde_json::Value = serde_json::from_str(&response_body).map_err(|e| {
            malformed_body(PROVIDER, status, format!("Failed to parse response JSON: {e}"))
        })?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_maps_messages_in_order() {
        let adapter = OpenAiAdapter::new("sk-test".into());
        let req = Request::new("gpt-4o-mini", "Classify.", "Delete user 3");
        let body = adapter.build_request_body(&req);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Classify.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn build_body_falls_back_to_default_model() {
        let adapter = OpenAiAdapter::new("sk-test".into());
        let req = Request::new("", "s", "u");
        assert_eq!(adapter.build_request_body(&req)["model"], "gpt-4o");
    }

    #[test]
    fn parse_chat_completion() {
        let adapter = OpenAiAdapter::new("sk-test".into());
        let body = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "message": {"role": "assistant", "content": "OPERATION: COUNT"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 40, "completion_tokens": 6, "total_tokens": 46}
        });
        let resp = adapter.parse_response(body).unwrap();
        assert_eq!(resp.id, "chatcmpl-1");
        assert_eq!(resp.text, "OPERATION: COUNT");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
        assert_eq!(resp.usage.input_tokens, 40);
        assert_eq!(resp.usage.total_tokens, 46);
    }

    #[test]
    fn parse_truncated_completion() {
        let adapter = OpenAiAdapter::new("sk-test".into());
        let body = json!({
            "choices": [{"message": {"content": "SELECT"}, "finish_reason": "length"}]
        });
        let resp = adapter.parse_response(body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::MaxTokens);
        assert_eq!(resp.usage.total_tokens, 0);
    }

    #[test]
    fn parse_without_choices_is_error() {
        let adapter = OpenAiAdapter::new("sk-test".into());
        let err = adapter.parse_response(json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
