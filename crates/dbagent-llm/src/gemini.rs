use async_trait::async_trait;
use dbagent_types::AgentError;
use serde_json::json;

use crate::provider::{malformed_body, map_http_error, transport_error};
use crate::{FinishReason, ProviderAdapter, Request, Response, Role, Usage};

const PROVIDER: &str = "gemini";

// ---------------------------------------------------------------------------
// GeminiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            default_model: "gemini-2.5-flash".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn from_env() -> Result<Self, AgentError> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| AgentError::AuthError {
                provider: PROVIDER.into(),
            })?;
        Ok(Self::new(key))
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        // System turns go to systemInstruction; Gemini has no system role.
        let system_parts: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| json!({ "text": m.content }))
            .collect();

        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }

        let mut gen_config = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            gen_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(temp) = request.temperature {
            gen_config.insert("temperature".into(), json!(temp));
        }
        if !gen_config.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(gen_config);
        }
        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Response, AgentError> {
        let candidate = json["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| malformed_body(PROVIDER, 200, "Missing candidates in response"))?;

        let finish_reason = match candidate["finishReason"].as_str() {
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
            Some("STOP_SEQUENCE") => FinishReason::StopSequence,
            _ => FinishReason::EndTurn,
        };

        let text = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage_meta = &json["usageMetadata"];
        let input_tokens = usage_meta["promptTokenCount"].as_u64().unwrap_or(0);
        let output_tokens = usage_meta["candidatesTokenCount"].as_u64().unwrap_or(0);
        let usage = Usage {
            input_tokens,
            output_tokens,
            total_tokens: usage_meta["totalTokenCount"]
                .as_u64()
                .unwrap_or(input_tokens + output_tokens),
        };

        Ok(Response {
            id: json["responseId"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            text,
            usage,
            model: json["modelVersion"].as_str().unwrap_or("").to_string(),
            finish_reason,
        })
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, AgentError> {
        let body = self.build_request_body(request);
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let resp = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
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

        let mut response = self.parse_response(json)?;
        if response.model.is_empty() {
            response.model = model.to_string();
        }
        Ok(response)
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
    fn default_model_is_flash() {
        let adapter = GeminiAdapter::new("key".into());
        assert_eq!(adapter.default_model(), "gemini-2.5-flash");
        assert_eq!(adapter.name(), "gemini");
    }

    #[test]
    fn system_message_moves_to_system_instruction() {
        let adapter = GeminiAdapter::new("key".into());
        let req = Request::new("gemini-2.5-flash", "Be terse.", "List products");
        let body = adapter.build_request_body(&req);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be terse.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "List products");
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn parse_joins_text_parts() {
        let adapter = GeminiAdapter::new("key".into());
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "INTENT: count"}, {"text": "\nTABLES: users"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 8},
            "modelVersion": "gemini-2.5-flash"
        });
        let resp = adapter.parse_response(body).unwrap();
        assert_eq!(resp.text, "INTENT: count\nTABLES: users");
        assert_eq!(resp.usage.total_tokens, 20);
        assert_eq!(resp.model, "gemini-2.5-flash");
        assert_eq!(resp.finish_reason, FinishReason::EndTurn);
    }

    #[test]
    fn parse_safety_block() {
        let adapter = GeminiAdapter::new("key".into());
        let body = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let resp = adapter.parse_response(body).unwrap();
        assert_eq!(resp.finish_reason, FinishReason::ContentFilter);
        assert_eq!(resp.text, "");
    }

    #[test]
    fn parse_missing_candidates_is_error() {
        let adapter = GeminiAdapter::new("key".into());
        assert!(adapter.parse_response(json!({})).is_err());
    }
}
