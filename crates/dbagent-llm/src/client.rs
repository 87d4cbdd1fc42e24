use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dbagent_types::AgentError;

use crate::{DynProvider, ProviderAdapter, Request, Response};

/// Model used when `MODEL_NAME` is unset.
pub const DEFAULT_MODEL: &str = "gemini/gemini-2.5-flash";

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::debug!(
            model = %request.model,
            provider = request.provider.as_deref().unwrap_or("auto"),
            prompt_chars = request.messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "LLM request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

/// Accumulates token usage across requests. Clones share the same counters,
/// so one clone can be installed on the client and another kept for reporting.
#[derive(Clone, Default)]
pub struct CostTrackingMiddleware {
    requests: Arc<AtomicU64>,
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
}

impl CostTrackingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }
}

impl Middleware for CostTrackingMiddleware {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// ModelCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub context_window: usize,
}

pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        let mut models = HashMap::new();
        for (id, provider, context_window) in [
            ("gpt-4o", "openai", 128_000),
            ("gpt-4o-mini", "openai", 128_000),
            ("gpt-4.1", "openai", 1_000_000),
            ("gpt-4.1-mini", "openai", 1_000_000),
            ("gemini-2.5-pro", "gemini", 1_000_000),
            ("gemini-2.5-flash", "gemini", 1_000_000),
            ("gemini-2.0-flash", "gemini", 1_000_000),
        ] {
            models.insert(
                id.to_string(),
                ModelInfo {
                    id: id.to_string(),
                    provider: provider.to_string(),
                    context_window,
                },
            );
        }
        Self { models }
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn provider_for_model(&self, model: &str) -> Option<&str> {
        self.models.get(model).map(|m| m.provider.as_str())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `provider/model` into its parts. Bare names have no provider.
pub fn split_model_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            (Some(provider), model)
        }
        _ => (None, name),
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

pub struct LlmClient {
    providers: HashMap<String, DynProvider>,
    model_catalog: ModelCatalog,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            model_catalog: ModelCatalog::new(),
            middleware: Vec::new(),
        }
    }

    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn model_catalog(&self) -> &ModelCatalog {
        &self.model_catalog
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, AgentError> {
        let mut req = request.clone();
        if req.provider.is_none() {
            if let (Some(provider), model) = split_model_name(&request.model) {
                req.provider = Some(provider.to_string());
                req.model = model.to_string();
            }
        }
        let provider = self.resolve_provider(&req)?;

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = provider.complete(&req).await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    fn resolve_provider(&self, request: &Request) -> Result<&DynProvider, AgentError> {
        // 1. Explicit provider
        if let Some(ref provider_name) = request.provider {
            return self.providers.get(provider_name).ok_or_else(|| {
                AgentError::Other(format!("Provider '{provider_name}' not registered"))
            });
        }

        // 2. Model catalog
        if let Some(provider_name) = self.model_catalog.provider_for_model(&request.model) {
            if let Some(provider) = self.providers.get(provider_name) {
                return Ok(provider);
            }
        }

        // 3. Any registered provider, in name order so the choice is stable
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        names
            .first()
            .and_then(|name| self.providers.get(*name))
            .ok_or_else(|| AgentError::Other("No providers registered".to_string()))
    }

    /// Register every provider whose API key is present in the environment.
    pub fn from_env() -> Result<Self, AgentError> {
        let mut client = Self::new();
        let mut found_any = false;

        if let Ok(adapter) = crate::OpenAiAdapter::from_env() {
            client.register_provider(adapter);
            found_any = true;
        }

        if let Ok(adapter) = crate::GeminiAdapter::from_env() {
            client.register_provider(adapter);
            found_any = true;
        }

        if !found_any {
            return Err(AgentError::Other(
                "No LLM provider API keys found in environment \
                 (set OPENAI_API_KEY or GEMINI_API_KEY)"
                    .to_string(),
            ));
        }

        Ok(client)
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `MODEL_NAME` from the environment, or [`DEFAULT_MODEL`].
pub fn model_name_from_env() -> String {
    std::env::var("MODEL_NAME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}
