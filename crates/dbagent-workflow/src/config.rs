use std::time::Duration;

use crate::retry::BackoffPolicy;

/// Tunables for a [`WorkflowEngine`](crate::WorkflowEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of most recent messages rendered into the classification prompt.
    pub context_window: usize,
    /// Upper bound on one reasoning call, retries included.
    pub reasoning_timeout: Duration,
    pub schema_timeout: Duration,
    pub execution_timeout: Duration,
    /// Retries for transient provider errors (rate limits, 5xx).
    pub max_retries: usize,
    pub backoff: BackoffPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window: 5,
            reasoning_timeout: Duration::from_secs(60),
            schema_timeout: Duration::from_secs(10),
            execution_timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_context_window(mut self, messages: usize) -> Self {
        self.context_window = messages;
        self
    }

    pub fn with_reasoning_timeout(mut self, timeout: Duration) -> Self {
        self.reasoning_timeout = timeout;
        self
    }

    pub fn with_schema_timeout(mut self, timeout: Duration) -> Self {
        self.schema_timeout = timeout;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: usize, backoff: BackoffPolicy) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }
}
