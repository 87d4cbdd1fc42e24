//! Deterministic collaborators for tests and dry runs.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dbagent_types::{AgentError, ExecutionResult, OperationKind, Result};

use crate::capability::{QueryExecutor, Reasoner, SchemaSource};

/// Phrases that identify which stage a system prompt belongs to.
pub mod markers {
    pub const CLASSIFY: &str = "You classify natural-language database requests";
    pub const INTENT: &str = "You analyze user intent";
    pub const VALIDATE: &str = "You validate whether this";
    pub const GENERATE: &str = "You are a SQL expert";
}

// ---------------------------------------------------------------------------
// ScriptedReasoner
// ---------------------------------------------------------------------------

enum Reply {
    Text(String),
    Fail(String),
    Delayed(Duration, String),
}

struct Rule {
    needle: String,
    reply: Reply,
}

/// Answers each call with the reply of the first rule whose needle occurs in
/// the system prompt. Every call is recorded.
#[derive(Default)]
pub struct ScriptedReasoner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Text(reply.into()),
        });
        self
    }

    /// Fail with a non-retryable provider error.
    pub fn fail_on(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Fail(message.into()),
        });
        self
    }

    pub fn delay_on(
        mut self,
        needle: impl Into<String>,
        delay: Duration,
        reply: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Delayed(delay, reply.into()),
        });
        self
    }

    /// `(system, user)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of calls whose system prompt contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(system, _)| system.contains(needle))
            .count()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system.to_string(), user.to_string()));

        let rule = self.rules.iter().find(|r| system.contains(&r.needle));
        match rule.map(|r| &r.reply) {
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail(message)) => Err(AgentError::ProviderError {
                provider: "scripted".into(),
                status: 0,
                message: message.clone(),
                retryable: false,
            }),
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
            None => Err(AgentError::CapabilityError {
                collaborator: "reasoner".into(),
                message: "no scripted reply for prompt".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingExecutor
// ---------------------------------------------------------------------------

/// Returns a fixed outcome and records every statement it is given.
pub struct RecordingExecutor {
    outcome: std::result::Result<ExecutionResult, String>,
    delay: Option<Duration>,
    executed: Mutex<Vec<(String, OperationKind)>>,
}

impl RecordingExecutor {
    pub fn returning(result: ExecutionResult) -> Self {
        Self {
            outcome: Ok(result),
            delay: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Fail every statement with a database error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            delay: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<(String, OperationKind)> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, query: &str, kind: OperationKind) -> Result<ExecutionResult> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((query.to_string(), kind));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(AgentError::Database(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// FailingSchema
// ---------------------------------------------------------------------------

/// A schema source that is always unavailable.
pub struct FailingSchema(pub String);

#[async_trait]
impl SchemaSource for FailingSchema {
    async fn describe(&self) -> Result<String> {
        Err(AgentError::CapabilityError {
            collaborator: "schema".into(),
            message: self.0.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts;
    use crate::stages::ValidationPolicy;
    use dbagent_types::Intent;

    #[test]
    fn markers_match_prompts() {
        assert!(prompts::classify_system("", "").contains(markers::CLASSIFY));
        assert!(prompts::intent_system("", OperationKind::Count, "").contains(markers::INTENT));
        for policy in [
            ValidationPolicy::Read,
            ValidationPolicy::Insert,
            ValidationPolicy::Update,
            ValidationPolicy::Delete,
        ] {
            assert!(prompts::validation_system(policy, "", &Intent::default(), "")
                .contains(markers::VALIDATE));
        }
        assert!(
            prompts::generate_system("", OperationKind::Select, &Intent::default(), "")
                .contains(markers::GENERATE)
        );
    }

    #[tokio::test]
    async fn scripted_reasoner_matches_first_rule_and_records() {
        let reasoner = ScriptedReasoner::new()
            .on("alpha", "first")
            .on("alp", "second")
            .fail_on("beta", "boom");

        assert_eq!(reasoner.complete("xx alpha", "u1").await.unwrap(), "first");
        let err = reasoner.complete("beta", "u2").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(!err.is_retryable());
        assert!(reasoner.complete("gamma", "u3").await.is_err());

        assert_eq!(reasoner.call_count(), 3);
        assert_eq!(reasoner.calls_matching("alpha"), 1);
        assert_eq!(reasoner.calls()[1].1, "u2");
    }

    #[tokio::test]
    async fn recording_executor_records_statements() {
        let executor = RecordingExecutor::returning(ExecutionResult::write(OperationKind::Insert, 1));
        let result = executor
            .execute("INSERT INTO t VALUES (1)", OperationKind::Insert)
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(
            executor.executed(),
            vec![("INSERT INTO t VALUES (1)".to_string(), OperationKind::Insert)]
        );

        let failing = RecordingExecutor::failing("no such table: t");
        let err = failing.execute("SELECT 1", OperationKind::Select).await.unwrap_err();
        assert_eq!(err.to_string(), "Database error: no such table: t");
    }
}
