//! The six pipeline stages.
//!
//! Each stage reads a narrow input struct built from the conversation state
//! and returns a [`StageOutput`] that fills exactly one slot. Stages never
//! return `Err`: failures are written into the output's `error` field and
//! reported as an [`ErrorKind`] next to it.

mod clarify;
mod classify;
mod execute;
mod generate;
mod intent;
mod validate;

use std::sync::Arc;

use dbagent_types::{
    AgentError, Classification, ConversationState, ErrorKind, ExecutionResult, GeneratedQuery,
    Intent, Message, OperationKind, Result, Validation,
};

use crate::capability::{QueryExecutor, Reasoner, SchemaSource};
use crate::config::EngineConfig;
use crate::retry::with_retry;

pub use clarify::{clarification_message, ClarifyInput};
pub use classify::{parse_classification, ClassifyInput};
pub use execute::ExecuteInput;
pub use generate::GenerateInput;
pub use intent::{parse_intent, IntentInput};
pub use validate::{has_row_predicate, is_broad, parse_validation, ValidateInput, ValidationPolicy};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Classify,
    AnalyzeIntent,
    Validate,
    GenerateQuery,
    Execute,
    RequestClarification,
}

impl Stage {
    /// Stages every run goes through before routing.
    pub const PREFIX: [Stage; 3] = [Stage::Classify, Stage::AnalyzeIntent, Stage::Validate];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::AnalyzeIntent => "analyze_intent",
            Stage::Validate => "validate",
            Stage::GenerateQuery => "generate_query",
            Stage::Execute => "execute",
            Stage::RequestClarification => "request_clarification",
        }
    }

    pub async fn run(&self, state: &ConversationState, ctx: &StageContext) -> StageRun {
        match self {
            Stage::Classify => {
                classify::run(ClassifyInput::from_state(state, ctx.config.context_window), ctx)
                    .await
            }
            Stage::AnalyzeIntent => intent::run(IntentInput::from_state(state), ctx).await,
            Stage::Validate => validate::run(ValidateInput::from_state(state), ctx).await,
            Stage::GenerateQuery => generate::run(GenerateInput::from_state(state), ctx).await,
            Stage::Execute => execute::run(ExecuteInput::from_state(state), ctx).await,
            Stage::RequestClarification => clarify::run(ClarifyInput::from_state(state)),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// StageOutput / StageRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Classification(Classification),
    Intent(Intent),
    Validation(Validation),
    GeneratedQuery(GeneratedQuery),
    Execution(ExecutionResult),
    /// The agent's question back to the user.
    Clarification(String),
}

impl StageOutput {
    /// Merge into the state. Only the slot belonging to this output changes.
    pub fn apply(self, state: &mut ConversationState) {
        match self {
            StageOutput::Classification(c) => state.classification = Some(c),
            StageOutput::Intent(i) => state.intent = Some(i),
            StageOutput::Validation(v) => {
                state.needs_clarification = v.needs_clarification;
                state.validation = Some(v);
            }
            StageOutput::GeneratedQuery(q) => state.generated_query = Some(q),
            StageOutput::Execution(r) => state.execution_result = Some(r),
            StageOutput::Clarification(message) => {
                state.needs_clarification = true;
                state.push_message(Message::agent(message));
            }
        }
        state.touch();
    }

    /// The `error` carried by the output, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            StageOutput::Classification(c) => c.error.as_deref(),
            StageOutput::Intent(i) => i.error.as_deref(),
            StageOutput::Validation(v) => v.error.as_deref(),
            StageOutput::GeneratedQuery(q) => q.error.as_deref(),
            StageOutput::Execution(r) => r.error.as_deref(),
            StageOutput::Clarification(_) => None,
        }
    }
}

/// What a stage produced, plus the taxonomy of its failure when it had one.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun {
    pub output: StageOutput,
    pub failure: Option<ErrorKind>,
}

impl StageRun {
    pub fn ok(output: StageOutput) -> Self {
        Self {
            output,
            failure: None,
        }
    }

    pub fn failed(output: StageOutput, kind: ErrorKind) -> Self {
        Self {
            output,
            failure: Some(kind),
        }
    }

    /// Failure classified from an [`AgentError`]; infrastructure errors count
    /// as capability failures here.
    pub fn from_error(output: StageOutput, err: &AgentError) -> Self {
        Self::failed(output, err.kind().unwrap_or(ErrorKind::CapabilityError))
    }
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// Collaborators and limits shared by all stages of an engine.
#[derive(Clone)]
pub struct StageContext {
    pub reasoner: Arc<dyn Reasoner>,
    pub schema: Arc<dyn SchemaSource>,
    pub executor: Arc<dyn QueryExecutor>,
    pub config: EngineConfig,
}

impl StageContext {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        schema: Arc<dyn SchemaSource>,
        executor: Arc<dyn QueryExecutor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            reasoner,
            schema,
            executor,
            config,
        }
    }

    /// One reasoning call, retried on transient errors and bounded by the
    /// reasoning timeout as a whole.
    pub async fn reason(&self, stage: Stage, system: &str, user: &str) -> Result<String> {
        let timeout = self.config.reasoning_timeout;
        let call = with_retry(
            || self.reasoner.complete(system, user),
            self.config.max_retries,
            &self.config.backoff,
            stage.name(),
        );
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::CapabilityTimeout {
                collaborator: "reasoner".into(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    pub async fn schema(&self) -> Result<String> {
        let timeout = self.config.schema_timeout;
        match tokio::time::timeout(timeout, self.schema.describe()).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::CapabilityTimeout {
                collaborator: "schema".into(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Run a statement. Never retried, since writes are not idempotent.
    pub async fn execute(&self, query: &str, kind: OperationKind) -> Result<ExecutionResult> {
        let timeout = self.config.execution_timeout;
        match tokio::time::timeout(timeout, self.executor.execute(query, kind)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::CapabilityTimeout {
                collaborator: "executor".into(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Context over a scripted reasoner, a one-table schema, and an executor
/// that reports one affected row.
#[cfg(test)]
pub(crate) fn test_context(reasoner: crate::testing::ScriptedReasoner) -> StageContext {
    use crate::capability::StaticSchema;
    use crate::retry::BackoffPolicy;
    use crate::testing::RecordingExecutor;

    StageContext::new(
        Arc::new(reasoner),
        Arc::new(StaticSchema::new(
            "Table: users\n  - id (INTEGER) NOT NULL\n  - name (VARCHAR(100)) NOT NULL",
        )),
        Arc::new(RecordingExecutor::returning(ExecutionResult::write(
            OperationKind::Update,
            1,
        ))),
        EngineConfig::default().with_retries(0, BackoffPolicy::None),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_fills_only_its_slot() {
        let mut state = ConversationState::new("t");
        StageOutput::Classification(Classification::new(OperationKind::Count, 0.9, "r"))
            .apply(&mut state);
        assert!(state.classification.is_some());
        assert!(state.intent.is_none());
        assert!(state.validation.is_none());
        assert!(state.generated_query.is_none());
        assert!(state.execution_result.is_none());
        assert!(state.messages.is_empty());
    }

    #[test]
    fn validation_output_sets_needs_clarification() {
        let mut state = ConversationState::new("t");
        StageOutput::Validation(Validation::from_completeness(false)).apply(&mut state);
        assert!(state.needs_clarification);
        StageOutput::Validation(Validation::from_completeness(true)).apply(&mut state);
        assert!(!state.needs_clarification);
    }

    #[test]
    fn clarification_appends_agent_message() {
        let mut state = ConversationState::new("t");
        state.push_message(Message::user("Delete all orders"));
        StageOutput::Clarification("Which orders?".into()).apply(&mut state);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(
            state.last_agent_message().map(|m| m.content.as_str()),
            Some("Which orders?")
        );
        assert!(state.needs_clarification);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::AnalyzeIntent.name(), "analyze_intent");
        assert_eq!(Stage::RequestClarification.to_string(), "request_clarification");
        assert_eq!(
            Stage::PREFIX,
            [Stage::Classify, Stage::AnalyzeIntent, Stage::Validate]
        );
    }

    #[test]
    fn from_error_maps_kind() {
        let run = StageRun::from_error(
            StageOutput::Intent(Intent::failed("bad")),
            &AgentError::ParseError {
                stage: "analyze_intent".into(),
                message: "bad".into(),
            },
        );
        assert_eq!(run.failure, Some(ErrorKind::ParseError));
        assert_eq!(run.output.error(), Some("bad"));

        let run = StageRun::from_error(
            StageOutput::Intent(Intent::failed("disk")),
            &AgentError::Store("disk".into()),
        );
        assert_eq!(run.failure, Some(ErrorKind::CapabilityError));
    }
}
