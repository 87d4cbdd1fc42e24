//! Conversation state and the per-stage result records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OperationKind, SafetyLevel};

/// One result row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub operation_kind: OperationKind,
    pub confidence: f64,
    pub reasoning: String,
    pub safety_level: SafetyLevel,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Classification {
    /// A successful classification; safety level and description follow the kind.
    pub fn new(operation_kind: OperationKind, confidence: f64, reasoning: impl Into<String>) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            operation_kind,
            confidence,
            reasoning: reasoning.into(),
            safety_level: operation_kind.safety_level(),
            description: operation_kind.description().to_string(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            reasoning: format!("Classification error: {error}"),
            error: Some(error),
            ..Self::new(OperationKind::Unknown, 0.0, "")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub description: String,
    pub tables_needed: BTreeSet<String>,
    pub columns_needed: BTreeSet<String>,
    pub conditions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Intent {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_complete: bool,
    pub needs_clarification: bool,
    pub missing_data: Vec<String>,
    pub clarification_questions: Vec<String>,
    pub notes: String,
    pub can_proceed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    /// Build a result whose derived flags agree with `is_complete`.
    pub fn from_completeness(is_complete: bool) -> Self {
        Self {
            is_complete,
            needs_clarification: !is_complete,
            can_proceed: is_complete,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::from_completeness(false)
        }
    }

    /// Force the request back to the user with a question, whatever the
    /// capability concluded.
    pub fn require(&mut self, missing: impl Into<String>, question: impl Into<String>) {
        self.is_complete = false;
        self.needs_clarification = true;
        self.can_proceed = false;
        let missing = missing.into();
        if !self.missing_data.contains(&missing) {
            self.missing_data.push(missing);
        }
        let question = question.into();
        if !self.clarification_questions.contains(&question) {
            self.clarification_questions.push(question);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub query_text: String,
    pub operation_kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedQuery {
    pub fn failed(operation_kind: OperationKind, error: impl Into<String>) -> Self {
        Self {
            query_text: String::new(),
            operation_kind,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub operation_kind: OperationKind,
    pub rows: Vec<Row>,
    pub column_names: Vec<String>,
    pub row_count: usize,
    pub affected_rows: u64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Result of a read: rows in backend order plus their column names.
    pub fn read(operation_kind: OperationKind, column_names: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            success: true,
            operation_kind,
            row_count: rows.len(),
            rows,
            column_names,
            affected_rows: 0,
            message: String::new(),
            error: None,
        }
    }

    /// Result of a write, with the confirmation message shown to the user.
    pub fn write(operation_kind: OperationKind, affected_rows: u64) -> Self {
        Self {
            success: true,
            operation_kind,
            rows: Vec::new(),
            column_names: Vec::new(),
            row_count: 0,
            affected_rows,
            message: format!(
                "{operation_kind} executed successfully. {affected_rows} rows affected."
            ),
            error: None,
        }
    }

    pub fn failed(operation_kind: OperationKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            operation_kind,
            rows: Vec::new(),
            column_names: Vec::new(),
            row_count: 0,
            affected_rows: 0,
            message: String::new(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

/// Everything the engine knows about one conversation thread.
///
/// The result fields describe the most recent pipeline run only; they are
/// cleared when a new run begins. `messages` accumulates across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub user_query: String,
    pub classification: Option<Classification>,
    pub intent: Option<Intent>,
    pub validation: Option<Validation>,
    pub generated_query: Option<GeneratedQuery>,
    pub execution_result: Option<ExecutionResult>,
    pub needs_clarification: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            user_query: String::new(),
            classification: None,
            intent: None,
            validation: None,
            generated_query: None,
            execution_result: None,
            needs_clarification: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a new pipeline run for `query`, dropping the previous run's results.
    pub fn begin_run(&mut self, query: impl Into<String>) {
        self.user_query = query.into();
        self.classification = None;
        self.intent = None;
        self.validation = None;
        self.generated_query = None;
        self.execution_result = None;
        self.needs_clarification = false;
        self.touch();
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Render the last `limit` messages, oldest first, one `Role: content` per line.
    pub fn conversation_context(&self, limit: usize) -> String {
        if self.messages.is_empty() || limit == 0 {
            return "No prior conversation.".to_string();
        }
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..]
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "User",
                    Role::Agent => "Agent",
                };
                format!("{role}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn last_agent_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Agent)
    }

    /// The operation kind of the current run, `Unknown` before classification.
    pub fn operation_kind(&self) -> OperationKind {
        self.classification
            .as_ref()
            .map(|c| c.operation_kind)
            .unwrap_or(OperationKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_clamps_confidence() {
        assert_eq!(Classification::new(OperationKind::Count, 1.7, "").confidence, 1.0);
        assert_eq!(Classification::new(OperationKind::Count, -0.2, "").confidence, 0.0);
        assert_eq!(Classification::new(OperationKind::Count, f64::NAN, "").confidence, 0.0);
    }

    #[test]
    fn failed_classification_is_unknown() {
        let c = Classification::failed("connection reset");
        assert_eq!(c.operation_kind, OperationKind::Unknown);
        assert_eq!(c.safety_level, SafetyLevel::Unknown);
        assert_eq!(c.error.as_deref(), Some("connection reset"));
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn validation_require_forces_clarification() {
        let mut v = Validation::from_completeness(true);
        assert!(v.can_proceed);
        v.require("Delete conditions", "Which records?");
        v.require("Delete conditions", "Which records?");
        assert!(!v.is_complete);
        assert!(v.needs_clarification);
        assert!(!v.can_proceed);
        assert_eq!(v.missing_data, vec!["Delete conditions".to_string()]);
        assert_eq!(v.clarification_questions.len(), 1);
    }

    #[test]
    fn write_result_message() {
        let r = ExecutionResult::write(OperationKind::Update, 3);
        assert!(r.success);
        assert_eq!(r.message, "UPDATE executed successfully. 3 rows affected.");
    }

    #[test]
    fn read_result_counts_rows() {
        let mut row = Row::new();
        row.insert("count".into(), serde_json::json!(5));
        let r = ExecutionResult::read(OperationKind::Count, vec!["count".into()], vec![row]);
        assert_eq!(r.row_count, 1);
        assert_eq!(r.rows[0]["count"], serde_json::json!(5));
    }

    #[test]
    fn begin_run_clears_results_but_keeps_messages() {
        let mut state = ConversationState::new("t");
        state.push_message(Message::user("hi"));
        state.classification = Some(Classification::new(OperationKind::Select, 0.9, "r"));
        state.needs_clarification = true;

        state.begin_run("next");
        assert_eq!(state.user_query, "next");
        assert!(state.classification.is_none());
        assert!(!state.needs_clarification);
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn conversation_context_keeps_chronological_order() {
        let mut state = ConversationState::new("t");
        assert_eq!(state.conversation_context(5), "No prior conversation.");
        for i in 0..4 {
            state.push_message(Message::user(format!("q{i}")));
            state.push_message(Message::agent(format!("a{i}")));
        }
        let ctx = state.conversation_context(3);
        assert_eq!(ctx, "Agent: a2\nUser: q3\nAgent: a3");
    }

    #[test]
    fn state_json_round_trip() {
        let mut state = ConversationState::new("thread-9");
        state.push_message(Message::user("How many users?"));
        state.begin_run("How many users?");
        let json = serde_json::to_string(&state).unwrap();
        let restored: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
