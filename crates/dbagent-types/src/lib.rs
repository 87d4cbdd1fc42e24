//! Shared types, errors, and conversation state for the dbagent workflow engine.
//!
//! This crate provides the foundational types used across all other dbagent crates:
//! - `AgentError`: unified error taxonomy, with `ErrorKind` as its coarse classification
//! - `OperationKind` / `SafetyLevel`: the closed set of database operations
//! - `ConversationState`: the per-thread record threaded through the pipeline
//! - Stage result records (`Classification`, `Intent`, `Validation`, ...)

mod operation;
mod state;

pub use operation::{OperationKind, SafetyLevel};
pub use state::{
    Classification, ConversationState, ExecutionResult, GeneratedQuery, Intent, Message, Role,
    Row, Validation,
};

use serde::{Deserialize, Serialize};

/// Unified error type for all dbagent subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout {
        provider: String,
        timeout_ms: u64,
    },

    // === Collaborator Errors ===
    #[error("{collaborator} failed: {message}")]
    CapabilityError {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} timed out after {timeout_ms}ms")]
    CapabilityTimeout {
        collaborator: String,
        timeout_ms: u64,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to parse {stage} response: {message}")]
    ParseError { stage: String, message: String },

    // === Workflow Errors ===
    #[error("Validation incomplete: {0}")]
    ValidationFailure(String),

    #[error("No conversation found for thread '{thread_id}'")]
    NoConversation { thread_id: String },

    /// The display form is the bare reason, since it is copied verbatim into
    /// the skipped stage's `error` field.
    #[error("{reason}")]
    StageSkipped { stage: String, reason: String },

    #[error("State store error: {0}")]
    Store(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`AgentError`], as seen by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A reasoning, schema, or execution collaborator failed (timeouts included).
    CapabilityError,
    /// The reasoning capability answered, but not in the expected format.
    ParseError,
    /// A validation policy found the request incomplete. A normal outcome.
    ValidationFailure,
    /// `resume` was called for a thread that has no stored state.
    NoConversation,
    /// An upstream error made a stage short-circuit without doing work.
    StageSkipped,
}

impl AgentError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::RateLimited { .. }
                | AgentError::RequestTimeout { .. }
                | AgentError::CapabilityTimeout { .. }
                | AgentError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentError::AuthError { .. } | AgentError::NoConversation { .. }
        )
    }

    /// Map the error onto the workflow taxonomy. Infrastructure errors
    /// (store, IO, JSON) have no workflow kind.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AgentError::ProviderError { .. }
            | AgentError::RateLimited { .. }
            | AgentError::AuthError { .. }
            | AgentError::RequestTimeout { .. }
            | AgentError::CapabilityError { .. }
            | AgentError::CapabilityTimeout { .. }
            | AgentError::Database(_) => Some(ErrorKind::CapabilityError),
            AgentError::ParseError { .. } => Some(ErrorKind::ParseError),
            AgentError::ValidationFailure(_) => Some(ErrorKind::ValidationFailure),
            AgentError::NoConversation { .. } => Some(ErrorKind::NoConversation),
            AgentError::StageSkipped { .. } => Some(ErrorKind::StageSkipped),
            AgentError::Store(_) | AgentError::Io(_) | AgentError::Json(_) | AgentError::Other(_) => {
                None
            }
        }
    }
}

/// A convenience alias for `Result<T, AgentError>`.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = AgentError::ProviderError {
            provider: "openai".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_no_conversation() {
        let err = AgentError::NoConversation {
            thread_id: "t-1".into(),
        };
        assert_eq!(err.to_string(), "No conversation found for thread 't-1'");
    }

    #[test]
    fn error_display_stage_skipped_is_bare_reason() {
        let err = AgentError::StageSkipped {
            stage: "analyze_intent".into(),
            reason: "Classification failed".into(),
        };
        assert_eq!(err.to_string(), "Classification failed");
    }

    #[test]
    fn error_display_capability_timeout() {
        let err = AgentError::CapabilityTimeout {
            collaborator: "reasoner".into(),
            timeout_ms: 1500,
        };
        assert_eq!(err.to_string(), "reasoner timed out after 1500ms");
    }

    #[test]
    fn retryable_errors() {
        assert!(AgentError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 10,
        }
        .is_retryable());
        assert!(AgentError::CapabilityTimeout {
            collaborator: "x".into(),
            timeout_ms: 10,
        }
        .is_retryable());
        assert!(!AgentError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad".into(),
            retryable: false,
        }
        .is_retryable());
    }

    #[test]
    fn terminal_errors() {
        assert!(AgentError::AuthError {
            provider: "x".into()
        }
        .is_terminal());
        assert!(AgentError::NoConversation {
            thread_id: "t".into()
        }
        .is_terminal());
        assert!(!AgentError::Database("locked".into()).is_terminal());
    }

    #[test]
    fn kind_maps_collaborator_failures_to_capability_error() {
        let cases = [
            AgentError::AuthError {
                provider: "x".into(),
            },
            AgentError::RequestTimeout {
                provider: "x".into(),
                timeout_ms: 1,
            },
            AgentError::Database("no such table".into()),
            AgentError::CapabilityError {
                collaborator: "schema".into(),
                message: "down".into(),
            },
        ];
        for err in cases {
            assert_eq!(err.kind(), Some(ErrorKind::CapabilityError), "{err}");
        }
    }

    #[test]
    fn kind_maps_workflow_errors() {
        assert_eq!(
            AgentError::ParseError {
                stage: "classify".into(),
                message: "bad float".into(),
            }
            .kind(),
            Some(ErrorKind::ParseError)
        );
        assert_eq!(
            AgentError::NoConversation {
                thread_id: "t".into()
            }
            .kind(),
            Some(ErrorKind::NoConversation)
        );
        assert_eq!(
            AgentError::ValidationFailure("missing".into()).kind(),
            Some(ErrorKind::ValidationFailure)
        );
        assert_eq!(AgentError::Store("disk full".into()).kind(), None);
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn error_kind_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::NoConversation).unwrap(),
            "\"no_conversation\""
        );
    }
}
