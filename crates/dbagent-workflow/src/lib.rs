//! Stateful conversation workflow for natural-language database requests.
//!
//! [`WorkflowEngine`] drives a thread's [`ConversationState`] through the
//! stages in [`stages`], consults the [`router`] after validation, and saves
//! the state through a [`StateStore`] after every transition. A request that
//! lacks information ends with a clarification question; the user's answer
//! goes back in through [`WorkflowEngine::resume`].
//!
//! [`ConversationState`]: dbagent_types::ConversationState

pub mod capability;
pub mod config;
pub mod engine;
pub mod events;
pub mod parse;
pub mod prompts;
pub mod retry;
pub mod router;
pub mod stages;
pub mod store;
pub mod testing;

pub use capability::{LlmReasoner, QueryExecutor, Reasoner, SchemaSource, StaticSchema};
pub use config::EngineConfig;
pub use engine::WorkflowEngine;
pub use events::{EventEmitter, WorkflowEvent};
pub use retry::{with_retry, BackoffPolicy};
pub use router::{route, Route};
pub use stages::{clarification_message, Stage, StageContext, StageOutput, StageRun, ValidationPolicy};
pub use store::{DynStateStore, FileStateStore, InMemoryStateStore, StateStore, ThreadLocks};
