//! Workflow event system for observability.
//!
//! Emits [`WorkflowEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (the console, loggers, tests) can follow a run without coupling
//! to the engine internals.

use dbagent_types::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::router::Route;

/// Events emitted while the engine drives a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    RunStarted {
        thread_id: String,
        resumed: bool,
    },
    StageStarted {
        thread_id: String,
        stage: String,
    },
    StageCompleted {
        thread_id: String,
        stage: String,
        error_kind: Option<ErrorKind>,
        duration_ms: u64,
    },
    RouteSelected {
        thread_id: String,
        route: Route,
    },
    CheckpointSaved {
        thread_id: String,
        stage: String,
    },
    RunCompleted {
        thread_id: String,
        needs_clarification: bool,
        success: bool,
        duration_ms: u64,
    },
}

impl WorkflowEvent {
    pub fn thread_id(&self) -> &str {
        match self {
            WorkflowEvent::RunStarted { thread_id, .. }
            | WorkflowEvent::StageStarted { thread_id, .. }
            | WorkflowEvent::StageCompleted { thread_id, .. }
            | WorkflowEvent::RouteSelected { thread_id, .. }
            | WorkflowEvent::CheckpointSaved { thread_id, .. }
            | WorkflowEvent::RunCompleted { thread_id, .. } => thread_id,
        }
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit to all current subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
