//! Workflow engine: the stage loop.
//!
//! A run is classify, analyze, validate, then whichever branch the router
//! picks. The state is persisted after every stage, so the stored snapshot
//! always reflects the last completed transition.

use std::sync::Arc;
use std::time::Instant;

use dbagent_types::{AgentError, ConversationState, Message, Result};

use crate::capability::{QueryExecutor, Reasoner, SchemaSource};
use crate::config::EngineConfig;
use crate::events::{EventEmitter, WorkflowEvent};
use crate::router::route;
use crate::stages::{Stage, StageContext};
use crate::store::{DynStateStore, ThreadLocks};

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine {
    store: DynStateStore,
    ctx: StageContext,
    locks: ThreadLocks,
    events: EventEmitter,
}

impl WorkflowEngine {
    pub fn new(
        store: DynStateStore,
        reasoner: Arc<dyn Reasoner>,
        schema: Arc<dyn SchemaSource>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            store,
            ctx: StageContext::new(reasoner, schema, executor, EngineConfig::default()),
            locks: ThreadLocks::new(),
            events: EventEmitter::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.ctx.config = config;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn store(&self) -> &DynStateStore {
        &self.store
    }

    /// Process a new request on `thread_id`, creating the thread if needed.
    ///
    /// Stage failures are recorded in the returned state. The only errors are
    /// state store failures.
    pub async fn run(&self, user_query: &str, thread_id: &str) -> Result<ConversationState> {
        let _guard = self.locks.acquire(thread_id).await;

        let mut state = self.store.get_or_create(thread_id).await?;
        state.push_message(Message::user(user_query));
        state.begin_run(user_query);
        self.store.put(&state).await?;

        self.drive(&mut state, false).await?;
        Ok(state)
    }

    /// Continue a thread with the user's answer to a clarification. The
    /// pipeline starts again from classification with the answer folded into
    /// the request.
    pub async fn resume(&self, answer: &str, thread_id: &str) -> Result<ConversationState> {
        let _guard = self.locks.acquire(thread_id).await;

        let mut state = self
            .store
            .get(thread_id)
            .await?
            .ok_or_else(|| AgentError::NoConversation {
                thread_id: thread_id.to_string(),
            })?;
        state.push_message(Message::user(answer));
        let query = format!("{} [User clarification: {answer}]", state.user_query);
        state.begin_run(query);
        self.store.put(&state).await?;

        self.drive(&mut state, true).await?;
        Ok(state)
    }

    async fn drive(&self, state: &mut ConversationState, resumed: bool) -> Result<()> {
        let started = Instant::now();
        let thread_id = state.thread_id.clone();
        tracing::info!(thread_id = %thread_id, resumed, query = %state.user_query, "Run started");
        self.events.emit(WorkflowEvent::RunStarted {
            thread_id: thread_id.clone(),
            resumed,
        });

        for stage in Stage::PREFIX {
            self.step(stage, state).await?;
        }

        let route = route(state.validation.as_ref());
        tracing::info!(thread_id = %thread_id, route = %route, "Route selected");
        self.events.emit(WorkflowEvent::RouteSelected {
            thread_id: thread_id.clone(),
            route,
        });

        for &stage in route.stages() {
            self.step(stage, state).await?;
        }

        let success = state
            .execution_result
            .as_ref()
            .map(|r| r.success)
            .unwrap_or(false);
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            thread_id = %thread_id,
            needs_clarification = state.needs_clarification,
            success,
            duration_ms,
            "Run completed"
        );
        self.events.emit(WorkflowEvent::RunCompleted {
            thread_id,
            needs_clarification: state.needs_clarification,
            success,
            duration_ms,
        });
        Ok(())
    }

    /// Run one stage, merge its output, persist.
    async fn step(&self, stage: Stage, state: &mut ConversationState) -> Result<()> {
        let thread_id = state.thread_id.clone();
        let started = Instant::now();
        tracing::info!(thread_id = %thread_id, stage = %stage, "Stage started");
        self.events.emit(WorkflowEvent::StageStarted {
            thread_id: thread_id.clone(),
            stage: stage.name().to_string(),
        });

        let run = stage.run(state, &self.ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match (run.failure, run.output.error()) {
            (Some(kind), Some(error)) => {
                tracing::warn!(thread_id = %thread_id, stage = %stage, ?kind, error, "Stage failed")
            }
            (Some(kind), None) => {
                tracing::info!(thread_id = %thread_id, stage = %stage, ?kind, duration_ms, "Stage completed")
            }
            (None, _) => {
                tracing::info!(thread_id = %thread_id, stage = %stage, duration_ms, "Stage completed")
            }
        }
        let failure = run.failure;
        run.output.apply(state);

        self.store.put(state).await?;
        tracing::debug!(thread_id = %thread_id, stage = %stage, "Checkpoint saved");
        self.events.emit(WorkflowEvent::CheckpointSaved {
            thread_id: thread_id.clone(),
            stage: stage.name().to_string(),
        });
        self.events.emit(WorkflowEvent::StageCompleted {
            thread_id,
            stage: stage.name().to_string(),
            error_kind: failure,
            duration_ms,
        });
        Ok(())
    }
}
