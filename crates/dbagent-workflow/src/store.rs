//! Persistence of [`ConversationState`] by thread id.
//!
//! Every stage transition ends with a [`StateStore::put`] of the full state,
//! so the latest snapshot is always the last completed transition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbagent_types::{AgentError, ConversationState, Result};
use tokio::sync::{OwnedMutexGuard, RwLock};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// The stored snapshot, or `None` when the thread is unknown.
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationState>>;

    /// Replace the snapshot for `state.thread_id`.
    async fn put(&self, state: &ConversationState) -> Result<()>;

    /// Load the thread or build a fresh state for it. A fresh state is not
    /// stored until the caller puts it.
    async fn get_or_create(&self, thread_id: &str) -> Result<ConversationState> {
        Ok(self
            .get(thread_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(thread_id)))
    }
}

pub type DynStateStore = Arc<dyn StateStore>;

// ---------------------------------------------------------------------------
// InMemoryStateStore
// ---------------------------------------------------------------------------

/// Process-local store. With a TTL, threads idle for longer than the TTL
/// are treated as unknown and evicted on the next write.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, ConversationState>>,
    ttl: Option<Duration>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: RwLock::default(),
            ttl: Some(ttl),
        }
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    fn expired(&self, state: &ConversationState) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - state.updated_at > ttl,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let states = self.states.read().await;
        Ok(states
            .get(thread_id)
            .filter(|s| !self.expired(s))
            .cloned())
    }

    async fn put(&self, state: &ConversationState) -> Result<()> {
        let mut states = self.states.write().await;
        if self.ttl.is_some() {
            states.retain(|_, s| !self.expired(s));
        }
        states.insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStateStore
// ---------------------------------------------------------------------------

/// One pretty-printed JSON file per thread under `root`.
///
/// Writes go to a temporary file that is renamed over the snapshot, so a
/// crash mid-write leaves the previous snapshot readable.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, thread_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_file_stem(thread_id)))
    }
}

/// Keep `[A-Za-z0-9_-]`, percent-encode every other byte.
fn encode_file_stem(thread_id: &str) -> String {
    let mut out = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let path = self.path_for(thread_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        let state: ConversationState = serde_json::from_str(&json).map_err(|e| {
            AgentError::Store(format!("corrupt snapshot {}: {e}", path.display()))
        })?;
        Ok(Some(state))
    }

    async fn put(&self, state: &ConversationState) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(&state.thread_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), thread_id = %state.thread_id, "State saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ThreadLocks
// ---------------------------------------------------------------------------

/// Per-thread async locks. Runs on the same thread id queue up; different
/// thread ids never contend.
#[derive(Default)]
pub struct ThreadLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the map still references belong to finished runs.
            locks.retain(|id, l| id == thread_id || Arc::strong_count(l) > 1);
            locks.entry(thread_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of lock entries currently held in the map.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
