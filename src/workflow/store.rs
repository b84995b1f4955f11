//! Durable session stores for workflow states.

use crate::error::StorageError;
use crate::workflow::{WorkflowState, WorkflowToken};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

const TREE_STATES: &str = "workflow_states";
const TREE_CONTEXTS: &str = "workflow_contexts";

/// Identifies "the same lesson" for supersession: company, course, lesson
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn new(company_id: &str, course_name: &str, lesson_name: &str) -> Self {
        // Unit separator keeps components from running together.
        Self(format!("{company_id}\u{1f}{course_name}\u{1f}{lesson_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable directory and catalog id for everything owned by this context.
    pub fn storage_id(&self) -> String {
        let digest = blake3::hash(self.0.as_bytes());
        hex::encode(&digest.as_bytes()[..16])
    }
}

/// Session store interface. Implementations keep a context -> token binding so the latest
/// state for a lesson can be found and superseded.
pub trait SessionStore: Send + Sync {
    /// Store the state and bind its context to `token`.
    fn put(&self, token: &WorkflowToken, state: &WorkflowState) -> Result<(), StorageError>;

    fn get(&self, token: &WorkflowToken) -> Result<Option<WorkflowState>, StorageError>;

    /// Remove the state and its context binding if it still points at `token`.
    fn remove(&self, token: &WorkflowToken) -> Result<(), StorageError>;

    fn find_by_context(&self, context: &ContextKey) -> Result<Option<WorkflowToken>, StorageError>;
}

/// Sled-based session store; values are bincode-encoded
#[derive(Clone)]
pub struct SledSessionStore {
    states: sled::Tree,
    contexts: sled::Tree,
}

impl SledSessionStore {
    /// Open a dedicated database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| StorageError::OpenFailed {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        Self::new(&db)
    }

    /// Use trees within an existing database.
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            states: db.open_tree(TREE_STATES)?,
            contexts: db.open_tree(TREE_CONTEXTS)?,
        })
    }
}

impl SessionStore for SledSessionStore {
    fn put(&self, token: &WorkflowToken, state: &WorkflowState) -> Result<(), StorageError> {
        let value = bincode::serialize(state).map_err(|e| {
            StorageError::Encode(format!("Failed to serialize workflow state: {}", e))
        })?;
        self.states.insert(token.as_str().as_bytes(), value)?;
        self.contexts.insert(
            state.context_key().as_str().as_bytes(),
            token.as_str().as_bytes(),
        )?;
        self.states.flush()?;
        Ok(())
    }

    fn get(&self, token: &WorkflowToken) -> Result<Option<WorkflowState>, StorageError> {
        match self.states.get(token.as_str().as_bytes())? {
            Some(value) => {
                let state: WorkflowState = bincode::deserialize(&value).map_err(|e| {
                    StorageError::Decode(format!("Failed to deserialize workflow state: {}", e))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    fn remove(&self, token: &WorkflowToken) -> Result<(), StorageError> {
        if let Some(state) = self.get(token)? {
            let key = state.context_key();
            let bound = self.contexts.get(key.as_str().as_bytes())?;
            if bound.as_deref() == Some(token.as_str().as_bytes()) {
                self.contexts.remove(key.as_str().as_bytes())?;
            }
        }
        self.states.remove(token.as_str().as_bytes())?;
        Ok(())
    }

    fn find_by_context(&self, context: &ContextKey) -> Result<Option<WorkflowToken>, StorageError> {
        match self.contexts.get(context.as_str().as_bytes())? {
            Some(raw) => {
                let token = String::from_utf8(raw.to_vec())
                    .map_err(|e| StorageError::Decode(format!("Invalid token bytes: {}", e)))?;
                Ok(Some(WorkflowToken(token)))
            }
            None => Ok(None),
        }
    }
}

/// In-process session store
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    states: HashMap<WorkflowToken, WorkflowState>,
    contexts: HashMap<ContextKey, WorkflowToken>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, token: &WorkflowToken, state: &WorkflowState) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        inner.states.insert(token.clone(), state.clone());
        inner.contexts.insert(state.context_key(), token.clone());
        Ok(())
    }

    fn get(&self, token: &WorkflowToken) -> Result<Option<WorkflowState>, StorageError> {
        Ok(self.inner.read().states.get(token).cloned())
    }

    fn remove(&self, token: &WorkflowToken) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some(state) = inner.states.remove(token) {
            let key = state.context_key();
            if inner.contexts.get(&key) == Some(token) {
                inner.contexts.remove(&key);
            }
        }
        Ok(())
    }

    fn find_by_context(&self, context: &ContextKey) -> Result<Option<WorkflowToken>, StorageError> {
        Ok(self.inner.read().contexts.get(context).cloned())
    }
}
