//! Workflow state: the record bridging the outline phase and the content phase.
//!
//! The two phases are separate invocations. Everything the content phase needs is captured in
//! a [`WorkflowState`] keyed by an opaque [`WorkflowToken`]. Saving a new state for the same
//! company, course, and lesson supersedes the previous one.

pub mod store;

pub use store::{ContextKey, MemorySessionStore, SessionStore, SledSessionStore};

use crate::classify::InputMode;
use crate::error::PipelineError;
use crate::index::RetrievalIndex;
use crate::outline::Outline;
use crate::progress::now_millis;
use crate::types::LessonType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to a stored workflow state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowToken(String);

impl WorkflowToken {
    /// Issue a fresh token for a context.
    pub fn issue(context: &ContextKey) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&now_millis().to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.update(context.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest.as_bytes()[..16]))
    }

    /// Wrap a token received from a caller.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::Validation(format!(
                "malformed workflow token '{}'",
                raw
            )));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the content phase needs from the outline phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub company_id: String,
    pub mode: InputMode,
    pub outline: Outline,
    pub retrieval_index: Option<RetrievalIndex>,
    pub document_source_path: Option<PathBuf>,
    pub profile: String,
    pub lesson_name: String,
    pub course_name: String,
    pub lesson_type: LessonType,
    pub web_search_enabled: bool,
    pub include_images: bool,
    pub created_at_ms: u64,
    pub revised_at_ms: Option<u64>,
}

impl WorkflowState {
    pub fn context_key(&self) -> ContextKey {
        ContextKey::new(&self.company_id, &self.course_name, &self.lesson_name)
    }
}

/// Save/load/revise over an injected [`SessionStore`]
#[derive(Clone)]
pub struct WorkflowStates {
    store: Arc<dyn SessionStore>,
}

impl WorkflowStates {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Persist under a new token, superseding any state for the same context.
    pub fn save(&self, state: &WorkflowState) -> Result<WorkflowToken, PipelineError> {
        let token = WorkflowToken::issue(&state.context_key());
        self.save_as(&token, state)?;
        Ok(token)
    }

    /// Persist under a pre-issued token, superseding any state for the same context.
    pub fn save_as(&self, token: &WorkflowToken, state: &WorkflowState) -> Result<(), PipelineError> {
        let context = state.context_key();
        if let Some(previous) = self.store.find_by_context(&context)? {
            if &previous != token {
                self.store.remove(&previous)?;
                info!(previous = %previous, "Superseded workflow state");
            }
        }
        self.store.put(token, state)?;
        debug!(token = %token, mode = %state.mode, submodules = state.outline.len(), "Workflow state saved");
        Ok(())
    }

    /// Load a state owned by `company_id`. Missing, expired, or foreign tokens are
    /// all reported as [`PipelineError::StateNotFound`].
    pub fn load(&self, company_id: &str, token: &WorkflowToken) -> Result<WorkflowState, PipelineError> {
        match self.store.get(token)? {
            Some(state) if state.company_id == company_id => Ok(state),
            _ => Err(PipelineError::StateNotFound(token.to_string())),
        }
    }

    /// Load for the content phase: additionally requires a non-empty outline.
    pub fn load_for_content(
        &self,
        company_id: &str,
        token: &WorkflowToken,
    ) -> Result<WorkflowState, PipelineError> {
        let state = self.load(company_id, token)?;
        if state.outline.is_empty() {
            return Err(PipelineError::OutlineNotGenerated(token.to_string()));
        }
        Ok(state)
    }

    /// Replace the outline, leaving every other field untouched.
    pub fn update_outline(
        &self,
        company_id: &str,
        token: &WorkflowToken,
        outline: Outline,
    ) -> Result<WorkflowState, PipelineError> {
        let mut state = self.load(company_id, token)?;
        state.outline = outline;
        state.revised_at_ms = Some(now_millis());
        self.store.put(token, &state)?;
        info!(token = %token, submodules = state.outline.len(), "Outline revised");
        Ok(state)
    }

    pub fn discard(&self, company_id: &str, token: &WorkflowToken) -> Result<(), PipelineError> {
        self.load(company_id, token)?;
        self.store.remove(token)?;
        Ok(())
    }
}
