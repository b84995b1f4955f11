//! Best-effort event emission for pipeline stages.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::progress::event::ProgressEvent;
use crate::progress::store::ProgressStore;

/// Records pipeline events; recording failures never fail the pipeline.
#[derive(Clone)]
pub struct ProgressRecorder {
    store: Arc<ProgressStore>,
}

impl ProgressRecorder {
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn emit_event_best_effort(&self, token: &str, event_type: &str, data: Value) {
        let result = self.store.next_seq(token).and_then(|seq| {
            let event = ProgressEvent::with_now(token, seq, event_type, data);
            self.store.append_event(&event)
        });
        match result {
            Ok(()) => debug!(token, event_type, "Progress event recorded"),
            Err(err) => warn!(token, event_type, error = %err, "Failed to record progress event"),
        }
    }
}

/// Emit through an optional recorder
pub(crate) fn emit(progress: Option<&ProgressRecorder>, token: Option<&str>, event_type: &str, data: Value) {
    if let (Some(progress), Some(token)) = (progress, token) {
        progress.emit_event_best_effort(token, event_type, data);
    }
}
