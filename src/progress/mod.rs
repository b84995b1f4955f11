//! Progress observability: per-workflow event log.

pub mod event;
pub mod recorder;
pub mod store;

pub use event::ProgressEvent;
pub use recorder::ProgressRecorder;
pub use store::ProgressStore;

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
