//! Durable sled-backed progress event store.

use std::sync::Arc;

use sled::{Db, Tree};

use crate::error::StorageError;
use crate::progress::event::ProgressEvent;

const TREE_EVENTS: &str = "progress_events";
const TREE_SEQ: &str = "progress_seq";
const EVENT_KEY_PAD: usize = 20;

#[derive(Clone)]
pub struct ProgressStore {
    db: Db,
    events: Tree,
    seq: Tree,
}

impl ProgressStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let events = db.open_tree(TREE_EVENTS)?;
        let seq = db.open_tree(TREE_SEQ)?;
        Ok(Self { db, events, seq })
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    /// Next sequence number for a token, starting at 1.
    pub fn next_seq(&self, token: &str) -> Result<u64, StorageError> {
        let updated = self.seq.update_and_fetch(token.as_bytes(), |old| {
            let current = old.map(decode_seq).unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        Ok(updated.map(|raw| decode_seq(&raw)).unwrap_or(1))
    }

    pub fn append_event(&self, event: &ProgressEvent) -> Result<(), StorageError> {
        let key = encode_event_key(&event.token, event.seq);
        let value = serde_json::to_vec(event).map_err(|e| StorageError::Encode(e.to_string()))?;
        self.events.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn read_events(&self, token: &str) -> Result<Vec<ProgressEvent>, StorageError> {
        let prefix = format!("{token}:");
        let mut out = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result?;
            let parsed: ProgressEvent =
                serde_json::from_slice(&value).map_err(|e| StorageError::Decode(e.to_string()))?;
            out.push(parsed);
        }
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    pub fn delete_events(&self, token: &str) -> Result<(), StorageError> {
        let prefix = format!("{token}:");
        let keys: Vec<Vec<u8>> = self
            .events
            .scan_prefix(prefix.as_bytes())
            .filter_map(|r| r.ok().map(|(k, _)| k.to_vec()))
            .collect();
        for key in keys {
            self.events.remove(key)?;
        }
        self.seq.remove(token.as_bytes())?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn encode_event_key(token: &str, seq: u64) -> String {
        encode_event_key(token, seq)
    }
}

fn encode_event_key(token: &str, seq: u64) -> String {
    format!("{token}:{seq:0EVENT_KEY_PAD$}")
}

fn decode_seq(raw: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    if raw.len() == 8 {
        bytes.copy_from_slice(raw);
    }
    u64::from_be_bytes(bytes)
}
