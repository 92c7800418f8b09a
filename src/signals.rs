//! Post-commit and post-delete notifications.
//!
//! Listeners receive the JSON text of a [`CommitSignal`] or [`DeleteSignal`].
//! Delivery is asynchronous, on the emitter's own threads.

use event_emitter_rs::EventEmitter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::RecordId;

pub const POST_COMMIT: &str = "post_commit";
pub const POST_DELETE: &str = "post_delete";

/// Payload of [`POST_COMMIT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSignal {
    pub table: String,
    pub applied: usize,
}

/// Payload of [`POST_DELETE`], sent once per removed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSignal {
    pub table: String,
    pub id: RecordId,
}

pub struct Signals {
    emitter: Mutex<EventEmitter>,
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

impl Signals {
    pub fn new() -> Self {
        Signals {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    /// Register a listener. Returns its listener id.
    pub fn on<F>(&self, event: &str, listener: F) -> String
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.emitter.lock().on(event, listener)
    }

    pub(crate) fn emit<T: Serialize>(&self, event: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => {
                self.emitter.lock().emit(event, json);
            }
            Err(err) => warn!(event, error = %err, "signal payload not serializable"),
        }
    }
}
