//! Session-scoped join context store.
//!
//! The context is a single JSON blob under a fixed key: read at
//! connection start, written at join time and on authoritative identity
//! corrections, and cleared on leave, removal, or invalid-context
//! detection. The store itself is a trivial keyed blob store; the in-memory
//! implementation backs both tests and the CLI binary.

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Fixed storage key for the join context blob.
pub const CONTEXT_KEY: &str = "classJoinInfo";

/// Join parameters a participant needs to open (and re-open) the realtime
/// connection for one class session.
///
/// Field names serialize in the wire's camelCase so the blob round-trips
/// against the upstream payload shapes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinContext {
    pub cpcs_region: String,
    pub presenter_email: String,
    pub class_code: String,
    pub participant_id: String,
    pub participant_username: String,
    pub participant_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_session_id: Option<String>,
}

/// Keyed blob store holding the join context for the session lifetime.
pub trait ContextStore: Send + Sync {
    /// Read and decode the stored context. Returns `None` when absent or
    /// when the blob fails to parse (invalid-context detection).
    fn read(&self) -> Option<JoinContext>;

    /// Encode and persist the context under [`CONTEXT_KEY`].
    fn write(&self, ctx: &JoinContext);

    /// Remove the stored context.
    fn clear(&self);
}

/// In-memory [`ContextStore`] for tests and the CLI.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextStore for MemoryStore {
    fn read(&self) -> Option<JoinContext> {
        let slots = self.slots.lock().ok()?;
        let raw = slots.get(CONTEXT_KEY)?;
        serde_json::from_str(raw).ok()
    }

    fn write(&self, ctx: &JoinContext) {
        let Ok(encoded) = serde_json::to_string(ctx) else {
            return;
        };
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(CONTEXT_KEY.to_owned(), encoded);
        }
    }

    fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(CONTEXT_KEY);
        }
    }
}
