//! Per-service MCP session tokens.
//!
//! Each service id owns a slot guarded by its own async mutex, so sessions
//! for different services are established concurrently while callers that
//! target the same service serialize their check-and-initialize. The outer
//! map lock is only held long enough to fetch a slot.

use crate::error::McpResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

type Slot = Arc<tokio::sync::Mutex<Option<String>>>;

/// Memory-only map of service id to session token.
#[derive(Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, service_id: &str) -> Slot {
        self.slots
            .lock()
            .entry(service_id.to_string())
            .or_default()
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn existing_slot(&self, service_id: &str) -> Option<Slot> {
        self.slots.lock().get(service_id).cloned()
    }

    pub async fn get(&self, service_id: &str) -> Option<String> {
        let slot = self.existing_slot(service_id)?;
        let current = slot.lock().await;
        current.clone()
    }

    pub async fn set(&self, service_id: &str, session_id: impl Into<String>) {
        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return;
        }
        *self.slot(service_id).lock().await = Some(session_id);
    }

    pub async fn clear(&self, service_id: &str) {
        if let Some(slot) = self.existing_slot(service_id) {
            *slot.lock().await = None;
        }
    }

    /// Clears the session only if it is still `stale`. A caller that lost a
    /// race must not wipe the session another caller just re-established.
    pub async fn invalidate(&self, service_id: &str, stale: &str) -> bool {
        let Some(slot) = self.existing_slot(service_id) else {
            return false;
        };
        let mut current = slot.lock().await;
        if current.as_deref() == Some(stale) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Returns the cached session, or runs `init` while holding the slot so
    /// concurrent callers for the same service share one handshake.
    ///
    /// `init` may legitimately yield `None` (server without sessions); that
    /// outcome is not cached.
    pub async fn get_or_try_init<F, Fut>(&self, service_id: &str, init: F) -> McpResult<Option<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = McpResult<Option<String>>>,
    {
        let slot = self.slot(service_id);
        let mut current = slot.lock().await;
        if let Some(existing) = current.as_ref() {
            return Ok(Some(existing.clone()));
        }
        let fresh = init().await?;
        if let Some(session_id) = &fresh {
            *current = Some(session_id.clone());
        }
        Ok(fresh)
    }
}
