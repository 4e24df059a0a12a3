//! Client registry for the chat server
//!
//! Tracks every handshaked session together with its online/offline
//! presence. A `/disconnect` only flips presence; the session stays
//! registered (and keeps receiving broadcasts) until its connection is torn
//! down.

use std::collections::HashSet;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::current_timestamp;
use crate::error::{ChatError, Result};
use crate::protocol::OutboundLine;

/// Unique identifier of one accepted connection
pub type SessionId = Uuid;

/// Write side of a session: a queue drained by the session's own task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::UnboundedSender<OutboundLine>,
}

impl SessionHandle {
    /// Create a handle and the receiver its session task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue one line for delivery
    pub fn send(&self, line: OutboundLine) -> Result<()> {
        self.tx
            .send(line)
            .map_err(|_| ChatError::connection(format!("session {} is closed", self.id)))
    }

    /// The session task has gone away and nothing will be delivered
    pub fn is_closing(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A registered session
#[derive(Debug, Clone)]
struct SessionEntry {
    handle: SessionHandle,
    name: String,
    registered_at: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Registration order is kept so lookups are "first match"
    sessions: Vec<SessionEntry>,
    online: HashSet<String>,
}

/// Authoritative set of attached sessions and their presence
#[derive(Debug, Default)]
pub struct ClientRegistry {
    state: RwLock<RegistryState>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and mark its name online.
    ///
    /// Names must be non-empty and unique among registered sessions; the
    /// check and insert happen under one write lock.
    pub async fn register(&self, handle: SessionHandle, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ChatError::name_rejected("Name must not be empty."));
        }

        let mut state = self.state.write().await;
        if state.sessions.iter().any(|entry| entry.name == name) {
            return Err(ChatError::name_rejected(format!(
                "Name '{}' is already taken.",
                name
            )));
        }

        state.sessions.push(SessionEntry {
            handle,
            name: name.to_string(),
            registered_at: current_timestamp(),
        });
        state.online.insert(name.to_string());
        debug!(name = %name, "session registered");
        Ok(())
    }

    /// Remove a torn-down session. Returns its name if it was registered.
    pub async fn unregister(&self, id: SessionId) -> Option<String> {
        let mut state = self.state.write().await;
        let index = state
            .sessions
            .iter()
            .position(|entry| entry.handle.id() == id)?;
        let entry = state.sessions.remove(index);

        if !state.sessions.iter().any(|other| other.name == entry.name) {
            state.online.remove(&entry.name);
        }

        debug!(
            name = %entry.name,
            connected_ms = current_timestamp().saturating_sub(entry.registered_at),
            "session unregistered"
        );
        Some(entry.name)
    }

    /// Mark `name` offline. Returns `false` if it was not online.
    pub async fn mark_offline(&self, name: &str) -> bool {
        self.state.write().await.online.remove(name)
    }

    /// Mark `name` online. Returns `false` if it already was, in which case
    /// callers must not announce a reconnect.
    pub async fn mark_online(&self, name: &str) -> bool {
        self.state.write().await.online.insert(name.to_string())
    }

    pub async fn is_online(&self, name: &str) -> bool {
        self.state.read().await.online.contains(name)
    }

    /// Handle of the first session registered under `name`
    pub async fn find_handle(&self, name: &str) -> Option<SessionHandle> {
        let state = self.state.read().await;
        state
            .sessions
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.handle.clone())
    }

    /// Deliver `line` to every registered session, online or not.
    ///
    /// Sessions already closing are skipped; a failed delivery is logged and
    /// does not stop the fan-out. Returns the number of sessions reached.
    pub async fn broadcast(&self, line: OutboundLine) -> usize {
        let state = self.state.read().await;
        let mut delivered = 0;

        for entry in &state.sessions {
            if entry.handle.is_closing() {
                continue;
            }
            match entry.handle.send(line.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(name = %entry.name, "broadcast delivery failed: {}", e),
            }
        }

        delivered
    }

    /// Number of registered sessions
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Number of online names
    pub async fn online_count(&self) -> usize {
        self.state.read().await.online.len()
    }
}
