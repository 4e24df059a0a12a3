//! Line-oriented TCP chat server with persistent history
//!
//! Clients connect over plain TCP, pick a display name and then exchange
//! newline-terminated text lines. The server routes public and private
//! messages, tracks online/offline presence, and appends every event to a
//! JSON Lines history log so that new and reconnecting clients can be caught
//! up.
//!
//! ## Commands
//!
//! - `/private <name> <message>`: deliver to one client only
//! - `/disconnect`: go offline without closing the connection
//! - `/reconnect`: come back online and receive what was missed
//! - anything else: public chat

pub mod client;
pub mod error;
pub mod history;
pub mod protocol;
pub mod server;

pub use client::{ChatClient, ChatClientConfig};
pub use error::{ChatError, Result};
pub use history::{HistoryLog, HistoryRecord};
pub use protocol::{ChatLineCodec, Command, OutboundLine, PresenceEvent};
pub use server::{ChatServer, ClientRegistry, MessageRouter, ReplayEngine, ServerStats};

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Chat server configuration
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Host name or address to listen on
    pub host: String,
    /// TCP port (0 picks a free port)
    pub port: u16,
    /// Location of the append-only history log
    pub history_path: PathBuf,
    /// How many public messages a brand-new client is shown
    pub restore_last_messages: usize,
    /// Longest accepted inbound line in bytes
    pub max_line_length: usize,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Hide other people's private messages from reconnect replay
    pub private_replay_filter: bool,
}

impl ChatConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            history_path: PathBuf::from("history.jsonl"),
            restore_last_messages: 20,
            max_line_length: 2048,
            max_connections: 1000,
            private_replay_filter: false,
        }
    }
}
