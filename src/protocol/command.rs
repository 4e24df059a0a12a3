//! Inbound command grammar
//!
//! ```text
//! /private <name> <message...>
//! /disconnect
//! /reconnect
//! <anything else>              public chat
//! ```

use crate::error::{ChatError, Result};

const PRIVATE_PREFIX: &str = "/private";
const DISCONNECT_PREFIX: &str = "/disconnect";
const RECONNECT_PREFIX: &str = "/reconnect";

/// Usage hint returned for a malformed `/private`
pub const PRIVATE_USAGE: &str = "usage: /private <name> <message>";

/// One parsed inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Message for a single named client
    Private { recipient: String, body: String },
    /// Go offline but keep the connection
    Disconnect,
    /// Come back online
    Reconnect,
    /// Public chat text
    Chat(String),
}

impl Command {
    /// Parse a trimmed, non-empty line.
    ///
    /// Prefix matching follows the classic behaviour: anything starting with
    /// `/disconnect` is a disconnect, and so on. A `/private` line needs a
    /// recipient and a non-empty body separated by single spaces.
    pub fn parse(line: &str) -> Result<Command> {
        if line.starts_with(PRIVATE_PREFIX) {
            return Self::parse_private(line);
        }
        if line.starts_with(DISCONNECT_PREFIX) {
            return Ok(Command::Disconnect);
        }
        if line.starts_with(RECONNECT_PREFIX) {
            return Ok(Command::Reconnect);
        }
        Ok(Command::Chat(line.to_string()))
    }

    fn parse_private(line: &str) -> Result<Command> {
        let mut parts = line.splitn(3, ' ');
        let _command = parts.next();
        let recipient = parts.next().unwrap_or_default();
        let body = parts.next().unwrap_or_default();

        if recipient.is_empty() || body.is_empty() {
            return Err(ChatError::invalid_command(PRIVATE_USAGE));
        }

        Ok(Command::Private {
            recipient: recipient.to_string(),
            body: body.to_string(),
        })
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Private { .. } => "private",
            Command::Disconnect => "disconnect",
            Command::Reconnect => "reconnect",
            Command::Chat(_) => "chat",
        }
    }
}
