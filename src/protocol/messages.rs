//! Outbound line types for the chat system
//!
//! Every line the server writes to a client is one of these variants. The
//! `Display` impl renders the exact text sent over the wire, without the
//! line terminator (that is the codec's job).

use std::fmt;

use crate::history::HistoryRecord;

/// Handshake prompt, sent without a trailing newline
pub const NAME_PROMPT: &str = "Enter your name: ";

/// Presence transitions that are announced to everyone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Disconnect,
    Reconnect,
}

impl PresenceEvent {
    /// Command token used on the wire and in the history log
    pub fn token(&self) -> &'static str {
        match self {
            PresenceEvent::Disconnect => "/disconnect",
            PresenceEvent::Reconnect => "/reconnect",
        }
    }
}

/// A single server-to-client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundLine {
    /// `Enter your name: `
    Prompt,
    /// `Welcome to the chat, <name>!`
    Welcome { name: String },
    /// `<sender>: <body>`
    Chat { sender: String, body: String },
    /// `Private message from <sender>: <body>`
    Private { sender: String, body: String },
    /// `<name>: /disconnect` or `<name>: /reconnect`
    Presence { name: String, event: PresenceEvent },
    /// `Recipient not found.`
    RecipientNotFound,
    /// Free-form server notice
    Notice(String),
}

impl OutboundLine {
    pub fn welcome(name: impl Into<String>) -> Self {
        OutboundLine::Welcome { name: name.into() }
    }

    pub fn chat(sender: impl Into<String>, body: impl Into<String>) -> Self {
        OutboundLine::Chat {
            sender: sender.into(),
            body: body.into(),
        }
    }

    pub fn private(sender: impl Into<String>, body: impl Into<String>) -> Self {
        OutboundLine::Private {
            sender: sender.into(),
            body: body.into(),
        }
    }

    pub fn presence(name: impl Into<String>, event: PresenceEvent) -> Self {
        OutboundLine::Presence {
            name: name.into(),
            event,
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        OutboundLine::Notice(text.into())
    }

    /// Whether the codec should append a line terminator
    pub fn is_terminated(&self) -> bool {
        !matches!(self, OutboundLine::Prompt)
    }
}

impl fmt::Display for OutboundLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundLine::Prompt => f.write_str(NAME_PROMPT),
            OutboundLine::Welcome { name } => write!(f, "Welcome to the chat, {}!", name),
            OutboundLine::Chat { sender, body } => write!(f, "{}: {}", sender, body),
            OutboundLine::Private { sender, body } => {
                write!(f, "Private message from {}: {}", sender, body)
            }
            OutboundLine::Presence { name, event } => write!(f, "{}: {}", name, event.token()),
            OutboundLine::RecipientNotFound => f.write_str("Recipient not found."),
            OutboundLine::Notice(text) => f.write_str(text),
        }
    }
}

/// Replayed history is always shown in chat form, private records included.
impl From<&HistoryRecord> for OutboundLine {
    fn from(record: &HistoryRecord) -> Self {
        OutboundLine::chat(record.sender.clone(), record.body.clone())
    }
}
