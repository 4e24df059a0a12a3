//! Error handling for the chat server

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat server error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Socket-level failures
    #[error("Network error: {0}")]
    Network(String),
    /// Framing violations (oversized line and similar)
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A command line that could not be parsed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    /// Handshake name refused
    #[error("Name rejected: {0}")]
    NameRejected(String),
    /// History log could not be read or written
    #[error("History error: {0}")]
    History(String),
    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Peer went away
    #[error("Connection error: {0}")]
    Connection(String),
    /// Server internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        ChatError::Network(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        ChatError::Protocol(msg.into())
    }

    /// Create an invalid command error
    pub fn invalid_command<T: Into<String>>(msg: T) -> Self {
        ChatError::InvalidCommand(msg.into())
    }

    /// Create a name rejected error
    pub fn name_rejected<T: Into<String>>(msg: T) -> Self {
        ChatError::NameRejected(msg.into())
    }

    /// Create a history error
    pub fn history<T: Into<String>>(msg: T) -> Self {
        ChatError::History(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        ChatError::Connection(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        ChatError::Internal(msg.into())
    }

    /// Whether this error only affects the current message, leaving the
    /// session usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatError::InvalidCommand(_) | ChatError::NameRejected(_) | ChatError::History(_)
        )
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(format!("JSON error: {}", err))
    }
}
