//! Wire protocol for the line-oriented chat server
//!
//! This module provides:
//! - Newline framing over a TCP byte stream
//! - The inbound command grammar
//! - Outbound line types and their text rendering

pub mod codec;
pub mod command;
pub mod messages;

// Re-export commonly used types
pub use codec::{ChatLineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use command::{Command, PRIVATE_USAGE};
pub use messages::{OutboundLine, PresenceEvent};
