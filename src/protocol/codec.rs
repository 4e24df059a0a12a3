//! Newline framing for the chat protocol
//!
//! Inbound bytes are split on `\n` (a trailing `\r` is dropped), so several
//! messages in one TCP read, or one message spread over many reads, are
//! framed correctly. Outbound [`OutboundLine`]s are rendered and terminated
//! with `\n`, except the name prompt.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::messages::OutboundLine;
use crate::error::ChatError;

/// Default maximum inbound line length in bytes, excluding the terminator
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2048;

/// Line codec used on the server side of every connection
#[derive(Debug, Clone)]
pub struct ChatLineCodec {
    max_length: usize,
    /// Bytes already searched for a newline in the current buffer
    next_index: usize,
}

impl ChatLineCodec {
    /// Create a codec with the default line cap
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec that rejects lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    fn too_long(&self) -> ChatError {
        ChatError::protocol(format!(
            "line exceeds maximum length ({} bytes)",
            self.max_length
        ))
    }
}

impl Default for ChatLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for ChatLineCodec {
    type Item = String;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let pos = self.next_index + offset;
                self.next_index = 0;
                if pos > self.max_length {
                    return Err(self.too_long());
                }
                let line = src.split_to(pos);
                src.advance(1);
                Ok(Some(to_line(&line)))
            }
            None => {
                if src.len() > self.max_length {
                    return Err(self.too_long());
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(to_line(&rest)))
    }
}

impl Encoder<OutboundLine> for ChatLineCodec {
    type Error = ChatError;

    fn encode(&mut self, item: OutboundLine, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.to_string();
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        if item.is_terminated() {
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}
