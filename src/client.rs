//! Console chat client
//!
//! A thin I/O loop: whatever the server sends is printed as it arrives, and
//! every non-blank line typed on stdin is sent with a `\n` terminator. After
//! the user types `/disconnect`, incoming text is hidden until `/reconnect`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, error, info};

use crate::error::{ChatError, Result};

/// Size of one read from the server
const READ_CHUNK: usize = 2048;

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl ChatClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            connect_timeout_secs: 10,
        }
    }
}

/// Effect of one typed line on what the console shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Blank input, nothing is sent
    Skip,
    /// Send and stop displaying incoming text
    SendAndMute,
    /// Send and resume displaying incoming text
    SendAndUnmute,
    /// Send, display unchanged
    Send,
}

impl InputAction {
    pub fn classify(line: &str) -> Self {
        match line.trim() {
            "" => InputAction::Skip,
            "/disconnect" => InputAction::SendAndMute,
            "/reconnect" => InputAction::SendAndUnmute,
            _ => InputAction::Send,
        }
    }
}

/// TCP chat client
pub struct ChatClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    /// Whether incoming text is currently displayed
    displaying: Arc<AtomicBool>,
}

impl ChatClient {
    /// Connect to the chat server
    pub async fn connect(config: &ChatClientConfig) -> Result<Self> {
        let addr = config.server_addr();
        let stream = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            TcpStream::connect(addr.as_str()),
        )
        .await
        .map_err(|_| ChatError::connection(format!("Timed out connecting to {}", addr)))?
        .map_err(|e| ChatError::connection(format!("Failed to connect to {}: {}", addr, e)))?;

        info!("Connected to the server on {}", addr);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            displaying: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Run against the process console until either side closes
    pub async fn run(self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run_with(stdin, tokio::io::stdout()).await
    }

    /// Run with arbitrary input and output streams
    pub async fn run_with<I, O>(self, input: I, output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        let displaying = Arc::clone(&self.displaying);
        let mut receiver = tokio::spawn(display_incoming(self.reader, output, displaying));

        tokio::select! {
            sent = forward_input(input, self.writer, Arc::clone(&self.displaying)) => {
                receiver.abort();
                sent
            }
            received = &mut receiver => {
                match received {
                    Ok(result) => result,
                    Err(e) => Err(ChatError::internal(format!("receiver task failed: {}", e))),
                }
            }
        }
    }
}

/// Copy server output to `output` while display is enabled
async fn display_incoming<R, O>(mut reader: R, mut output: O, displaying: Arc<AtomicBool>) -> Result<()>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            info!("Connection closed by server");
            return Ok(());
        }
        if displaying.load(Ordering::SeqCst) {
            output.write_all(&buf[..n]).await?;
            output.flush().await?;
        } else {
            debug!("hidden {} bytes while disconnected", n);
        }
    }
}

/// Send each non-blank input line to the server
async fn forward_input<I, W>(input: I, mut writer: W, displaying: Arc<AtomicBool>) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match InputAction::classify(&line) {
            InputAction::Skip => continue,
            InputAction::SendAndMute => displaying.store(false, Ordering::SeqCst),
            InputAction::SendAndUnmute => displaying.store(true, Ordering::SeqCst),
            InputAction::Send => {}
        }

        let mut wire = line.trim().to_string();
        wire.push('\n');
        if let Err(e) = writer.write_all(wire.as_bytes()).await {
            error!("Chat sending error: {}", e);
            return Err(e.into());
        }
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ChatClientConfig::default();
        assert_eq!(config.server_addr(), "127.0.0.1:8000");
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_input_classification() {
        assert_eq!(InputAction::classify("   "), InputAction::Skip);
        assert_eq!(InputAction::classify("/disconnect"), InputAction::SendAndMute);
        assert_eq!(InputAction::classify(" /reconnect "), InputAction::SendAndUnmute);
        assert_eq!(InputAction::classify("hello"), InputAction::Send);
    }

    #[tokio::test]
    async fn test_forward_input_skips_blank_and_tracks_display() {
        let input: &[u8] = b"hello\n\n   \n/disconnect\n";
        let (writer, mut server) = tokio::io::duplex(1024);
        let displaying = Arc::new(AtomicBool::new(true));

        forward_input(input, writer, Arc::clone(&displaying))
            .await
            .unwrap();

        let mut sent = String::new();
        server.read_to_string(&mut sent).await.unwrap();
        assert_eq!(sent, "hello\n/disconnect\n");
        assert!(!displaying.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_display_incoming_respects_mute() {
        let (mut server, reader) = tokio::io::duplex(1024);
        let (output, mut screen) = tokio::io::duplex(1024);
        let displaying = Arc::new(AtomicBool::new(false));

        server.write_all(b"hidden\n").await.unwrap();
        drop(server);
        display_incoming(reader, output, displaying).await.unwrap();

        let mut shown = String::new();
        screen.read_to_string(&mut shown).await.unwrap();
        assert!(shown.is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ChatClientConfig {
            port,
            ..ChatClientConfig::default()
        };
        assert!(matches!(
            ChatClient::connect(&config).await,
            Err(ChatError::Connection(_))
        ));
    }
}
