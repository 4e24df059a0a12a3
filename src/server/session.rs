//! Per-connection session handling
//!
//! Drives one TCP connection through its lifecycle:
//!
//! ```text
//! Connecting -> Handshaking -> Active -> Closed
//! ```
//!
//! The handshake asks for a name, takes the recent public history, registers
//! the session, then sends the replay and the welcome line. While active the task
//! multiplexes inbound lines (handed to the router) with lines queued for
//! this session by other tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::protocol::{ChatLineCodec, OutboundLine};
use crate::server::ServerState;
use crate::server::registry::SessionHandle;

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepted, prompt not yet sent
    Connecting,
    /// Waiting for a usable name
    Handshaking,
    /// Registered and exchanging messages
    Active,
    /// Torn down
    Closed,
}

/// Per-connection handler
pub struct SessionHandler<S> {
    framed: Framed<S, ChatLineCodec>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    phase: SessionPhase,
}

impl<S> SessionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, addr: SocketAddr, state: Arc<ServerState>) -> Self {
        let codec = ChatLineCodec::with_max_length(state.config.max_line_length);
        Self {
            framed: Framed::new(stream, codec),
            addr,
            state,
            phase: SessionPhase::Connecting,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Run the session to completion.
    /// This is the main entry point that should be spawned as a task.
    pub async fn run(mut self) -> Result<()> {
        info!("New connection from {}", self.addr);

        let (handle, outbound) = SessionHandle::channel();

        let (name, replay) = match self.handshake(&handle).await {
            Ok(Some(joined)) => joined,
            Ok(None) => {
                debug!("{} left during handshake", self.addr);
                self.phase = SessionPhase::Closed;
                return Ok(());
            }
            Err(e) => {
                self.phase = SessionPhase::Closed;
                return Err(e);
            }
        };

        // Registered from here on: every exit path must unregister.
        let result = match self.greet(&name, replay).await {
            Ok(()) => self.serve(&name, &handle, outbound).await,
            Err(e) => Err(e),
        };

        self.phase = SessionPhase::Closed;
        self.state.registry.unregister(handle.id()).await;
        match &result {
            Ok(()) => info!(name = %name, "Connection from {} closed", self.addr),
            Err(e) => info!(name = %name, "Connection from {} closed: {}", self.addr, e),
        }
        result
    }

    /// Prompt until a name is accepted and registered.
    ///
    /// The new-client replay is taken before registering, so nothing
    /// broadcast afterwards can show up both in the replay and on the
    /// session's queue. Returns `None` if the peer goes away before
    /// picking a name.
    async fn handshake(
        &mut self,
        handle: &SessionHandle,
    ) -> Result<Option<(String, Vec<OutboundLine>)>> {
        self.phase = SessionPhase::Handshaking;

        loop {
            self.framed.send(OutboundLine::Prompt).await?;

            let Some(line) = self.framed.next().await.transpose()? else {
                return Ok(None);
            };
            let name = line.trim().to_string();
            let replay = self.state.replay.for_new_client().await;

            match self.state.registry.register(handle.clone(), &name).await {
                Ok(()) => {
                    info!(name = %name, "Client connected from {}", self.addr);
                    return Ok(Some((name, replay)));
                }
                Err(ChatError::NameRejected(reason)) => {
                    debug!("{} name '{}' rejected: {}", self.addr, name, reason);
                    self.framed.send(OutboundLine::notice(reason)).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send the replay followed by the welcome line
    async fn greet(&mut self, name: &str, replay: Vec<OutboundLine>) -> Result<()> {
        for line in replay {
            self.framed.feed(line).await?;
        }
        self.framed.send(OutboundLine::welcome(name)).await?;

        self.phase = SessionPhase::Active;
        Ok(())
    }

    /// Active loop: inbound lines go to the router, queued lines go out.
    async fn serve(
        &mut self,
        name: &str,
        handle: &SessionHandle,
        mut outbound: mpsc::UnboundedReceiver<OutboundLine>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                frame = self.framed.next() => {
                    let line = match frame {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    };

                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    if let Err(e) = self.state.router.route(name, handle, line).await {
                        if !e.is_recoverable() {
                            return Err(e);
                        }
                        warn!(name = %name, "rejected line: {}", e);
                        self.framed.send(OutboundLine::notice(e.to_string())).await?;
                    }
                }

                Some(line) = outbound.recv() => {
                    self.framed.send(line).await?;
                }
            }
        }
    }
}
