//! TCP chat server
//!
//! This module provides the accept loop and the shared state every session
//! works against.
//!
//! ## Layout
//!
//! - **registry**: attached sessions and their online/offline presence
//! - **router**: turns one inbound line into deliveries and history records
//! - **replay**: catch-up lines for new and reconnecting clients
//! - **session**: per-connection handshake and read loop

pub mod registry;
pub mod replay;
pub mod router;
pub mod session;

pub use registry::{ClientRegistry, SessionHandle, SessionId};
pub use replay::ReplayEngine;
pub use router::MessageRouter;
pub use session::{SessionHandler, SessionPhase};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::ChatConfig;
use crate::error::{ChatError, Result};
use crate::history::HistoryLog;
use crate::protocol::{ChatLineCodec, OutboundLine};

/// Notice sent to connections refused because of `max_connections`
pub const SERVER_FULL_NOTICE: &str = "Server is full, try again later.";

/// Chat server state shared between sessions
#[derive(Debug)]
pub struct ServerState {
    pub(crate) config: ChatConfig,
    pub(crate) registry: Arc<ClientRegistry>,
    pub(crate) replay: ReplayEngine,
    pub(crate) router: MessageRouter,
}

impl ServerState {
    pub fn new(config: ChatConfig) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let history = Arc::new(HistoryLog::new(config.history_path.clone()));
        let replay = ReplayEngine::new(
            Arc::clone(&history),
            config.restore_last_messages,
            config.private_replay_filter,
        );
        let router = MessageRouter::new(Arc::clone(&registry), Arc::clone(&history), replay.clone());

        Self {
            config,
            registry,
            replay,
            router,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }
}

/// Line-oriented TCP chat server
pub struct ChatServer {
    state: Arc<ServerState>,
    listener: TcpListener,
    sessions: JoinSet<()>,
}

impl ChatServer {
    /// Bind the listening socket
    pub async fn bind(config: ChatConfig) -> Result<Self> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(bind_addr.as_str())
            .await
            .map_err(|e| ChatError::network(format!("Failed to bind {}: {}", bind_addr, e)))?;

        info!("Chat server listening on {}", listener.local_addr()?);
        info!("History log: {}", config.history_path.display());

        Ok(Self {
            state: Arc::new(ServerState::new(config)),
            listener,
            sessions: JoinSet::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serve until the process exits
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then abort in-flight sessions
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_session(stream, addr).await,
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },

                Some(joined) = self.sessions.join_next() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Session task panicked: {}", e);
                        }
                    }
                }
            }
        }

        let active = self.sessions.len();
        self.sessions.shutdown().await;
        info!("Chat server shutdown completed ({} sessions closed)", active);
        Ok(())
    }

    async fn spawn_session(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.sessions.len() >= self.state.config.max_connections {
            warn!("Connection limit reached, rejecting {}", addr);
            let mut framed = Framed::new(stream, ChatLineCodec::new());
            if let Err(e) = framed.send(OutboundLine::notice(SERVER_FULL_NOTICE)).await {
                debug!("Failed to notify {}: {}", addr, e);
            }
            return;
        }

        let state = Arc::clone(&self.state);
        self.sessions.spawn(async move {
            if let Err(e) = SessionHandler::new(stream, addr, state).run().await {
                debug!("Session {} ended with error: {}", addr, e);
            }
        });
    }

    /// Get server statistics
    pub async fn get_stats(&self) -> ServerStats {
        ServerStats {
            registered_sessions: self.state.registry.session_count().await,
            online_clients: self.state.registry.online_count().await,
            active_connections: self.sessions.len(),
            bind_address: self.listener.local_addr().ok(),
        }
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub registered_sessions: usize,
    pub online_clients: usize,
    pub active_connections: usize,
    pub bind_address: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> ChatConfig {
        ChatConfig {
            port: 0,
            history_path: dir.path().join("history.jsonl"),
            ..ChatConfig::default()
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let dir = tempfile::tempdir().unwrap();
        let server = ChatServer::bind(test_config(&dir)).await.unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.state().config().restore_last_messages, 20);
    }

    #[tokio::test]
    async fn test_server_stats() {
        let dir = tempfile::tempdir().unwrap();
        let server = ChatServer::bind(test_config(&dir)).await.unwrap();

        let stats = server.get_stats().await;
        assert_eq!(stats.registered_sessions, 0);
        assert_eq!(stats.online_clients, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.bind_address, server.local_addr().ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let first = ChatServer::bind(test_config(&dir)).await.unwrap();
        let taken = first.local_addr().unwrap();

        let config = ChatConfig {
            port: taken.port(),
            ..test_config(&dir)
        };
        let err = ChatServer::bind(config).await.err().unwrap();
        assert!(matches!(err, ChatError::Network(_)));
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let server = ChatServer::bind(test_config(&dir)).await.unwrap();
        server.run_until(async {}).await.unwrap();
    }
}
