//! Message routing
//!
//! Classifies each inbound line and dispatches it to broadcast, private
//! delivery, or the presence commands.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::history::{HistoryLog, HistoryRecord};
use crate::protocol::{Command, OutboundLine, PresenceEvent};
use crate::server::registry::{ClientRegistry, SessionHandle};
use crate::server::replay::ReplayEngine;

/// Routes lines from one session to the rest of the server
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: Arc<ClientRegistry>,
    history: Arc<HistoryLog>,
    replay: ReplayEngine,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ClientRegistry>,
        history: Arc<HistoryLog>,
        replay: ReplayEngine,
    ) -> Self {
        Self {
            registry,
            history,
            replay,
        }
    }

    /// Handle one trimmed, non-empty line from `sender`.
    ///
    /// Only a malformed command produces an error; the caller reports it to
    /// the sender and keeps the session running.
    pub async fn route(&self, sender: &str, handle: &SessionHandle, line: &str) -> Result<()> {
        let command = Command::parse(line)?;
        debug!(sender = %sender, kind = command.kind(), "routing");

        match command {
            Command::Private { recipient, body } => {
                self.handle_private(sender, handle, &recipient, body).await;
            }
            Command::Disconnect => self.handle_disconnect(sender, line).await,
            Command::Reconnect => self.handle_reconnect(sender, handle).await,
            Command::Chat(body) => self.handle_chat(sender, body).await,
        }

        Ok(())
    }

    async fn handle_private(
        &self,
        sender: &str,
        handle: &SessionHandle,
        recipient: &str,
        body: String,
    ) {
        let Some(target) = self.registry.find_handle(recipient).await else {
            info!(sender = %sender, recipient = %recipient, "private recipient not found");
            if let Err(e) = handle.send(OutboundLine::RecipientNotFound) {
                warn!(sender = %sender, "failed to notify sender: {}", e);
            }
            return;
        };

        match target.send(OutboundLine::private(sender, body.clone())) {
            Ok(()) => {
                self.history
                    .record(HistoryRecord::private(sender, body, recipient))
                    .await;
            }
            Err(e) => {
                // Recipient is tearing down but not yet unregistered
                warn!(sender = %sender, recipient = %recipient, "private delivery failed: {}", e);
                if let Err(e) = handle.send(OutboundLine::RecipientNotFound) {
                    warn!(sender = %sender, "failed to notify sender: {}", e);
                }
            }
        }
    }

    async fn handle_disconnect(&self, sender: &str, line: &str) {
        if !self.registry.mark_offline(sender).await {
            debug!(sender = %sender, "already offline, ignoring /disconnect");
            return;
        }

        self.registry
            .broadcast(OutboundLine::presence(sender, PresenceEvent::Disconnect))
            .await;
        self.history.record(HistoryRecord::public(sender, line)).await;
        info!(sender = %sender, "client went offline");
    }

    async fn handle_reconnect(&self, sender: &str, handle: &SessionHandle) {
        if !self.registry.mark_online(sender).await {
            debug!(sender = %sender, "already online, ignoring /reconnect");
            return;
        }

        self.registry
            .broadcast(OutboundLine::presence(sender, PresenceEvent::Reconnect))
            .await;
        info!(sender = %sender, "client came back online");

        for line in self.replay.for_reconnect(sender).await {
            if let Err(e) = handle.send(line) {
                warn!(sender = %sender, "reconnect replay interrupted: {}", e);
                break;
            }
        }
    }

    async fn handle_chat(&self, sender: &str, body: String) {
        if !self.registry.is_online(sender).await {
            info!(sender = %sender, "dropping chat from offline client, /reconnect required");
            return;
        }

        self.registry
            .broadcast(OutboundLine::chat(sender, body.clone()))
            .await;
        self.history.record(HistoryRecord::public(sender, body)).await;
    }
}
