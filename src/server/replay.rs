//! Catch-up replay built from the history log
//!
//! Two selections are supported:
//!
//! - **new client**: the last `restore_last_messages` public records, in
//!   chronological order
//! - **reconnect**: every record after the client's most recent
//!   `/disconnect` marker
//!
//! Both read the whole log on every call; there is no index.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::history::{HistoryLog, HistoryRecord};
use crate::protocol::OutboundLine;

/// Last `limit` public records, oldest first
pub fn recent_public(records: &[HistoryRecord], limit: usize) -> Vec<&HistoryRecord> {
    let mut kept: Vec<&HistoryRecord> = records
        .iter()
        .rev()
        .filter(|record| record.is_public())
        .take(limit)
        .collect();
    kept.reverse();
    kept
}

/// Records strictly after the latest `/disconnect` by `name`.
///
/// Empty if `name` never disconnected. Private records between other
/// clients are included unless `participant_only` is set.
pub fn since_last_disconnect<'a>(
    records: &'a [HistoryRecord],
    name: &str,
    participant_only: bool,
) -> Vec<&'a HistoryRecord> {
    let Some(boundary) = records
        .iter()
        .rposition(|record| record.is_disconnect_by(name))
    else {
        return Vec::new();
    };

    records[boundary + 1..]
        .iter()
        .filter(|record| !participant_only || record.is_public() || record.involves(name))
        .collect()
}

/// Turns history selections into lines for one client
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    history: Arc<HistoryLog>,
    restore_last_messages: usize,
    private_replay_filter: bool,
}

impl ReplayEngine {
    pub fn new(
        history: Arc<HistoryLog>,
        restore_last_messages: usize,
        private_replay_filter: bool,
    ) -> Self {
        Self {
            history,
            restore_last_messages,
            private_replay_filter,
        }
    }

    /// Lines shown to a freshly handshaked client before the welcome
    pub async fn for_new_client(&self) -> Vec<OutboundLine> {
        if self.restore_last_messages == 0 {
            return Vec::new();
        }
        let Some(records) = self.load().await else {
            return Vec::new();
        };

        let lines: Vec<OutboundLine> = recent_public(&records, self.restore_last_messages)
            .into_iter()
            .map(OutboundLine::from)
            .collect();
        debug!(count = lines.len(), "new-client replay");
        lines
    }

    /// Lines missed by `name` since its last `/disconnect`
    pub async fn for_reconnect(&self, name: &str) -> Vec<OutboundLine> {
        let Some(records) = self.load().await else {
            return Vec::new();
        };

        let lines: Vec<OutboundLine> =
            since_last_disconnect(&records, name, self.private_replay_filter)
                .into_iter()
                .map(OutboundLine::from)
                .collect();
        debug!(name = %name, count = lines.len(), "reconnect replay");
        lines
    }

    async fn load(&self) -> Option<Vec<HistoryRecord>> {
        match self.history.scan_all().await {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(path = %self.history.path().display(), "history read failed: {}", e);
                None
            }
        }
    }
}
