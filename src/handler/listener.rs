//! Transfer notifications
//!
//! `fetch` and `put` report the start and end of each transfer to an
//! optional listener.

use std::fmt;

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Download,
    Upload,
}

impl TransferDirection {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Download => "download",
            TransferDirection::Upload => "upload",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transfer as seen by a listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub url: String,
    pub direction: TransferDirection,
    /// Size of the transfer, when known up front
    pub total_bytes: Option<u64>,
    /// Bytes moved so far; equals the transfer size on completion
    pub transferred_bytes: u64,
}

impl TransferEvent {
    pub(crate) fn started(url: &str, direction: TransferDirection, total_bytes: Option<u64>) -> Self {
        Self {
            url: url.to_string(),
            direction,
            total_bytes,
            transferred_bytes: 0,
        }
    }

    pub(crate) fn completed(mut self, transferred_bytes: u64) -> Self {
        self.transferred_bytes = transferred_bytes;
        self
    }
}

/// Receives transfer start and completion notifications
pub trait TransferListener: Send + Sync {
    /// Called once the transfer is about to move bytes
    fn transfer_started(&self, _event: &TransferEvent) {}

    /// Called after the last byte was written
    fn transfer_completed(&self, _event: &TransferEvent) {}
}

/// Listener that logs transfers through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl TransferListener for LoggingListener {
    fn transfer_started(&self, event: &TransferEvent) {
        tracing::debug!(
            url = %event.url,
            direction = %event.direction,
            total_bytes = ?event.total_bytes,
            "Transfer started"
        );
    }

    fn transfer_completed(&self, event: &TransferEvent) {
        tracing::info!(
            url = %event.url,
            direction = %event.direction,
            bytes = event.transferred_bytes,
            "Transfer completed"
        );
    }
}
