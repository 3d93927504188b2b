//! Change notifications for open views.

use std::path::PathBuf;
use tokio::sync::broadcast;

/// Something changed in the store or its backups; subscribers re-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    InvoicePosted(i64),
    InvoiceDeleted(i64),
    InventoryChanged,
    ClientsChanged,
    SettingsChanged,
    BackupCompleted(PathBuf),
    BackupFailed(String),
    MailDeliveryFailed(String),
    Restored { snapshot: PathBuf, safety_copy: PathBuf },
}

/// Fan-out channel. Sending never blocks and never fails the sender.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<StoreEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for store event");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
