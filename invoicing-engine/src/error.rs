//! Error taxonomy for posting, rendering, backups and mail delivery.

use std::path::PathBuf;
use thiserror::Error;
use tillbook_core::error::AppError;

/// Why an invoice could not be posted. Every variant means nothing was written.
#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("Invalid invoice: {0}")]
    Validation(String),

    #[error("Client {0} does not exist")]
    UnknownClient(i64),

    #[error("Product {0} does not exist")]
    UnknownProduct(i64),

    #[error("Invoice {0} does not exist")]
    UnknownInvoice(i64),

    #[error(
        "Insufficient stock for product {product_id}: {available} available, {requested} requested"
    )]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    #[error("Could not post invoice, no changes were made: {0}")]
    Persistence(#[source] AppError),

    #[error("Could not render invoice document: {0}")]
    Render(#[from] RenderError),
}

impl IssuanceError {
    /// Label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            IssuanceError::Validation(_) => "validation",
            IssuanceError::UnknownClient(_) => "unknown_client",
            IssuanceError::UnknownProduct(_) => "unknown_product",
            IssuanceError::UnknownInvoice(_) => "unknown_invoice",
            IssuanceError::InsufficientStock { .. } => "insufficient_stock",
            IssuanceError::Persistence(_) => "persistence",
            IssuanceError::Render(_) => "render",
        }
    }
}

impl From<AppError> for IssuanceError {
    fn from(err: AppError) -> Self {
        IssuanceError::Persistence(err)
    }
}

/// Document could not be written. Never rolls back a posted invoice.
#[derive(Debug, Error)]
#[error("Failed to write invoice document {path}: {source}")]
pub struct RenderError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport not enabled: {0}")]
    NotEnabled(String),

    #[error("Mail configuration error: {0}")]
    Configuration(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Mail delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to copy store {from} to snapshot {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pre-restore safety copy to {path} failed, live store untouched: {source}")]
    RestoreSafetyCopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot {0} does not exist")]
    SnapshotMissing(PathBuf),

    #[error("Failed to restore {snapshot} over the live store: {source}")]
    RestoreFailed {
        snapshot: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup folder {path} is not usable: {source}")]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup scheduler is not running")]
    SchedulerStopped,
}
