//! Services module for invoicing-engine.

pub mod backup;
pub mod database;
pub mod events;
pub mod issuance;
pub mod ledger;
pub mod mailer;
pub mod metrics;
pub mod renderer;
pub mod scheduler;
pub mod settings;

pub use backup::{
    BackupManager, BackupReport, CheckOutcome, LastBackupStore, MailOutcome, RestoreReport,
};
pub use database::{Database, WriteGate};
pub use events::{Notifier, StoreEvent};
pub use issuance::{InvoiceEngine, IssuedInvoice};
pub use ledger::InvoiceLedger;
pub use mailer::{EmailMessage, MailTransport, MockMailer, SmtpMailer};
pub use metrics::{get_metrics, init_metrics};
pub use renderer::DocumentRenderer;
pub use scheduler::{BackupScheduler, SchedulerHandle};
pub use settings::SettingsStore;
