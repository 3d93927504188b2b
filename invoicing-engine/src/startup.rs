//! Application startup and lifecycle management.

use crate::config::EngineConfig;
use crate::services::{
    get_metrics, init_metrics, BackupManager, BackupScheduler, Database, InvoiceEngine,
    InvoiceLedger, LastBackupStore, MailTransport, Notifier, RestoreReport, SchedulerHandle,
    SettingsStore, SmtpMailer, WriteGate,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tillbook_core::error::AppError;

/// Everything wired together over one store file.
pub struct Application {
    config: EngineConfig,
    gate: WriteGate,
    db: Database,
    notifier: Notifier,
    engine: InvoiceEngine,
    ledger: InvoiceLedger,
    settings: Arc<SettingsStore>,
    backups: Arc<BackupManager>,
    scheduler: Option<SchedulerHandle>,
}

impl Application {
    /// Build the application with the SMTP mailer from configuration and
    /// start the backup scheduler.
    pub async fn build(config: EngineConfig) -> Result<Self, AppError> {
        let mailer = SmtpMailer::new(config.smtp.clone()).map_err(|e| {
            tracing::error!(error = %e, "Failed to create SMTP mailer");
            AppError::EmailError(e.to_string())
        })?;

        let mut app = Self::build_with_mailer(config, Arc::new(mailer)).await?;
        app.start_scheduler();
        Ok(app)
    }

    /// Build without starting the scheduler. Use this in tests with a mock mailer.
    pub async fn build_with_mailer(
        config: EngineConfig,
        mailer: Arc<dyn MailTransport>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let notifier = Notifier::default();
        let gate = WriteGate::new();

        let db = Self::open_store(&config, gate.clone(), notifier.clone()).await?;

        let settings = Arc::new(
            SettingsStore::open(&config.settings_path, notifier.clone())
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to load settings");
                    e
                })?,
        );

        let backups = Arc::new(BackupManager::new(
            config.database.path.clone(),
            gate.clone(),
            LastBackupStore::new(config.last_backup_path.clone()),
            mailer,
            config.scheduler.mail_timeout,
            notifier.clone(),
        ));

        Ok(Self {
            engine: InvoiceEngine::new(db.clone(), notifier.clone()),
            ledger: InvoiceLedger::new(db.clone(), notifier.clone()),
            config,
            gate,
            db,
            notifier,
            settings,
            backups,
            scheduler: None,
        })
    }

    async fn open_store(
        config: &EngineConfig,
        gate: WriteGate,
        notifier: Notifier,
    ) -> Result<Database, AppError> {
        let db = Database::connect(&config.database.path, config.database.max_connections, gate)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to open SQLite store");
                e
            })?
            .with_notifier(notifier);

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        db.health_check().await.map_err(|e| {
            tracing::error!(error = %e, "SQLite store failed its health check");
            e
        })?;

        Ok(db)
    }

    /// Start the periodic backup check if it is not running yet.
    pub fn start_scheduler(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        let scheduler = BackupScheduler::new(
            self.backups.clone(),
            self.settings.clone(),
            self.config.scheduler.period,
        );
        self.scheduler = Some(scheduler.start());
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn engine(&self) -> &InvoiceEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &InvoiceLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn scheduler(&self) -> Option<&SchedulerHandle> {
        self.scheduler.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Replace the live store with `snapshot` and reopen every handle on it.
    ///
    /// The pool is closed first so no connection keeps the old file open. If
    /// the restore fails the original store is reopened.
    pub async fn restore_backup(&mut self, snapshot: &Path) -> Result<RestoreReport, AppError> {
        let settings = self.settings.backup_settings().await;

        self.db.close().await;
        let restored = self.backups.restore(snapshot, &settings).await;

        let db = Self::open_store(&self.config, self.gate.clone(), self.notifier.clone()).await?;
        self.engine = InvoiceEngine::new(db.clone(), self.notifier.clone());
        self.ledger = InvoiceLedger::new(db.clone(), self.notifier.clone());
        self.db = db;

        restored.map_err(|e| {
            tracing::error!(error = %e, "Restore failed");
            AppError::InternalError(anyhow::Error::new(e))
        })
    }

    /// Run until `shutdown` resolves, then stop the scheduler and close the store.
    pub async fn run_until_stopped(self, shutdown: impl Future<Output = ()>) {
        tracing::info!(
            store = %self.config.database.path.display(),
            "invoicing-engine running"
        );

        shutdown.await;

        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown().await;
        }
        tracing::info!(metrics = %get_metrics(), "Metrics at shutdown");
        self.db.close().await;
    }
}
