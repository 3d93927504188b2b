//! Periodic backup checks and on-demand backups, independent of any UI.

use crate::config::SchedulerConfig;
use crate::error::BackupError;
use crate::services::backup::{BackupManager, BackupReport, CheckOutcome};
use crate::services::settings::SettingsStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type BackupRequest = oneshot::Sender<Result<BackupReport, BackupError>>;

pub struct BackupScheduler {
    manager: Arc<BackupManager>,
    settings: Arc<SettingsStore>,
    period: Duration,
}

impl BackupScheduler {
    /// A zero `period` falls back to the default check period.
    pub fn new(manager: Arc<BackupManager>, settings: Arc<SettingsStore>, period: Duration) -> Self {
        let period = if period.is_zero() {
            let fallback = SchedulerConfig::default().period;
            tracing::warn!(
                fallback_secs = fallback.as_secs(),
                "Backup check period must be non-zero, using the default"
            );
            fallback
        } else {
            period
        };

        Self {
            manager,
            settings,
            period,
        }
    }

    /// Spawn the scheduler task. The first check runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let (requests_tx, mut requests_rx) = mpsc::channel::<BackupRequest>(8);
        let shutdown_token = CancellationToken::new();
        let shutdown = shutdown_token.clone();

        tracing::info!(period_secs = self.period.as_secs(), "Starting backup scheduler");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::info!("Backup scheduler shutting down");
                        break;
                    }
                    Some(reply) = requests_rx.recv() => {
                        let settings = self.settings.backup_settings().await;
                        let result = self.manager.backup_now(&settings).await;
                        if reply.send(result).is_err() {
                            tracing::debug!("Backup requester went away before the result");
                        }
                    }
                    _ = ticker.tick() => {
                        let settings = self.settings.backup_settings().await;
                        match self.manager.check(&settings).await {
                            Ok(CheckOutcome::Skipped) => {
                                tracing::debug!("Backup not due");
                            }
                            Ok(CheckOutcome::BackedUp(report)) => {
                                tracing::info!(
                                    snapshot = %report.snapshot.path.display(),
                                    pruned = report.pruned.len(),
                                    "Scheduled backup completed"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Scheduled backup failed, will retry next cycle");
                            }
                        }
                    }
                }
            }
        });

        SchedulerHandle {
            requests: requests_tx,
            shutdown_token,
            task,
        }
    }
}

pub struct SchedulerHandle {
    requests: mpsc::Sender<BackupRequest>,
    shutdown_token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Take a snapshot now, outside the schedule, and wait for the result.
    pub async fn backup_now(&self) -> Result<BackupReport, BackupError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .await
            .map_err(|_| BackupError::SchedulerStopped)?;
        reply_rx.await.map_err(|_| BackupError::SchedulerStopped)?
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for an in-flight backup to finish.
    pub async fn shutdown(self) {
        tracing::info!("Initiating backup scheduler shutdown");
        self.shutdown_token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Backup scheduler task failed");
        }
    }
}
