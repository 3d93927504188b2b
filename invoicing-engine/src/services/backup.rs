//! Store snapshots, rotation, mailing and restore.
//!
//! Copies of the live store file are taken while holding the store's write
//! gate, so a snapshot always reflects a committed state.

use crate::error::{BackupError, MailError};
use crate::models::{BackupSchedule, BackupSettings, BackupSnapshot};
use crate::services::database::WriteGate;
use crate::services::events::{Notifier, StoreEvent};
use crate::services::mailer::{EmailMessage, MailTransport};
use crate::services::metrics::BACKUPS_TOTAL;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const SNAPSHOT_PREFIX: &str = "backup_";
const SAFETY_COPY_PREFIX: &str = "pre_restore_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailOutcome {
    /// No recipient configured.
    NotConfigured,
    Delivered,
    /// Snapshot was kept; only delivery failed.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub snapshot: BackupSnapshot,
    pub pruned: Vec<PathBuf>,
    pub mail: MailOutcome,
}

#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Skipped,
    BackedUp(BackupReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub snapshot: PathBuf,
    pub safety_copy: PathBuf,
}

/// Timestamp of the last successful backup, kept in its own file so it
/// survives a restore of the store.
#[derive(Debug, Clone)]
pub struct LastBackupStore {
    path: PathBuf,
}

impl LastBackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Option<DateTime<Utc>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read last backup time");
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed last backup time");
                None
            }
        }
    }

    pub async fn save(&self, at: DateTime<Utc>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, at.to_rfc3339()).await
    }
}

/// Backup scheduler core. Holds no timer; [`crate::services::BackupScheduler`]
/// drives [`BackupManager::check`] periodically.
pub struct BackupManager {
    store_path: PathBuf,
    gate: WriteGate,
    last_backup: LastBackupStore,
    mailer: Arc<dyn MailTransport>,
    mail_timeout: Duration,
    notifier: Notifier,
}

impl BackupManager {
    pub fn new(
        store_path: impl Into<PathBuf>,
        gate: WriteGate,
        last_backup: LastBackupStore,
        mailer: Arc<dyn MailTransport>,
        mail_timeout: Duration,
        notifier: Notifier,
    ) -> Self {
        Self {
            store_path: store_path.into(),
            gate,
            last_backup,
            mailer,
            mail_timeout,
            notifier,
        }
    }

    /// Whether a backup is due. With no recorded backup, any enabled schedule is due.
    pub fn is_due(
        schedule: BackupSchedule,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(interval) = schedule.interval() else {
            return false;
        };
        match last {
            None => true,
            Some(last) => now.signed_duration_since(last) >= interval,
        }
    }

    pub async fn last_backup(&self) -> Option<DateTime<Utc>> {
        self.last_backup.load().await
    }

    /// One scheduler cycle: back up only when the schedule says so.
    pub async fn check(&self, settings: &BackupSettings) -> Result<CheckOutcome, BackupError> {
        self.check_at(settings, Utc::now()).await
    }

    #[instrument(skip(self, settings), fields(schedule = ?settings.schedule))]
    pub async fn check_at(
        &self,
        settings: &BackupSettings,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, BackupError> {
        let last = self.last_backup.load().await;
        if !Self::is_due(settings.schedule, last, now) {
            BACKUPS_TOTAL.with_label_values(&["skipped"]).inc();
            return Ok(CheckOutcome::Skipped);
        }

        self.backup_at(settings, now)
            .await
            .map(CheckOutcome::BackedUp)
    }

    /// Take a snapshot regardless of schedule.
    pub async fn backup_now(&self, settings: &BackupSettings) -> Result<BackupReport, BackupError> {
        self.backup_at(settings, Utc::now()).await
    }

    /// Snapshot, record, rotate, mail. Only the copy itself is fatal.
    #[instrument(skip(self, settings), fields(folder = %settings.folder.display()))]
    pub async fn backup_at(
        &self,
        settings: &BackupSettings,
        now: DateTime<Utc>,
    ) -> Result<BackupReport, BackupError> {
        let snapshot = match self.copy_snapshot(&settings.folder, now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                BACKUPS_TOTAL.with_label_values(&["copy_failed"]).inc();
                error!(error = %e, "Backup failed");
                self.notifier.notify(StoreEvent::BackupFailed(e.to_string()));
                return Err(e);
            }
        };

        BACKUPS_TOTAL.with_label_values(&["created"]).inc();
        info!(snapshot = %snapshot.path.display(), "Backup created");

        if let Err(e) = self.last_backup.save(now).await {
            warn!(error = %e, "Backup created but last backup time was not recorded");
        }

        let pruned = match self.rotate(&settings.folder, settings.retention.max(1)).await {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "Backup created but rotation failed");
                Vec::new()
            }
        };

        let mail = match &settings.recipient {
            None => MailOutcome::NotConfigured,
            Some(recipient) => self.mail_snapshot(recipient, &snapshot, now).await,
        };

        self.notifier
            .notify(StoreEvent::BackupCompleted(snapshot.path.clone()));

        Ok(BackupReport {
            snapshot,
            pruned,
            mail,
        })
    }

    async fn copy_snapshot(
        &self,
        folder: &Path,
        now: DateTime<Utc>,
    ) -> Result<BackupSnapshot, BackupError> {
        if let Err(source) = ensure_folder(folder).await {
            return Err(BackupError::CopyFailed {
                from: self.store_path.clone(),
                to: folder.to_path_buf(),
                source,
            });
        }

        let _writer = self.gate.acquire().await;

        let (path, sequence) = free_name(folder, SNAPSHOT_PREFIX, now, self.extension()).await;
        if let Err(source) = tokio::fs::copy(&self.store_path, &path).await {
            tokio::fs::remove_file(&path).await.ok();
            return Err(BackupError::CopyFailed {
                from: self.store_path.clone(),
                to: path,
                source,
            });
        }

        Ok(BackupSnapshot {
            created_at: truncate_to_seconds(now),
            sequence,
            path,
        })
    }

    async fn mail_snapshot(
        &self,
        recipient: &str,
        snapshot: &BackupSnapshot,
        now: DateTime<Utc>,
    ) -> MailOutcome {
        let file_name = snapshot
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let message = EmailMessage {
            to: recipient.to_string(),
            subject: format!("Database backup - {}", now.format("%Y-%m-%d %H:%M:%S UTC")),
            body_text: format!(
                "Database backup\n\nTaken at: {}\nAttached file: {}\n\nKeep this file somewhere safe.\n",
                now.format("%Y-%m-%d %H:%M:%S UTC"),
                file_name
            ),
            attachment: Some(snapshot.path.clone()),
        };

        let reason = match tokio::time::timeout(self.mail_timeout, self.mailer.send(&message)).await
        {
            Ok(Ok(())) => {
                info!(to = %recipient, snapshot = %file_name, "Backup mailed");
                return MailOutcome::Delivered;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => MailError::Timeout(self.mail_timeout).to_string(),
        };

        BACKUPS_TOTAL.with_label_values(&["mail_failed"]).inc();
        warn!(to = %recipient, error = %reason, "Backup kept but could not be mailed");
        self.notifier
            .notify(StoreEvent::MailDeliveryFailed(reason.clone()));
        MailOutcome::Failed(reason)
    }

    /// Keep the `keep` newest `backup_*` snapshots, deleting the rest oldest
    /// first. Returns the deleted paths. Safety copies are never touched.
    #[instrument(skip(self))]
    pub async fn rotate(&self, folder: &Path, keep: usize) -> Result<Vec<PathBuf>, BackupError> {
        let snapshots = self.list_snapshots(folder).await?;

        let mut pruned = Vec::new();
        for snapshot in snapshots.into_iter().skip(keep).rev() {
            match tokio::fs::remove_file(&snapshot.path).await {
                Ok(()) => pruned.push(snapshot.path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %snapshot.path.display(), error = %e, "Failed to delete old backup");
                }
            }
        }

        if !pruned.is_empty() {
            info!(count = pruned.len(), "Old backups rotated out");
        }
        Ok(pruned)
    }

    /// `backup_*` snapshots in `folder`, newest first.
    pub async fn list_snapshots(&self, folder: &Path) -> Result<Vec<BackupSnapshot>, BackupError> {
        let mut entries = match tokio::fs::read_dir(folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BackupError::Folder {
                    path: folder.to_path_buf(),
                    source,
                })
            }
        };

        let mut snapshots = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(BackupError::Folder {
                        path: folder.to_path_buf(),
                        source,
                    })
                }
            };
            let path = entry.path();
            if let Some((created_at, sequence)) = parse_snapshot_name(&path, SNAPSHOT_PREFIX) {
                snapshots.push(BackupSnapshot {
                    created_at,
                    sequence,
                    path,
                });
            }
        }

        snapshots.sort_by(|a, b| {
            (b.created_at, b.sequence).cmp(&(a.created_at, a.sequence))
        });
        Ok(snapshots)
    }

    /// Replace the live store with `snapshot`, keeping a `pre_restore_*` copy
    /// of the current store first. All connections to the store must be
    /// closed before calling this.
    #[instrument(skip(self, settings), fields(snapshot = %snapshot.display()))]
    pub async fn restore(
        &self,
        snapshot: &Path,
        settings: &BackupSettings,
    ) -> Result<RestoreReport, BackupError> {
        if !tokio::fs::try_exists(snapshot).await.unwrap_or(false) {
            return Err(BackupError::SnapshotMissing(snapshot.to_path_buf()));
        }
        if let Err(source) = ensure_folder(&settings.folder).await {
            error!(error = %source, "Backup folder unusable, restore aborted");
            return Err(BackupError::RestoreSafetyCopyFailed {
                path: settings.folder.clone(),
                source,
            });
        }

        let _writer = self.gate.acquire().await;

        let (safety_copy, _) =
            free_name(&settings.folder, SAFETY_COPY_PREFIX, Utc::now(), self.extension()).await;
        if let Err(source) = tokio::fs::copy(&self.store_path, &safety_copy).await {
            tokio::fs::remove_file(&safety_copy).await.ok();
            error!(error = %source, "Safety copy failed, restore aborted");
            return Err(BackupError::RestoreSafetyCopyFailed {
                path: safety_copy,
                source,
            });
        }

        let staged = self.store_path.with_extension("restore.tmp");
        if let Err(source) = replace_file(snapshot, &staged, &self.store_path).await {
            tokio::fs::remove_file(&staged).await.ok();
            error!(error = %source, safety_copy = %safety_copy.display(), "Restore failed");
            return Err(BackupError::RestoreFailed {
                snapshot: snapshot.to_path_buf(),
                source,
            });
        }

        // A leftover rollback journal would be replayed against the restored file.
        let mut journal = self.store_path.clone().into_os_string();
        journal.push("-journal");
        tokio::fs::remove_file(PathBuf::from(journal)).await.ok();

        BACKUPS_TOTAL.with_label_values(&["restored"]).inc();
        info!(safety_copy = %safety_copy.display(), "Store restored from backup");

        self.notifier.notify(StoreEvent::Restored {
            snapshot: snapshot.to_path_buf(),
            safety_copy: safety_copy.clone(),
        });

        Ok(RestoreReport {
            snapshot: snapshot.to_path_buf(),
            safety_copy,
        })
    }

    fn extension(&self) -> &str {
        self.store_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("db")
    }
}

async fn ensure_folder(folder: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(folder).await
}

/// Copies `source` next to `target`, then renames it into place.
async fn replace_file(source: &Path, staged: &Path, target: &Path) -> std::io::Result<()> {
    tokio::fs::copy(source, staged).await?;
    tokio::fs::rename(staged, target).await
}

/// `{prefix}{YYYYMMDD_HHMMSS}.{ext}`, with `_<n>` appended when taken.
async fn free_name(
    folder: &Path,
    prefix: &str,
    now: DateTime<Utc>,
    extension: &str,
) -> (PathBuf, u32) {
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    let mut sequence = 0_u32;
    loop {
        let name = if sequence == 0 {
            format!("{}{}.{}", prefix, stamp, extension)
        } else {
            format!("{}{}_{}.{}", prefix, stamp, sequence, extension)
        };
        let path = folder.join(name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return (path, sequence);
        }
        sequence += 1;
    }
}

fn parse_snapshot_name(path: &Path, prefix: &str) -> Option<(DateTime<Utc>, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(prefix)?;
    let stamp = rest.get(..15)?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

    let sequence = match &rest[15..] {
        "" => 0,
        suffix => suffix.strip_prefix('_')?.parse().ok()?,
    };

    Some((Utc.from_utc_datetime(&naive), sequence))
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn due_when_never_backed_up() {
        let now = at("2026-05-01T12:00:00Z");
        assert!(BackupManager::is_due(BackupSchedule::Daily, None, now));
        assert!(BackupManager::is_due(BackupSchedule::EveryDays(3), None, now));
        assert!(!BackupManager::is_due(BackupSchedule::Disabled, None, now));
    }

    #[test]
    fn due_after_schedule_interval() {
        let now = at("2026-05-01T12:00:00Z");
        let cases = [
            (BackupSchedule::Daily, ChronoDuration::hours(23), false),
            (BackupSchedule::Daily, ChronoDuration::hours(24), true),
            (BackupSchedule::Weekly, ChronoDuration::days(6), false),
            (BackupSchedule::Weekly, ChronoDuration::days(7), true),
            (BackupSchedule::Monthly, ChronoDuration::days(29), false),
            (BackupSchedule::Monthly, ChronoDuration::days(30), true),
            (BackupSchedule::EveryDays(3), ChronoDuration::days(2), false),
            (BackupSchedule::EveryDays(3), ChronoDuration::days(3), true),
            (BackupSchedule::Disabled, ChronoDuration::days(365), false),
        ];

        for (schedule, age, expected) in cases {
            assert_eq!(
                BackupManager::is_due(schedule, Some(now - age), now),
                expected,
                "{:?} after {:?}",
                schedule,
                age
            );
        }
    }

    #[test]
    fn parses_snapshot_names_with_collision_suffix() {
        let plain = parse_snapshot_name(Path::new("b/backup_20260501_120000.db"), SNAPSHOT_PREFIX);
        let suffixed =
            parse_snapshot_name(Path::new("b/backup_20260501_120000_2.db"), SNAPSHOT_PREFIX);

        assert_eq!(plain, Some((at("2026-05-01T12:00:00Z"), 0)));
        assert_eq!(suffixed, Some((at("2026-05-01T12:00:00Z"), 2)));
    }

    #[test]
    fn ignores_foreign_files() {
        for name in [
            "pre_restore_20260501_120000.db",
            "backup_notes.txt",
            "backup_20260501_120000_x.db",
            "inventory.db",
        ] {
            assert_eq!(
                parse_snapshot_name(Path::new(name), SNAPSHOT_PREFIX),
                None,
                "{}",
                name
            );
        }
    }

    #[tokio::test]
    async fn last_backup_round_trips_and_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastBackupStore::new(dir.path().join("last_backup.txt"));

        assert_eq!(store.load().await, None);

        let when = at("2026-05-01T12:00:00Z");
        store.save(when).await.unwrap();
        assert_eq!(store.load().await, Some(when));

        tokio::fs::write(dir.path().join("last_backup.txt"), "yesterday")
            .await
            .unwrap();
        assert_eq!(store.load().await, None);
    }
}
