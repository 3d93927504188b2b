//! Backup snapshot and schedule models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A point-in-time copy of the live store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    pub created_at: DateTime<Utc>,
    /// Tie-breaker for snapshots taken within the same second.
    pub sequence: u32,
    pub path: PathBuf,
}

/// How often the periodic check takes a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupSchedule {
    Disabled,
    Daily,
    Weekly,
    Monthly,
    EveryDays(u32),
}

impl BackupSchedule {
    /// Minimum age of the last backup before another one is due.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            BackupSchedule::Disabled => None,
            BackupSchedule::Daily => Some(Duration::days(1)),
            BackupSchedule::Weekly => Some(Duration::days(7)),
            BackupSchedule::Monthly => Some(Duration::days(30)),
            BackupSchedule::EveryDays(days) => Some(Duration::days(i64::from(*days))),
        }
    }

    /// Parses the persisted frequency setting. `interval` takes the day count
    /// from `interval_days`.
    pub fn from_setting(frequency: &str, interval_days: u32) -> Self {
        match frequency {
            "daily" => BackupSchedule::Daily,
            "weekly" => BackupSchedule::Weekly,
            "monthly" => BackupSchedule::Monthly,
            "interval" if interval_days > 0 => BackupSchedule::EveryDays(interval_days),
            _ => BackupSchedule::Disabled,
        }
    }
}
