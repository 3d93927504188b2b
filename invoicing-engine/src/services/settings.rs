//! Persisted key/value settings with typed views for the engine.

use crate::models::{
    BackupSchedule, BackupSettings, CurrencyFormat, CurrencyPosition, DocumentFormat,
    InvoiceSettings,
};
use crate::services::events::{Notifier, StoreEvent};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tillbook_core::error::AppError;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

fn defaults() -> Map<String, Value> {
    let defaults = json!({
        "company_name": "Mi Empresa",
        "invoice_prefix": "FAC",
        "invoice_folder": "invoices",
        "invoice_format": "text",
        "tax_rate": 15.0,
        "backup_folder": "backups",
        "backup_recipient_email": "",
        "backup_frequency": "daily",
        "backup_interval_days": 7,
        "backup_retention": 5,
        "currency_symbol": "L",
        "currency_position": "before",
        "decimal_separator": ".",
        "thousands_separator": ","
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// JSON-file settings store.
///
/// Relative folder settings resolve against the directory holding the file.
pub struct SettingsStore {
    path: PathBuf,
    base_dir: PathBuf,
    values: RwLock<Map<String, Value>>,
    notifier: Notifier,
}

impl SettingsStore {
    /// Load the file, filling in defaults for missing keys.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>, notifier: Notifier) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut values = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "Settings file {} is not a JSON object",
                        path.display()
                    )))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        let mut missing = false;
        for (key, value) in defaults() {
            if !values.contains_key(&key) {
                values.insert(key, value);
                missing = true;
            }
        }

        let store = Self {
            path,
            base_dir,
            values: RwLock::new(values),
            notifier,
        };

        if missing {
            let values = store.values.read().await;
            store.persist(&values).await?;
        }

        info!("Settings loaded");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value of `key`, if set.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    /// Value of `key` converted to `T`, or `default` when unset or of another type.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_value(key).await {
            Some(Value::Null) | None => default,
            Some(value) => serde_json::from_value(value).unwrap_or(default),
        }
    }

    /// Store `value` under `key`, persist, and notify subscribers.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: impl Serialize) -> Result<(), AppError> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid value for {}: {}", key, e)))?;

        let mut values = self.values.write().await;
        values.insert(key.to_string(), value);
        self.persist(&values).await?;
        drop(values);

        self.notifier.notify(StoreEvent::SettingsChanged);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reset_to_defaults(&self) -> Result<(), AppError> {
        let mut values = self.values.write().await;
        *values = defaults();
        self.persist(&values).await?;
        drop(values);

        self.notifier.notify(StoreEvent::SettingsChanged);
        Ok(())
    }

    /// Snapshot of everything a post needs.
    pub async fn invoice_settings(&self) -> InvoiceSettings {
        let values = self.values.read().await;

        let tax_percent = values
            .get("tax_rate")
            .and_then(decimal_value)
            .unwrap_or_else(|| Decimal::from(15));

        InvoiceSettings {
            company_name: string_value(&values, "company_name"),
            tax_rate: tax_percent / Decimal::ONE_HUNDRED,
            prefix: string_value(&values, "invoice_prefix"),
            folder: self.resolve(&string_value(&values, "invoice_folder")),
            format: DocumentFormat::from_string(&string_value(&values, "invoice_format")),
            currency: CurrencyFormat {
                symbol: string_value(&values, "currency_symbol"),
                position: match string_value(&values, "currency_position").as_str() {
                    "after" => CurrencyPosition::After,
                    _ => CurrencyPosition::Before,
                },
                decimal_separator: string_value(&values, "decimal_separator"),
                thousands_separator: string_value(&values, "thousands_separator"),
            },
        }
    }

    /// Snapshot of the backup configuration; re-read on every scheduler cycle.
    pub async fn backup_settings(&self) -> BackupSettings {
        let values = self.values.read().await;

        let interval_days = values
            .get("backup_interval_days")
            .and_then(Value::as_u64)
            .and_then(|days| u32::try_from(days).ok())
            .unwrap_or(7);
        let retention = values
            .get("backup_retention")
            .and_then(Value::as_u64)
            .and_then(|keep| usize::try_from(keep).ok())
            .unwrap_or(5);
        let recipient = string_value(&values, "backup_recipient_email");

        BackupSettings {
            folder: self.resolve(&string_value(&values, "backup_folder")),
            schedule: BackupSchedule::from_setting(
                &string_value(&values, "backup_frequency"),
                interval_days,
            ),
            retention,
            recipient: Some(recipient.trim().to_string()).filter(|r| !r.is_empty()),
        }
    }

    fn resolve(&self, folder: &str) -> PathBuf {
        let folder = PathBuf::from(folder);
        if folder.is_absolute() {
            folder
        } else {
            self.base_dir.join(folder)
        }
    }

    /// Write to a sibling temp file, then rename over the original.
    async fn persist(&self, values: &Map<String, Value>) -> Result<(), AppError> {
        let raw = serde_json::to_vec_pretty(values)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode settings: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to replace settings file");
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }
}

fn string_value(values: &Map<String, Value>, key: &str) -> String {
    match values.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => defaults()
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(other) => other.to_string(),
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_writes_defaults_for_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::open(&path, Notifier::default()).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.get("invoice_prefix", String::new()).await, "FAC");
        assert_eq!(store.get("backup_retention", 0_u64).await, 5);
    }

    #[tokio::test]
    async fn set_persists_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        let store = SettingsStore::open(&path, notifier.clone()).await.unwrap();
        store.set("invoice_prefix", "INV").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), StoreEvent::SettingsChanged);

        let reopened = SettingsStore::open(&path, Notifier::default()).await.unwrap();
        assert_eq!(reopened.get("invoice_prefix", String::new()).await, "INV");
    }

    #[tokio::test]
    async fn invoice_settings_converts_percent_and_resolves_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"), Notifier::default())
            .await
            .unwrap();
        store.set("tax_rate", 12.5).await.unwrap();

        let settings = store.invoice_settings().await;

        assert_eq!(settings.tax_rate, Decimal::from_str("0.125").unwrap());
        assert_eq!(settings.folder, dir.path().join("invoices"));
        assert_eq!(settings.format, DocumentFormat::Text);
        assert_eq!(settings.currency, CurrencyFormat::default());
    }

    #[tokio::test]
    async fn backup_settings_reads_schedule_and_recipient() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"), Notifier::default())
            .await
            .unwrap();

        let defaults = store.backup_settings().await;
        assert_eq!(defaults.schedule, BackupSchedule::Daily);
        assert_eq!(defaults.retention, 5);
        assert_eq!(defaults.recipient, None);

        store.set("backup_frequency", "interval").await.unwrap();
        store.set("backup_interval_days", 3).await.unwrap();
        store.set("backup_recipient_email", "owner@example.com").await.unwrap();

        let updated = store.backup_settings().await;
        assert_eq!(updated.schedule, BackupSchedule::EveryDays(3));
        assert_eq!(updated.recipient.as_deref(), Some("owner@example.com"));
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"), Notifier::default())
            .await
            .unwrap();
        store.set("invoice_prefix", "INV").await.unwrap();
        store.set("custom_flag", true).await.unwrap();

        store.reset_to_defaults().await.unwrap();

        assert_eq!(store.get("invoice_prefix", String::new()).await, "FAC");
        assert_eq!(store.get_value("custom_flag").await, None);
    }

    #[tokio::test]
    async fn open_rejects_non_object_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();

        let result = SettingsStore::open(&path, Notifier::default()).await;

        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
