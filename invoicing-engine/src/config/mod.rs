//! Configuration module for invoicing-engine.

use secrecy::Secret;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tillbook_core::config as core_config;
use tillbook_core::error::AppError;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    /// JSON settings file.
    pub settings_path: PathBuf,
    /// RFC 3339 timestamp of the last successful backup.
    pub last_backup_path: PathBuf,
    pub smtp: SmtpConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn disabled() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@example.com".to_string(),
            from_name: "Tillbook".to_string(),
            enabled: false,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the backup check runs.
    pub period: Duration,
    /// Upper bound for one mail delivery attempt.
    pub mail_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3600),
            mail_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let defaults = SchedulerConfig::default();

        Ok(Self {
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "invoicing-engine".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                path: common.data_path(
                    env::var("DATABASE_PATH").unwrap_or_else(|_| "inventory.db".to_string()),
                ),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
            },
            settings_path: common.data_path(
                env::var("SETTINGS_PATH").unwrap_or_else(|_| "settings.json".to_string()),
            ),
            last_backup_path: common.data_path(
                env::var("LAST_BACKUP_PATH").unwrap_or_else(|_| "last_backup.txt".to_string()),
            ),
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                port: env_parse("SMTP_PORT", 587),
                user: env::var("SMTP_USER").unwrap_or_default(),
                password: Secret::new(env::var("SMTP_PASSWORD").unwrap_or_default()),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@example.com".to_string()),
                from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Tillbook".to_string()),
                enabled: env_parse("SMTP_ENABLED", false),
                timeout: Duration::from_secs(env_parse("SMTP_TIMEOUT_SECS", 30)),
            },
            scheduler: SchedulerConfig {
                period: Duration::from_secs(env_parse(
                    "BACKUP_CHECK_PERIOD_SECS",
                    defaults.period.as_secs(),
                )),
                mail_timeout: Duration::from_secs(env_parse(
                    "BACKUP_MAIL_TIMEOUT_SECS",
                    defaults.mail_timeout.as_secs(),
                )),
            },
            common,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_resolves_paths_against_data_dir() {
        env::set_var("APP__DATA_DIR", "/srv/tillbook");
        env::set_var("DATABASE_PATH", "store.db");
        env::set_var("BACKUP_CHECK_PERIOD_SECS", "120");
        let config = EngineConfig::from_env().unwrap();
        env::remove_var("APP__DATA_DIR");
        env::remove_var("DATABASE_PATH");
        env::remove_var("BACKUP_CHECK_PERIOD_SECS");

        assert_eq!(config.database.path, PathBuf::from("/srv/tillbook/store.db"));
        assert_eq!(
            config.settings_path,
            PathBuf::from("/srv/tillbook/settings.json")
        );
        assert_eq!(config.scheduler.period, Duration::from_secs(120));
        assert!(!config.smtp.enabled);
    }

    #[test]
    #[serial]
    fn malformed_numbers_fall_back_to_defaults() {
        env::set_var("DATABASE_MAX_CONNECTIONS", "many");
        let config = EngineConfig::from_env().unwrap();
        env::remove_var("DATABASE_MAX_CONNECTIONS");

        assert_eq!(config.database.max_connections, 5);
    }
}
