//! Common test utilities for invoicing-engine integration tests.
#![allow(dead_code)]

use invoicing_engine::models::{
    BackupSchedule, BackupSettings, Client, CreateClient, CreateProduct, CurrencyFormat,
    DocumentFormat, InvoiceSettings, Product,
};
use invoicing_engine::services::{
    BackupManager, Database, InvoiceEngine, InvoiceLedger, LastBackupStore, MailTransport,
    Notifier, WriteGate,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,invoicing_engine=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("valid decimal")
}

/// A migrated store in a temp directory with two products and one client.
pub struct TestApp {
    pub dir: TempDir,
    pub gate: WriteGate,
    pub db: Database,
    pub notifier: Notifier,
    pub engine: InvoiceEngine,
    pub ledger: InvoiceLedger,
    pub settings: InvoiceSettings,
    /// "Widget A", 10 on hand at 9.99.
    pub widget: Product,
    /// "Gadget B", 5 on hand at 20.00.
    pub gadget: Product,
    pub client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_tracing();

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let gate = WriteGate::new();
        let notifier = Notifier::default();
        let db = Database::connect(&dir.path().join("inventory.db"), 5, gate.clone())
            .await
            .expect("Failed to open store")
            .with_notifier(notifier.clone());
        db.run_migrations().await.expect("Failed to run migrations");

        let widget = db
            .create_product(&CreateProduct {
                serial_number: "SN-001".to_string(),
                name: "Widget A".to_string(),
                quantity: 10,
                unit_cost: dec("6.50"),
                unit_price: dec("9.99"),
            })
            .await
            .expect("Failed to seed product");
        let gadget = db
            .create_product(&CreateProduct {
                serial_number: "SN-002".to_string(),
                name: "Gadget B".to_string(),
                quantity: 5,
                unit_cost: dec("12.00"),
                unit_price: dec("20.00"),
            })
            .await
            .expect("Failed to seed product");
        let client = db
            .create_client(&CreateClient {
                identity_id: "0801-1990-00001".to_string(),
                rtn: Some("08011990000011".to_string()),
                name: "Maria Lopez".to_string(),
                phone: Some("9999-0000".to_string()),
                email: Some("maria@example.com".to_string()),
                city: Some("Tegucigalpa".to_string()),
            })
            .await
            .expect("Failed to seed client");

        let settings = InvoiceSettings {
            company_name: "Acme Hardware".to_string(),
            tax_rate: dec("0.15"),
            prefix: "FAC".to_string(),
            folder: dir.path().join("invoices"),
            format: DocumentFormat::Text,
            currency: CurrencyFormat::default(),
        };

        Self {
            engine: InvoiceEngine::new(db.clone(), notifier.clone()),
            ledger: InvoiceLedger::new(db.clone(), notifier.clone()),
            dir,
            gate,
            db,
            notifier,
            settings,
            widget,
            gadget,
            client,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("inventory.db")
    }

    pub fn backup_folder(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    pub fn last_backup_path(&self) -> PathBuf {
        self.dir.path().join("last_backup.txt")
    }

    pub fn backup_settings(&self, recipient: Option<&str>) -> BackupSettings {
        BackupSettings {
            folder: self.backup_folder(),
            schedule: BackupSchedule::Daily,
            retention: 5,
            recipient: recipient.map(str::to_string),
        }
    }

    pub fn backup_manager(&self, mailer: Arc<dyn MailTransport>) -> BackupManager {
        self.backup_manager_with_timeout(mailer, Duration::from_secs(5))
    }

    pub fn backup_manager_with_timeout(
        &self,
        mailer: Arc<dyn MailTransport>,
        mail_timeout: Duration,
    ) -> BackupManager {
        BackupManager::new(
            self.store_path(),
            self.gate.clone(),
            LastBackupStore::new(self.last_backup_path()),
            mailer,
            mail_timeout,
            self.notifier.clone(),
        )
    }

    pub async fn stock(&self, product_id: i64) -> i64 {
        self.db
            .get_product(product_id)
            .await
            .expect("Failed to read product")
            .expect("Product should exist")
            .quantity_on_hand
    }

    pub async fn create_client(&self, identity_id: &str, name: &str) -> Client {
        self.db
            .create_client(&CreateClient {
                identity_id: identity_id.to_string(),
                rtn: None,
                name: name.to_string(),
                phone: None,
                email: None,
                city: None,
            })
            .await
            .expect("Failed to create client")
    }
}
