//! SQLite store for inventory, clients and the invoice ledger.

use crate::models::{
    Client, ClientDeletion, ClientSearch, CreateClient, CreateProduct, Invoice, InvoiceLine,
    InvoiceSearch, Product, ProductSearch, UpdateClient, UpdateProduct,
};
use crate::services::events::{Notifier, StoreEvent};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tillbook_core::error::AppError;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

const INVOICE_COLUMNS: &str =
    "id, client_id, client_name, posted_at, tax_rate, subtotal, tax, total, document_path";
const LINE_COLUMNS: &str =
    "invoice_id, line_no, product_id, product_name, serial_number, quantity, unit_price, line_total";
const PRODUCT_COLUMNS: &str = "id, serial_number, name, quantity, unit_cost, unit_price";
const CLIENT_COLUMNS: &str = "id, identity_id, rtn, name, phone, email, city";

/// Single-writer lock for one store file.
///
/// Every mutation of the store and every file-level copy of it (snapshot,
/// restore) runs while holding this gate, so a snapshot never observes a
/// half-applied write.
#[derive(Clone, Default)]
pub struct WriteGate(Arc<Mutex<()>>);

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.0.clone().lock_owned().await
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    gate: WriteGate,
    path: PathBuf,
    notifier: Notifier,
}

impl Database {
    /// Open (creating if missing) the store file.
    #[instrument(skip(gate), fields(service = "invoicing-engine"))]
    pub async fn connect(
        path: &Path,
        max_connections: u32,
        gate: WriteGate,
    ) -> Result<Self, AppError> {
        info!(
            path = %path.display(),
            max_connections = max_connections,
            "Opening SQLite store"
        );

        // DELETE journal keeps committed state in the main file, which is what
        // the backup manager copies.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to open store: {}", e)))?;

        info!("SQLite store opened");

        Ok(Self {
            pool,
            gate,
            path: path.to_path_buf(),
            notifier: Notifier::default(),
        })
    }

    /// Publish product and client changes on `notifier`.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn write_gate(&self) -> &WriteGate {
        &self.gate
    }

    /// Location of the live store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        let _writer = self.gate.acquire().await;
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close every pooled connection. Required before the file is replaced.
    pub async fn close(&self) {
        self.pool.close().await;
        info!(path = %self.path.display(), "SQLite store closed");
    }

    // -------------------------------------------------------------------------
    // Product Operations
    // -------------------------------------------------------------------------

    /// Create a new product.
    #[instrument(skip(self, input), fields(serial_number = %input.serial_number))]
    pub async fn create_product(&self, input: &CreateProduct) -> Result<Product, AppError> {
        input.check()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_product"])
            .start_timer();
        let _writer = self.gate.acquire().await;

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (serial_number, name, quantity, unit_cost, unit_price)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&input.serial_number)
        .bind(&input.name)
        .bind(input.quantity)
        .bind(input.unit_cost.to_string())
        .bind(input.unit_price.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create product", e))?;

        timer.observe_duration();

        info!(product_id = product.id, serial_number = %product.serial_number, "Product created");
        self.notifier.notify(StoreEvent::InventoryChanged);

        Ok(product)
    }

    /// Get a product by ID.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: i64) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get product: {}", e)))?;

        timer.observe_duration();

        Ok(product)
    }

    /// List all products ordered by name.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_products"])
            .start_timer();

        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name COLLATE NOCASE, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list products: {}", e)))?;

        timer.observe_duration();

        Ok(products)
    }

    /// Search products by name, serial number substring or exact ID.
    #[instrument(skip(self))]
    pub async fn search_products(&self, search: &ProductSearch) -> Result<Vec<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["search_products"])
            .start_timer();

        let products = match search {
            ProductSearch::Name(term) => {
                sqlx::query_as::<_, Product>(&format!(
                    r#"
                    SELECT {PRODUCT_COLUMNS} FROM products
                    WHERE name LIKE '%' || ?1 || '%'
                    ORDER BY name COLLATE NOCASE, id
                    "#
                ))
                .bind(term)
                .fetch_all(&self.pool)
                .await
            }
            ProductSearch::Serial(term) => {
                sqlx::query_as::<_, Product>(&format!(
                    r#"
                    SELECT {PRODUCT_COLUMNS} FROM products
                    WHERE serial_number LIKE '%' || ?1 || '%'
                    ORDER BY serial_number
                    "#
                ))
                .bind(term)
                .fetch_all(&self.pool)
                .await
            }
            ProductSearch::Id(id) => {
                sqlx::query_as::<_, Product>(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
                ))
                .bind(id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search products: {}", e)))?;

        timer.observe_duration();

        Ok(products)
    }

    /// Update a product. Stock set here is an inventory correction, not a sale.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: i64,
        input: &UpdateProduct,
    ) -> Result<Option<Product>, AppError> {
        input.check()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_product"])
            .start_timer();
        let _writer = self.gate.acquire().await;

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET serial_number = COALESCE(?2, serial_number),
                name = COALESCE(?3, name),
                quantity = COALESCE(?4, quantity),
                unit_cost = COALESCE(?5, unit_cost),
                unit_price = COALESCE(?6, unit_price)
            WHERE id = ?1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product_id)
        .bind(&input.serial_number)
        .bind(&input.name)
        .bind(input.quantity)
        .bind(input.unit_cost.map(|d| d.to_string()))
        .bind(input.unit_price.map(|d| d.to_string()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update product", e))?;

        timer.observe_duration();

        if let Some(ref p) = product {
            info!(product_id = p.id, "Product updated");
            self.notifier.notify(StoreEvent::InventoryChanged);
        }

        Ok(product)
    }

    /// Delete a product. Posted invoices keep their line snapshots.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: i64) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_product"])
            .start_timer();
        let _writer = self.gate.acquire().await;

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete product: {}", e))
            })?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(product_id = product_id, "Product deleted");
            self.notifier.notify(StoreEvent::InventoryChanged);
        }
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    /// Create a new client.
    #[instrument(skip(self, input), fields(identity_id = %input.identity_id))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        use validator::Validate;
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();
        let _writer = self.gate.acquire().await;

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (identity_id, rtn, name, phone, email, city)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(&input.identity_id)
        .bind(&input.rtn)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.city)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create client", e))?;

        timer.observe_duration();

        info!(client_id = client.id, "Client created");
        self.notifier.notify(StoreEvent::ClientsChanged);

        Ok(client)
    }

    /// Get a client by ID.
    #[instrument(skip(self))]
    pub async fn get_client(&self, client_id: i64) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// List all clients ordered by name.
    #[instrument(skip(self))]
    pub async fn list_clients(&self) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name COLLATE NOCASE, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    /// Search clients by name substring, identity id substring or exact ID.
    #[instrument(skip(self))]
    pub async fn search_clients(&self, search: &ClientSearch) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["search_clients"])
            .start_timer();

        let clients = match search {
            ClientSearch::Name(term) => {
                sqlx::query_as::<_, Client>(&format!(
                    r#"
                    SELECT {CLIENT_COLUMNS} FROM clients
                    WHERE name LIKE '%' || ?1 || '%'
                    ORDER BY name COLLATE NOCASE, id
                    "#
                ))
                .bind(term)
                .fetch_all(&self.pool)
                .await
            }
            ClientSearch::IdentityId(term) => {
                sqlx::query_as::<_, Client>(&format!(
                    r#"
                    SELECT {CLIENT_COLUMNS} FROM clients
                    WHERE identity_id LIKE '%' || ?1 || '%'
                    ORDER BY identity_id
                    "#
                ))
                .bind(term)
                .fetch_all(&self.pool)
                .await
            }
            ClientSearch::Id(id) => {
                sqlx::query_as::<_, Client>(&format!(
                    "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"
                ))
                .bind(id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    /// Update a client.
    #[instrument(skip(self, input))]
    pub async fn update_client(
        &self,
        client_id: i64,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        use validator::Validate;
        input.validate()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();
        let _writer = self.gate.acquire().await;

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients
            SET identity_id = COALESCE(?2, identity_id),
                rtn = COALESCE(?3, rtn),
                name = COALESCE(?4, name),
                phone = COALESCE(?5, phone),
                email = COALESCE(?6, email),
                city = COALESCE(?7, city)
            WHERE id = ?1
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(&input.identity_id)
        .bind(&input.rtn)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.city)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to update client", e))?;

        timer.observe_duration();

        if let Some(ref c) = client {
            info!(client_id = c.id, "Client updated");
            self.notifier.notify(StoreEvent::ClientsChanged);
        }

        Ok(client)
    }

    /// Delete a client. Clients with invoices on record are deleted too, with a
    /// warning; their invoices keep the name snapshot.
    #[instrument(skip(self))]
    pub async fn delete_client(&self, client_id: i64) -> Result<Option<ClientDeletion>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        let _writer = self.gate.acquire().await;
        let invoices_on_record = self.count_invoices_for_client(client_id).await?;

        let result = sqlx::query("DELETE FROM clients WHERE id = ?1")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete client: {}", e))
            })?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if invoices_on_record > 0 {
            warn!(
                client_id = client_id,
                invoices_on_record = invoices_on_record,
                "Deleted client with invoices on record"
            );
        } else {
            info!(client_id = client_id, "Client deleted");
        }
        self.notifier.notify(StoreEvent::ClientsChanged);

        Ok(Some(ClientDeletion {
            client_id,
            invoices_on_record,
        }))
    }

    /// Number of invoices referencing a client.
    #[instrument(skip(self))]
    pub async fn count_invoices_for_client(&self, client_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM invoices WHERE client_id = ?1")
            .bind(client_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to count invoices: {}", e))
            })
    }

    // -------------------------------------------------------------------------
    // Invoice Ledger Operations (read side and delete)
    // -------------------------------------------------------------------------

    /// Get an invoice header by ID.
    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get the lines of an invoice in cart order.
    #[instrument(skip(self))]
    pub async fn get_invoice_lines(&self, invoice_id: i64) -> Result<Vec<InvoiceLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_lines"])
            .start_timer();

        let lines = sqlx::query_as::<_, InvoiceLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM invoice_lines WHERE invoice_id = ?1 ORDER BY line_no"
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice lines: {}", e))
        })?;

        timer.observe_duration();

        Ok(lines)
    }

    /// List every invoice, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY posted_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Search invoices by client name substring or exact ID.
    #[instrument(skip(self))]
    pub async fn search_invoices(&self, search: &InvoiceSearch) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["search_invoices"])
            .start_timer();

        let invoices = match search {
            InvoiceSearch::ClientName(term) => {
                sqlx::query_as::<_, Invoice>(&format!(
                    r#"
                    SELECT {INVOICE_COLUMNS} FROM invoices
                    WHERE client_name LIKE '%' || ?1 || '%'
                    ORDER BY posted_at DESC, id DESC
                    "#
                ))
                .bind(term)
                .fetch_all(&self.pool)
                .await
            }
            InvoiceSearch::Id(id) => {
                sqlx::query_as::<_, Invoice>(&format!(
                    "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"
                ))
                .bind(id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to search invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Invoices posted in `[from, until)`, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices_between"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS} FROM invoices
            WHERE posted_at >= ?1 AND posted_at < ?2
            ORDER BY posted_at DESC, id DESC
            "#
        ))
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Invoices of one client, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices_for_client(&self, client_id: i64) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices_for_client"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS} FROM invoices
            WHERE client_id = ?1
            ORDER BY posted_at DESC, id DESC
            "#
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Hard-delete an invoice header and its lines in one transaction.
    /// Returns the deleted header so the caller can remove its document.
    #[instrument(skip(self))]
    pub async fn delete_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();
        let _writer = self.gate.acquire().await;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let Some(invoice) = invoice else {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        };

        sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = ?1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice lines: {}", e))
            })?;

        sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = invoice_id, "Invoice deleted");

        Ok(Some(invoice))
    }

    /// Number the next post would receive if nothing else posts first.
    /// Display only; assignment happens inside the posting transaction.
    #[instrument(skip(self))]
    pub async fn peek_next_invoice_id(&self) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT last_id + 1 FROM invoice_sequence WHERE name = 'invoice'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read sequence: {}", e)))
    }
}
