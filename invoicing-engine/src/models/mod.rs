//! Domain models for invoicing-engine.

mod backup;
mod client;
mod invoice;
mod product;
mod settings;

pub use backup::{BackupSchedule, BackupSnapshot};
pub use client::{Client, ClientDeletion, ClientSearch, CreateClient, UpdateClient};
pub use invoice::{CartLine, Invoice, InvoiceLine, InvoiceSearch, SalesSummary};
pub use product::{CreateProduct, Product, ProductSearch, UpdateProduct};
pub use settings::{BackupSettings, CurrencyFormat, CurrencyPosition, DocumentFormat, InvoiceSettings};

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use tillbook_core::error::AppError;

/// Money is stored as TEXT; SQLite has no exact decimal type.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn ensure_positive(field: &str, value: Decimal) -> Result<(), AppError> {
    if value <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must be greater than zero, got {}",
            field,
            value
        )));
    }
    Ok(())
}
