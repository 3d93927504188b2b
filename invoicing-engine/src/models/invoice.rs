//! Invoice ledger models.

use super::decimal_column;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::path::PathBuf;

/// Posted invoice header. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub client_id: i64,
    /// Client name as it was when the invoice was posted.
    pub client_name: String,
    pub posted_at: DateTime<Utc>,
    /// Fraction, e.g. 0.15.
    pub tax_rate: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub document_path: PathBuf,
}

impl<'r> FromRow<'r, SqliteRow> for Invoice {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let document_path: String = row.try_get("document_path")?;
        Ok(Self {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            client_name: row.try_get("client_name")?,
            posted_at: row.try_get("posted_at")?,
            tax_rate: decimal_column(row, "tax_rate")?,
            subtotal: decimal_column(row, "subtotal")?,
            tax: decimal_column(row, "tax")?,
            total: decimal_column(row, "total")?,
            document_path: PathBuf::from(document_path),
        })
    }
}

/// Line item on a posted invoice, with product attributes snapshotted at sale time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub invoice_id: i64,
    pub line_no: i64,
    pub product_id: i64,
    pub product_name: String,
    pub serial_number: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl<'r> FromRow<'r, SqliteRow> for InvoiceLine {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            invoice_id: row.try_get("invoice_id")?,
            line_no: row.try_get("line_no")?,
            product_id: row.try_get("product_id")?,
            product_name: row.try_get("product_name")?,
            serial_number: row.try_get("serial_number")?,
            quantity: row.try_get("quantity")?,
            unit_price: decimal_column(row, "unit_price")?,
            line_total: decimal_column(row, "line_total")?,
        })
    }
}

/// One product/quantity selection in a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceSearch {
    /// Case-insensitive substring of the client name snapshot.
    ClientName(String),
    Id(i64),
}

/// Aggregate figures for a set of invoices (sales report, client history).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub invoice_count: usize,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl SalesSummary {
    pub fn from_invoices(invoices: &[Invoice]) -> Self {
        invoices.iter().fold(Self::default(), |mut acc, inv| {
            acc.invoice_count += 1;
            acc.subtotal += inv.subtotal;
            acc.tax += inv.tax;
            acc.total += inv.total;
            acc
        })
    }
}
