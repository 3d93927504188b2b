//! Product model for the inventory store.

use super::{decimal_column, ensure_positive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use tillbook_core::error::AppError;
use validator::Validate;

/// Inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub serial_number: String,
    pub name: String,
    pub quantity_on_hand: i64,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
}

impl<'r> FromRow<'r, SqliteRow> for Product {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            serial_number: row.try_get("serial_number")?,
            name: row.try_get("name")?,
            quantity_on_hand: row.try_get("quantity")?,
            unit_cost: decimal_column(row, "unit_cost")?,
            unit_price: decimal_column(row, "unit_price")?,
        })
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, message = "Serial number cannot be empty"))]
    pub serial_number: String,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
}

impl CreateProduct {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        ensure_positive("unit_cost", self.unit_cost)?;
        ensure_positive("unit_price", self.unit_price)
    }
}

/// Input for updating a product. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 1, message = "Serial number cannot be empty"))]
    pub serial_number: Option<String>,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i64>,
    pub unit_cost: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

impl UpdateProduct {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        if let Some(cost) = self.unit_cost {
            ensure_positive("unit_cost", cost)?;
        }
        if let Some(price) = self.unit_price {
            ensure_positive("unit_price", price)?;
        }
        Ok(())
    }
}

/// Product lookup modes offered by the inventory screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductSearch {
    Name(String),
    Serial(String),
    Id(i64),
}
