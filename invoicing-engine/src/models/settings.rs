//! Read-only configuration views handed to the engine and the backup manager.

use super::BackupSchedule;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format of the rendered invoice document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Text,
    Html,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "txt",
            DocumentFormat::Html => "html",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "html" => DocumentFormat::Html,
            _ => DocumentFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyPosition {
    Before,
    After,
}

/// Display rules for money amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub position: CurrencyPosition,
    pub decimal_separator: String,
    pub thousands_separator: String,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            symbol: "L".to_string(),
            position: CurrencyPosition::Before,
            decimal_separator: ".".to_string(),
            thousands_separator: ",".to_string(),
        }
    }
}

impl CurrencyFormat {
    /// Formats `amount` rounded to two decimals, e.g. `L 1,234.50`.
    pub fn format(&self, amount: Decimal) -> String {
        let rounded = amount
            .abs()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let fixed = format!("{:.2}", rounded);
        let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, digit) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(digit);
        }

        let sign = if amount.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        let number = format!("{}{}{}{}", sign, grouped, self.decimal_separator, fraction);

        match self.position {
            CurrencyPosition::Before => format!("{} {}", self.symbol, number),
            CurrencyPosition::After => format!("{} {}", number, self.symbol),
        }
    }
}

/// Everything a post needs from configuration, captured at call time.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSettings {
    pub company_name: String,
    /// Fraction, e.g. 0.15 for 15 %.
    pub tax_rate: Decimal,
    pub prefix: String,
    pub folder: PathBuf,
    pub format: DocumentFormat,
    pub currency: CurrencyFormat,
}

impl InvoiceSettings {
    /// `{folder}/{prefix}_{id:05}.{ext}`
    pub fn document_path(&self, invoice_id: i64) -> PathBuf {
        self.folder.join(format!(
            "{}_{:05}.{}",
            self.prefix,
            invoice_id,
            self.format.extension()
        ))
    }
}

/// Backup behaviour, re-read on every scheduler cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    pub folder: PathBuf,
    pub schedule: BackupSchedule,
    /// Number of `backup_*` snapshots kept after rotation.
    pub retention: usize,
    pub recipient: Option<String>,
}
