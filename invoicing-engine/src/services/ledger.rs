//! Read, search and delete access to posted invoices.

use crate::models::{Invoice, InvoiceLine, InvoiceSearch, SalesSummary};
use crate::services::database::Database;
use crate::services::events::{Notifier, StoreEvent};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use tillbook_core::error::AppError;
use tracing::{info, instrument, warn};

/// Invoice ledger over the store.
#[derive(Clone)]
pub struct InvoiceLedger {
    db: Database,
    notifier: Notifier,
}

impl InvoiceLedger {
    pub fn new(db: Database, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    pub async fn get(&self, invoice_id: i64) -> Result<Option<Invoice>, AppError> {
        self.db.get_invoice(invoice_id).await
    }

    pub async fn lines(&self, invoice_id: i64) -> Result<Vec<InvoiceLine>, AppError> {
        self.db.get_invoice_lines(invoice_id).await
    }

    pub async fn get_with_lines(
        &self,
        invoice_id: i64,
    ) -> Result<Option<(Invoice, Vec<InvoiceLine>)>, AppError> {
        match self.db.get_invoice(invoice_id).await? {
            Some(invoice) => {
                let lines = self.db.get_invoice_lines(invoice_id).await?;
                Ok(Some((invoice, lines)))
            }
            None => Ok(None),
        }
    }

    /// Every invoice, newest first.
    pub async fn list_all(&self) -> Result<Vec<Invoice>, AppError> {
        self.db.list_invoices().await
    }

    pub async fn search(&self, search: &InvoiceSearch) -> Result<Vec<Invoice>, AppError> {
        self.db.search_invoices(search).await
    }

    /// Hard-delete an invoice and its document. Stock is not restored.
    /// Returns `false` when no such invoice exists.
    #[instrument(skip(self))]
    pub async fn delete(&self, invoice_id: i64) -> Result<bool, AppError> {
        let Some(invoice) = self.db.delete_invoice(invoice_id).await? else {
            return Ok(false);
        };

        match tokio::fs::remove_file(&invoice.document_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    invoice_id = invoice_id,
                    path = %invoice.document_path.display(),
                    "Invoice document already absent"
                );
            }
            Err(e) => {
                warn!(
                    invoice_id = invoice_id,
                    path = %invoice.document_path.display(),
                    error = %e,
                    "Invoice deleted but its document could not be removed"
                );
            }
        }

        self.notifier.notify(StoreEvent::InvoiceDeleted(invoice_id));
        Ok(true)
    }

    /// Number the next post would receive. Display only.
    pub async fn peek_next_id(&self) -> Result<i64, AppError> {
        self.db.peek_next_invoice_id().await
    }

    /// Invoices posted between two UTC calendar dates, both inclusive.
    pub async fn list_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let (from, until) = date_range(start, end)?;
        self.db.list_invoices_between(from, until).await
    }

    /// Sales report totals for a date range.
    #[instrument(skip(self))]
    pub async fn sales_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SalesSummary, AppError> {
        let invoices = self.list_between(start, end).await?;
        Ok(SalesSummary::from_invoices(&invoices))
    }

    pub async fn list_for_client(&self, client_id: i64) -> Result<Vec<Invoice>, AppError> {
        self.db.list_invoices_for_client(client_id).await
    }

    /// Purchase history totals of one client.
    #[instrument(skip(self))]
    pub async fn client_history(&self, client_id: i64) -> Result<SalesSummary, AppError> {
        let invoices = self.list_for_client(client_id).await?;
        Ok(SalesSummary::from_invoices(&invoices))
    }
}

fn date_range(
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    if start > end {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Start date {} is after end date {}",
            start,
            end
        )));
    }
    let after_end = end.succ_opt().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("End date {} is out of range", end))
    })?;

    Ok((
        Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)),
        Utc.from_utc_datetime(&after_end.and_time(NaiveTime::MIN)),
    ))
}
