//! Atomic cart-to-invoice posting.
//!
//! This is the only code that assigns invoice numbers or decrements stock.
//! Both happen inside one transaction taken under the store's write gate:
//! the invoice number comes from the `invoice_sequence` row, so a rolled-back
//! post also rolls back the counter and numbers stay gapless.

use crate::error::{IssuanceError, RenderError};
use crate::models::{CartLine, DocumentFormat, Invoice, InvoiceLine, InvoiceSettings, Product};
use crate::services::database::Database;
use crate::services::events::{Notifier, StoreEvent};
use crate::services::metrics::{
    DB_QUERY_DURATION, INVOICES_POSTED_TOTAL, INVOICE_AMOUNT_TOTAL, POST_REJECTIONS_TOTAL,
    RENDER_FAILURES_TOTAL,
};
use crate::services::renderer::DocumentRenderer;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tillbook_core::error::AppError;
use tracing::{info, instrument, warn};

/// Outcome of a successful post. The invoice is committed even when
/// `render_warning` is set; call [`InvoiceEngine::rerender`] to retry the document.
#[derive(Debug)]
pub struct IssuedInvoice {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub document_path: PathBuf,
    pub render_warning: Option<RenderError>,
}

impl IssuedInvoice {
    pub fn id(&self) -> i64 {
        self.invoice.id
    }
}

/// Invoice issuance engine.
#[derive(Clone)]
pub struct InvoiceEngine {
    db: Database,
    notifier: Notifier,
}

impl InvoiceEngine {
    pub fn new(db: Database, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    /// Post a cart as a numbered invoice for `client_id`.
    ///
    /// Either the header, every line and every stock decrement are committed
    /// together, or nothing is written.
    #[instrument(skip(self, cart, settings), fields(client_id = %client_id, cart_lines = cart.len()))]
    pub async fn post_invoice(
        &self,
        client_id: i64,
        cart: &[CartLine],
        settings: &InvoiceSettings,
    ) -> Result<IssuedInvoice, IssuanceError> {
        match self.post(client_id, cart, settings).await {
            Ok(issued) => Ok(issued),
            Err(e) => {
                POST_REJECTIONS_TOTAL
                    .with_label_values(&[e.reason()])
                    .inc();
                warn!(error = %e, reason = e.reason(), "Invoice post rejected");
                Err(e)
            }
        }
    }

    async fn post(
        &self,
        client_id: i64,
        cart: &[CartLine],
        settings: &InvoiceSettings,
    ) -> Result<IssuedInvoice, IssuanceError> {
        let cart = merge_cart(cart)?;
        if settings.tax_rate.is_sign_negative() {
            return Err(IssuanceError::Validation(format!(
                "tax rate cannot be negative, got {}",
                settings.tax_rate
            )));
        }

        let (invoice, lines) = self.commit_post(client_id, &cart, settings).await?;

        INVOICES_POSTED_TOTAL.inc();
        INVOICE_AMOUNT_TOTAL.inc_by(invoice.total.to_f64().unwrap_or(0.0));

        info!(
            invoice_id = invoice.id,
            client_id = invoice.client_id,
            total = %invoice.total,
            "Invoice posted"
        );

        let render_warning = match DocumentRenderer::from_settings(settings)
            .write(&invoice, &lines)
            .await
        {
            Ok(_) => None,
            Err(e) => {
                RENDER_FAILURES_TOTAL.inc();
                warn!(
                    invoice_id = invoice.id,
                    error = %e,
                    "Invoice posted but its document could not be written"
                );
                Some(e)
            }
        };

        self.notifier.notify(StoreEvent::InvoicePosted(invoice.id));
        self.notifier.notify(StoreEvent::InventoryChanged);

        Ok(IssuedInvoice {
            document_path: invoice.document_path.clone(),
            invoice,
            lines,
            render_warning,
        })
    }

    /// Runs the posting transaction. The write gate is held until commit or
    /// rollback and released before rendering.
    async fn commit_post(
        &self,
        client_id: i64,
        cart: &[CartLine],
        settings: &InvoiceSettings,
    ) -> Result<(Invoice, Vec<InvoiceLine>), IssuanceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["post_invoice"])
            .start_timer();
        let _writer = self.db.write_gate().acquire().await;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(persistence("Failed to begin transaction"))?;

        let client_name = sqlx::query_scalar::<_, String>("SELECT name FROM clients WHERE id = ?1")
            .bind(client_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(persistence("Failed to get client"))?;

        let Some(client_name) = client_name else {
            tx.rollback().await.ok();
            return Err(IssuanceError::UnknownClient(client_id));
        };

        let mut priced = Vec::with_capacity(cart.len());
        for line in cart {
            let product = sqlx::query_as::<_, Product>(
                r#"
                SELECT id, serial_number, name, quantity, unit_cost, unit_price
                FROM products WHERE id = ?1
                "#,
            )
            .bind(line.product_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(persistence("Failed to get product"))?;

            let Some(product) = product else {
                tx.rollback().await.ok();
                return Err(IssuanceError::UnknownProduct(line.product_id));
            };

            if line.quantity > product.quantity_on_hand {
                tx.rollback().await.ok();
                return Err(IssuanceError::InsufficientStock {
                    product_id: product.id,
                    available: product.quantity_on_hand,
                    requested: line.quantity,
                });
            }

            priced.push((product, line.quantity));
        }

        let subtotal: Decimal = priced
            .iter()
            .map(|(product, qty)| product.unit_price * Decimal::from(*qty))
            .sum();
        let tax = subtotal * settings.tax_rate;
        let total = subtotal + tax;

        let invoice_id = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE invoice_sequence SET last_id = last_id + 1
            WHERE name = 'invoice'
            RETURNING last_id
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(persistence("Failed to assign invoice number"))?;

        for (product, qty) in &priced {
            let result = sqlx::query(
                "UPDATE products SET quantity = quantity - ?1 WHERE id = ?2 AND quantity >= ?1",
            )
            .bind(qty)
            .bind(product.id)
            .execute(&mut *tx)
            .await
            .map_err(persistence("Failed to decrement stock"))?;

            if result.rows_affected() == 0 {
                tx.rollback().await.ok();
                return Err(IssuanceError::InsufficientStock {
                    product_id: product.id,
                    available: product.quantity_on_hand,
                    requested: *qty,
                });
            }
        }

        let invoice = Invoice {
            id: invoice_id,
            client_id,
            client_name,
            posted_at: Utc::now(),
            tax_rate: settings.tax_rate,
            subtotal,
            tax,
            total,
            document_path: settings.document_path(invoice_id),
        };

        sqlx::query(
            r#"
            INSERT INTO invoices (id, client_id, client_name, posted_at, tax_rate, subtotal, tax, total, document_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.client_id)
        .bind(&invoice.client_name)
        .bind(invoice.posted_at)
        .bind(invoice.tax_rate.to_string())
        .bind(invoice.subtotal.to_string())
        .bind(invoice.tax.to_string())
        .bind(invoice.total.to_string())
        .bind(invoice.document_path.to_string_lossy().into_owned())
        .execute(&mut *tx)
        .await
        .map_err(persistence("Failed to insert invoice"))?;

        let mut lines = Vec::with_capacity(priced.len());
        for (line_no, (product, qty)) in (1_i64..).zip(priced) {
            let line = InvoiceLine {
                invoice_id,
                line_no,
                product_id: product.id,
                product_name: product.name,
                serial_number: product.serial_number,
                quantity: qty,
                unit_price: product.unit_price,
                line_total: product.unit_price * Decimal::from(qty),
            };

            sqlx::query(
                r#"
                INSERT INTO invoice_lines (invoice_id, line_no, product_id, product_name, serial_number, quantity, unit_price, line_total)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(line.invoice_id)
            .bind(line.line_no)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(&line.serial_number)
            .bind(line.quantity)
            .bind(line.unit_price.to_string())
            .bind(line.line_total.to_string())
            .execute(&mut *tx)
            .await
            .map_err(persistence("Failed to insert invoice line"))?;

            lines.push(line);
        }

        tx.commit()
            .await
            .map_err(persistence("Failed to commit transaction"))?;

        timer.observe_duration();

        Ok((invoice, lines))
    }

    /// Regenerate the document of a posted invoice from the ledger, at the
    /// path recorded when it was posted.
    #[instrument(skip(self, settings))]
    pub async fn rerender(
        &self,
        invoice_id: i64,
        settings: &InvoiceSettings,
    ) -> Result<PathBuf, IssuanceError> {
        let invoice = self
            .db
            .get_invoice(invoice_id)
            .await?
            .ok_or(IssuanceError::UnknownInvoice(invoice_id))?;
        let lines = self.db.get_invoice_lines(invoice_id).await?;

        let format = invoice
            .document_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(DocumentFormat::from_string)
            .unwrap_or(settings.format);
        let renderer =
            DocumentRenderer::new(format, settings.currency.clone(), settings.company_name.clone());

        let path = renderer.write(&invoice, &lines).await?;
        info!(invoice_id = invoice_id, path = %path.display(), "Invoice document re-rendered");
        Ok(path)
    }
}

/// Validates quantities and folds repeated products into one line, keeping
/// the position of the first occurrence.
fn merge_cart(cart: &[CartLine]) -> Result<Vec<CartLine>, IssuanceError> {
    if cart.is_empty() {
        return Err(IssuanceError::Validation("cart is empty".to_string()));
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(cart.len());
    for line in cart {
        if line.quantity <= 0 {
            return Err(IssuanceError::Validation(format!(
                "quantity for product {} must be positive, got {}",
                line.product_id, line.quantity
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    IssuanceError::Validation(format!(
                        "quantity for product {} is too large",
                        line.product_id
                    ))
                })?
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

fn persistence(context: &'static str) -> impl FnOnce(sqlx::Error) -> IssuanceError {
    move |e| IssuanceError::Persistence(AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_cart_sums_repeated_products_in_first_position() {
        let cart = [CartLine::new(2, 1), CartLine::new(1, 2), CartLine::new(2, 3)];

        let merged = merge_cart(&cart).unwrap();

        assert_eq!(merged, vec![CartLine::new(2, 4), CartLine::new(1, 2)]);
    }

    #[test]
    fn merge_cart_rejects_empty_and_non_positive_quantities() {
        assert!(matches!(merge_cart(&[]), Err(IssuanceError::Validation(_))));
        assert!(matches!(
            merge_cart(&[CartLine::new(1, 0)]),
            Err(IssuanceError::Validation(_))
        ));
        assert!(matches!(
            merge_cart(&[CartLine::new(1, 2), CartLine::new(1, -1)]),
            Err(IssuanceError::Validation(_))
        ));
    }
}
