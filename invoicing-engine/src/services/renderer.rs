//! Invoice document rendering.

use crate::error::RenderError;
use crate::models::{CurrencyFormat, DocumentFormat, Invoice, InvoiceLine, InvoiceSettings};
use askama::Template;
use rust_decimal::{Decimal, RoundingStrategy};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

struct LineView {
    description: String,
    serial_number: String,
    total: String,
}

/// Pre-formatted values shared by both document formats.
struct DocumentView {
    company: String,
    number: String,
    posted_at: String,
    client_name: String,
    client_id: i64,
    lines: Vec<LineView>,
    subtotal: String,
    tax_percent: String,
    tax: String,
    total: String,
}

#[derive(Template)]
#[template(path = "invoice.txt")]
struct TextDocument<'a> {
    doc: &'a DocumentView,
}

#[derive(Template)]
#[template(path = "invoice.html")]
struct HtmlDocument<'a> {
    doc: &'a DocumentView,
}

/// Renders a posted invoice to its document file.
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    format: DocumentFormat,
    currency: CurrencyFormat,
    company: String,
}

impl DocumentRenderer {
    pub fn new(format: DocumentFormat, currency: CurrencyFormat, company: impl Into<String>) -> Self {
        Self {
            format,
            currency,
            company: company.into(),
        }
    }

    pub fn from_settings(settings: &InvoiceSettings) -> Self {
        Self::new(
            settings.format,
            settings.currency.clone(),
            settings.company_name.clone(),
        )
    }

    /// Renders the document body. Output depends only on the inputs.
    pub fn render(&self, invoice: &Invoice, lines: &[InvoiceLine]) -> Result<String, RenderError> {
        let view = self.view(invoice, lines);
        let rendered = match self.format {
            DocumentFormat::Text => TextDocument { doc: &view }.render(),
            DocumentFormat::Html => HtmlDocument { doc: &view }.render(),
        };

        rendered.map_err(|e| RenderError {
            path: invoice.document_path.clone(),
            source: std::io::Error::other(e),
        })
    }

    /// Renders and writes to `invoice.document_path`, creating the folder.
    #[instrument(skip(self, invoice, lines), fields(invoice_id = %invoice.id))]
    pub async fn write(
        &self,
        invoice: &Invoice,
        lines: &[InvoiceLine],
    ) -> Result<PathBuf, RenderError> {
        let content = self.render(invoice, lines)?;
        let path = invoice.document_path.clone();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_folder(parent, &path).await?;
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|source| RenderError {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Invoice document written");

        Ok(path)
    }

    fn view(&self, invoice: &Invoice, lines: &[InvoiceLine]) -> DocumentView {
        DocumentView {
            company: self.company.clone(),
            number: format!("{:05}", invoice.id),
            posted_at: invoice.posted_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            client_name: invoice.client_name.clone(),
            client_id: invoice.client_id,
            lines: lines
                .iter()
                .map(|line| LineView {
                    description: line_description(line),
                    serial_number: line.serial_number.clone(),
                    total: self.currency.format(line.line_total),
                })
                .collect(),
            subtotal: self.currency.format(invoice.subtotal),
            tax_percent: (invoice.tax_rate * Decimal::ONE_HUNDRED)
                .normalize()
                .to_string(),
            tax: self.currency.format(invoice.tax),
            total: self.currency.format(invoice.total),
        }
    }
}

/// `Widget A × 3 @ 9.99`
fn line_description(line: &InvoiceLine) -> String {
    let price = line
        .unit_price
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{} × {} @ {:.2}", line.product_name, line.quantity, price)
}

async fn create_folder(folder: &Path, document: &Path) -> Result<(), RenderError> {
    tokio::fs::create_dir_all(folder)
        .await
        .map_err(|source| RenderError {
            path: document.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn dec(s: &str) -> Decimal {
        s.parse().expect("valid decimal")
    }

    fn sample(folder: &Path) -> (Invoice, Vec<InvoiceLine>) {
        let invoice = Invoice {
            id: 7,
            client_id: 3,
            client_name: "Rosa <Mejía> & Sons".to_string(),
            posted_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
            tax_rate: dec("0.15"),
            subtotal: dec("29.97"),
            tax: dec("4.4955"),
            total: dec("34.4655"),
            document_path: folder.join("FAC_00007.txt"),
        };
        let lines = vec![InvoiceLine {
            invoice_id: 7,
            line_no: 1,
            product_id: 1,
            product_name: "Widget A".to_string(),
            serial_number: "SN-001".to_string(),
            quantity: 3,
            unit_price: dec("9.99"),
            line_total: dec("29.97"),
        }];
        (invoice, lines)
    }

    #[test]
    fn text_document_lists_lines_and_totals() {
        let (invoice, lines) = sample(Path::new("invoices"));
        let renderer =
            DocumentRenderer::new(DocumentFormat::Text, CurrencyFormat::default(), "Acme");

        let text = renderer.render(&invoice, &lines).unwrap();

        assert!(text.contains("Acme"));
        assert!(text.contains("Invoice No. 00007"));
        assert!(text.contains("Widget A × 3 @ 9.99"));
        assert!(text.contains("Subtotal: L 29.97"));
        assert!(text.contains("Tax (15%): L 4.50"));
        assert!(text.contains("Total: L 34.47"));
    }

    #[test]
    fn render_is_deterministic() {
        let (invoice, lines) = sample(Path::new("invoices"));
        let renderer =
            DocumentRenderer::new(DocumentFormat::Text, CurrencyFormat::default(), "Acme");

        assert_eq!(
            renderer.render(&invoice, &lines).unwrap(),
            renderer.render(&invoice, &lines).unwrap()
        );
    }

    #[test]
    fn html_document_escapes_client_name() {
        let (invoice, lines) = sample(Path::new("invoices"));
        let renderer =
            DocumentRenderer::new(DocumentFormat::Html, CurrencyFormat::default(), "Acme");

        let html = renderer.render(&invoice, &lines).unwrap();

        assert!(html.contains("Widget A × 3 @ 9.99"));
        assert!(!html.contains("<Mejía>"));
        assert!(html.contains("&lt;Mejía&gt;"));
    }

    #[tokio::test]
    async fn write_creates_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("nested").join("invoices");
        let (invoice, lines) = sample(&folder);
        let renderer =
            DocumentRenderer::new(DocumentFormat::Text, CurrencyFormat::default(), "Acme");

        let path = renderer.write(&invoice, &lines).await.unwrap();

        assert_eq!(path, folder.join("FAC_00007.txt"));
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, renderer.render(&invoice, &lines).unwrap());
    }
}
