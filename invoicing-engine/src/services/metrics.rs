//! Prometheus metrics for invoicing-engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// Successfully posted invoices.
pub static INVOICES_POSTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "invoicing_invoices_posted_total",
        "Total number of posted invoices"
    )
    .expect("Failed to register invoices_posted_total")
});

/// Rejected posts by reason.
pub static POST_REJECTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_post_rejections_total",
        "Total number of rejected invoice posts by reason",
        &["reason"] // validation, unknown_client, insufficient_stock, persistence, ...
    )
    .expect("Failed to register post_rejections_total")
});

/// Documents that failed to render after a successful post.
pub static RENDER_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "invoicing_render_failures_total",
        "Total number of invoice documents that failed to render"
    )
    .expect("Failed to register render_failures_total")
});

/// Sum of posted invoice totals.
pub static INVOICE_AMOUNT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "invoicing_invoice_amount_total",
        "Total amount of posted invoices"
    )
    .expect("Failed to register invoice_amount_total")
});

/// Backup cycles by outcome.
pub static BACKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoicing_backups_total",
        "Total number of backup cycles by outcome",
        &["outcome"] // created, skipped, copy_failed, mail_failed, restored
    )
    .expect("Failed to register backups_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoicing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_POSTED_TOTAL);
    Lazy::force(&POST_REJECTIONS_TOTAL);
    Lazy::force(&RENDER_FAILURES_TOTAL);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
    Lazy::force(&BACKUPS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
