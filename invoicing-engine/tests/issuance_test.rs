//! Invoice posting integration tests for invoicing-engine.

mod common;

use common::{dec, TestApp};
use invoicing_engine::error::IssuanceError;
use invoicing_engine::models::{CartLine, DocumentFormat, InvoiceSearch, UpdateProduct};
use invoicing_engine::services::StoreEvent;

#[tokio::test]
async fn post_invoice_commits_header_lines_and_stock() {
    let app = TestApp::spawn().await;

    let issued = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 3)], &app.settings)
        .await
        .expect("Failed to post invoice");

    assert_eq!(issued.id(), 1);
    assert_eq!(issued.invoice.client_name, "Maria Lopez");
    assert_eq!(issued.invoice.subtotal, dec("29.97"));
    assert_eq!(issued.invoice.tax, dec("4.4955"));
    assert_eq!(issued.invoice.total, dec("34.4655"));
    assert!(issued.render_warning.is_none());
    assert_eq!(issued.document_path, app.settings.folder.join("FAC_00001.txt"));

    assert_eq!(app.stock(app.widget.id).await, 7);
    assert_eq!(app.stock(app.gadget.id).await, 5);

    let stored = app.ledger.get(1).await.unwrap().expect("Invoice should exist");
    assert_eq!(stored.total, dec("34.4655"));
    assert_eq!(stored.client_id, app.client.id);

    let lines = app.ledger.lines(1).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_name, "Widget A");
    assert_eq!(lines[0].serial_number, "SN-001");
    assert_eq!(lines[0].quantity, 3);
    assert_eq!(lines[0].line_total, dec("29.97"));

    let document = tokio::fs::read_to_string(&issued.document_path)
        .await
        .expect("Document should be written");
    assert!(document.contains("Widget A × 3 @ 9.99"));
    assert!(document.contains("Total: L 34.47"));
}

#[tokio::test]
async fn insufficient_stock_rejects_without_changes() {
    let app = TestApp::spawn().await;

    let result = app
        .engine
        .post_invoice(
            app.client.id,
            &[CartLine::new(app.gadget.id, 2), CartLine::new(app.widget.id, 11)],
            &app.settings,
        )
        .await;

    match result {
        Err(IssuanceError::InsufficientStock {
            product_id,
            available,
            requested,
        }) => {
            assert_eq!(product_id, app.widget.id);
            assert_eq!(available, 10);
            assert_eq!(requested, 11);
        }
        other => panic!("Expected InsufficientStock, got {:?}", other),
    }

    assert_eq!(app.stock(app.widget.id).await, 10);
    assert_eq!(app.stock(app.gadget.id).await, 5);
    assert!(app.ledger.list_all().await.unwrap().is_empty());
    assert_eq!(app.ledger.peek_next_id().await.unwrap(), 1);
    assert!(!app.settings.folder.join("FAC_00001.txt").exists());
}

#[tokio::test]
async fn unknown_client_and_product_are_rejected() {
    let app = TestApp::spawn().await;

    let unknown_client = app
        .engine
        .post_invoice(999, &[CartLine::new(app.widget.id, 1)], &app.settings)
        .await;
    assert!(matches!(unknown_client, Err(IssuanceError::UnknownClient(999))));

    let unknown_product = app
        .engine
        .post_invoice(
            app.client.id,
            &[CartLine::new(app.widget.id, 1), CartLine::new(424242, 1)],
            &app.settings,
        )
        .await;
    assert!(matches!(
        unknown_product,
        Err(IssuanceError::UnknownProduct(424242))
    ));

    assert_eq!(app.stock(app.widget.id).await, 10);
    assert!(app.ledger.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_carts_and_tax_rates_are_rejected_before_the_store() {
    let app = TestApp::spawn().await;

    let empty = app.engine.post_invoice(app.client.id, &[], &app.settings).await;
    assert!(matches!(empty, Err(IssuanceError::Validation(_))));

    let zero = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 0)], &app.settings)
        .await;
    assert!(matches!(zero, Err(IssuanceError::Validation(_))));

    let mut negative_tax = app.settings.clone();
    negative_tax.tax_rate = dec("-0.01");
    let taxed = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 1)], &negative_tax)
        .await;
    assert!(matches!(taxed, Err(IssuanceError::Validation(_))));

    assert_eq!(app.stock(app.widget.id).await, 10);
    assert_eq!(app.ledger.peek_next_id().await.unwrap(), 1);
}

#[tokio::test]
async fn repeated_products_are_merged_into_one_line() {
    let app = TestApp::spawn().await;

    let issued = app
        .engine
        .post_invoice(
            app.client.id,
            &[
                CartLine::new(app.widget.id, 2),
                CartLine::new(app.gadget.id, 1),
                CartLine::new(app.widget.id, 3),
            ],
            &app.settings,
        )
        .await
        .unwrap();

    assert_eq!(issued.lines.len(), 2);
    assert_eq!(issued.lines[0].product_id, app.widget.id);
    assert_eq!(issued.lines[0].quantity, 5);
    assert_eq!(issued.lines[0].line_no, 1);
    assert_eq!(issued.lines[1].product_id, app.gadget.id);
    assert_eq!(issued.invoice.subtotal, dec("69.95"));
    assert_eq!(app.stock(app.widget.id).await, 5);

    let over = app
        .engine
        .post_invoice(
            app.client.id,
            &[CartLine::new(app.gadget.id, 3), CartLine::new(app.gadget.id, 2)],
            &app.settings,
        )
        .await;
    assert!(matches!(
        over,
        Err(IssuanceError::InsufficientStock {
            available: 4,
            requested: 5,
            ..
        })
    ));
}

#[tokio::test]
async fn rejected_post_does_not_consume_a_number() {
    let app = TestApp::spawn().await;

    app.engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 50)], &app.settings)
        .await
        .expect_err("Post should be rejected");

    let issued = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 1)], &app.settings)
        .await
        .unwrap();

    assert_eq!(issued.id(), 1);
}

#[tokio::test]
async fn storage_failure_mid_post_leaves_store_untouched() {
    let app = TestApp::spawn().await;

    sqlx::query(
        r#"
        CREATE TRIGGER reject_invoice_lines BEFORE INSERT ON invoice_lines
        BEGIN
            SELECT RAISE(ABORT, 'disk full');
        END
        "#,
    )
    .execute(app.db.pool())
    .await
    .expect("Failed to install trigger");

    let result = app
        .engine
        .post_invoice(
            app.client.id,
            &[CartLine::new(app.widget.id, 2), CartLine::new(app.gadget.id, 1)],
            &app.settings,
        )
        .await;

    assert!(matches!(result, Err(IssuanceError::Persistence(_))));
    assert_eq!(app.stock(app.widget.id).await, 10);
    assert_eq!(app.stock(app.gadget.id).await, 5);
    assert_eq!(app.ledger.peek_next_id().await.unwrap(), 1);
    assert!(app.ledger.list_all().await.unwrap().is_empty());
    assert!(!app.settings.folder.join("FAC_00001.txt").exists());
}

#[tokio::test]
async fn numbers_are_not_reused_after_delete() {
    let app = TestApp::spawn().await;
    let cart = [CartLine::new(app.widget.id, 1)];

    app.engine.post_invoice(app.client.id, &cart, &app.settings).await.unwrap();
    app.engine.post_invoice(app.client.id, &cart, &app.settings).await.unwrap();
    assert!(app.ledger.delete(2).await.unwrap());

    let next = app.engine.post_invoice(app.client.id, &cart, &app.settings).await.unwrap();

    assert_eq!(next.id(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_posts_get_contiguous_numbers_and_never_oversell() {
    let app = TestApp::spawn().await;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = app.engine.clone();
            let settings = app.settings.clone();
            let client_id = app.client.id;
            let product_id = app.widget.id;
            tokio::spawn(async move {
                engine
                    .post_invoice(client_id, &[CartLine::new(product_id, 1)], &settings)
                    .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;

    let mut ids = Vec::new();
    let mut rejected = 0;
    for result in results {
        match result.expect("Task panicked") {
            Ok(issued) => ids.push(issued.id()),
            Err(IssuanceError::InsufficientStock { .. }) => rejected += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }
    ids.sort_unstable();

    assert_eq!(ids, (1..=10).collect::<Vec<i64>>());
    assert_eq!(rejected, 2);
    assert_eq!(app.stock(app.widget.id).await, 0);
    assert_eq!(app.ledger.list_all().await.unwrap().len(), 10);
}

#[tokio::test]
async fn render_failure_keeps_invoice_and_rerender_recovers() {
    let app = TestApp::spawn().await;

    // A regular file where the invoice folder should be.
    let blocked = app.dir.path().join("blocked");
    tokio::fs::write(&blocked, b"not a folder").await.unwrap();
    let mut settings = app.settings.clone();
    settings.folder = blocked.clone();

    let issued = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 2)], &settings)
        .await
        .expect("Post should succeed even if rendering fails");

    assert!(issued.render_warning.is_some());
    assert!(app.ledger.get(issued.id()).await.unwrap().is_some());
    assert_eq!(app.stock(app.widget.id).await, 8);

    tokio::fs::remove_file(&blocked).await.unwrap();
    let path = app.engine.rerender(issued.id(), &settings).await.unwrap();

    assert_eq!(path, blocked.join("FAC_00001.txt"));
    let document = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(document.contains("Widget A × 2 @ 9.99"));
}

#[tokio::test]
async fn rerender_reproduces_the_original_document() {
    let app = TestApp::spawn().await;

    let issued = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.gadget.id, 1)], &app.settings)
        .await
        .unwrap();
    let original = tokio::fs::read_to_string(&issued.document_path).await.unwrap();

    // Later price changes must not leak into the posted invoice.
    app.db
        .update_product(
            app.gadget.id,
            &UpdateProduct {
                unit_price: Some(dec("25.00")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let path = app.engine.rerender(issued.id(), &app.settings).await.unwrap();
    let rerendered = tokio::fs::read_to_string(&path).await.unwrap();

    assert_eq!(path, issued.document_path);
    assert_eq!(rerendered, original);
}

#[tokio::test]
async fn rerender_unknown_invoice_fails() {
    let app = TestApp::spawn().await;

    let result = app.engine.rerender(77, &app.settings).await;

    assert!(matches!(result, Err(IssuanceError::UnknownInvoice(77))));
}

#[tokio::test]
async fn html_documents_use_html_extension() {
    let app = TestApp::spawn().await;
    let mut settings = app.settings.clone();
    settings.format = DocumentFormat::Html;

    let issued = app
        .engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 1)], &settings)
        .await
        .unwrap();

    assert_eq!(issued.document_path, settings.folder.join("FAC_00001.html"));
    let document = tokio::fs::read_to_string(&issued.document_path).await.unwrap();
    assert!(document.contains("<table>"));
    assert!(document.contains("Widget A × 1 @ 9.99"));
}

#[tokio::test]
async fn posting_notifies_subscribers() {
    let app = TestApp::spawn().await;
    let mut events = app.notifier.subscribe();

    app.engine
        .post_invoice(app.client.id, &[CartLine::new(app.widget.id, 1)], &app.settings)
        .await
        .unwrap();

    assert_eq!(events.recv().await.unwrap(), StoreEvent::InvoicePosted(1));
    assert_eq!(events.recv().await.unwrap(), StoreEvent::InventoryChanged);

    let found = app
        .ledger
        .search(&InvoiceSearch::Id(1))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}
