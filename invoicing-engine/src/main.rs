//! invoicing-engine entry point.

use invoicing_engine::config::EngineConfig;
use invoicing_engine::startup::Application;

use tillbook_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting invoicing-engine"
    );

    // Log configuration (mask sensitive values)
    tracing::info!(
        service_name = %config.service_name,
        data_dir = %config.common.data_dir.display(),
        store = %config.database.path.display(),
        settings = %config.settings_path.display(),
        db_max_connections = config.database.max_connections,
        smtp_enabled = config.smtp.enabled,
        backup_check_period_secs = config.scheduler.period.as_secs(),
        "Configuration loaded"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    match app.ledger().peek_next_id().await {
        Ok(next) => tracing::info!(next_invoice_id = next, "Store ready"),
        Err(e) => tracing::warn!(error = %e, "Store opened but the invoice sequence is unreadable"),
    }

    app.run_until_stopped(shutdown_signal()).await;

    tracing::info!("Service shutdown complete");
    Ok(())
}
