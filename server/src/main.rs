//! Annotation server binary.

use annotator_atoms::files::FileStore;
use annotator_atoms::images::UploadLimits;
use annotator_server::app;
use annotator_shared::cors::cors_layer;
use annotator_shared::{db, AppState, Config};
use anyhow::{Context, Result};
use axum::extract::Request;
use clap::Parser;
use axum::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be populated.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 annotator-server v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        tracing::info!("📄 loaded environment from {}", path.display());
    }

    let config = Config::parse();
    config.validate().context("invalid configuration")?;
    let cors = cors_layer(&config.cors_origin).context("invalid configuration")?;

    let files = FileStore::new(&config.upload_dir)
        .await
        .with_context(|| format!("failed to open upload directory {}", config.upload_dir.display()))?;
    tracing::info!("📁 serving uploads from {}", files.root().display());

    let collections = db::connect(&config).await?;

    let limits = UploadLimits {
        max_file_bytes: config.max_upload_bytes,
    };
    let state = AppState::new(collections.images, collections.projects, files, limits);
    let service = app(state, cors, config.max_request_bytes);

    let listener = tokio::net::TcpListener::bind((config.address.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.address, config.port))?;
    tracing::info!("👂 listening on {}", listener.local_addr()?);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("👋 server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 shutdown requested");
}
