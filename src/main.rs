//! CyberGuard - live security threat dashboard and audit reports.
//!
//! # API Endpoints
//!
//! - `GET /api/dashboard` - Stats and the current threat
//! - `GET /api/threats` - Searchable threat history
//! - `POST /api/events` - Push a live threat
//! - `POST /api/refresh` - Reload the snapshot from the detection backend
//! - `GET /api/report` - Audit report (PDF)
//! - `GET /api/threats/:id/report` - Incident report (PDF)
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cyberguard::api::{self, AppState};
use cyberguard::backend::DetectionClient;
use cyberguard::config::Config;
use cyberguard::feed::LiveFeed;
use cyberguard::report::PdfRenderer;
use cyberguard::storage::ReportArchive;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cyberguard=info".parse()?))
        .init();

    let config = Config::from_env();
    info!(
        port = config.port,
        backend = %config.backend_url,
        db_url = %config.database_url,
        "Starting CyberGuard server"
    );

    let archive = ReportArchive::new(&config.database_url).await?;
    info!("Report archive initialized");

    let client = DetectionClient::with_timeout(&config.backend_url, config.http_timeout)?;
    let renderer = PdfRenderer::new(config.fonts_dir.clone());
    if !renderer.is_available() {
        warn!("PDF reports disabled until Liberation Sans is installed or CYBERGUARD_FONTS_DIR is set");
    }

    let (feed, _feed_task) = LiveFeed::spawn(config.feed_capacity);

    // Initial snapshot. The server still starts when the backend is down;
    // the dashboard reports the error until a refresh succeeds.
    match client.fetch_threats().await {
        Ok(records) => {
            let stats = client.fetch_stats().await.ok();
            info!(records = records.len(), "Initial snapshot fetched");
            feed.set_connected(true).await?;
            feed.load_snapshot(records, stats).await?;
        }
        Err(e) => {
            warn!(error = %e, "Initial snapshot unavailable");
            feed.report_error(format!("snapshot fetch failed: {}", e)).await?;
        }
    }

    let state = AppState::new(feed, client, archive, renderer, config.utc_offset());

    let app = api::router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "CyberGuard is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
