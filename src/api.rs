//! HTTP API handlers for CyberGuard.
//!
//! # Endpoints
//!
//! - `GET /health`: liveness
//! - `GET /api/dashboard`: headline numbers and the current threat
//! - `GET /api/threats?q=`: the timeline, optionally searched
//! - `GET /api/stats`: current aggregates
//! - `POST /api/events`: push ingestion (`{"event": "new_threat", "data": {...}}`)
//! - `POST /api/refresh`: reload the snapshot from the detection backend
//! - `GET /api/threats/:id/report?format=pdf|json`: incident report
//! - `GET /api/report?format=pdf|json&q=`: audit report over the timeline
//! - `GET /api/reports`, `GET /api/reports/:id`: archived PDFs
//!
//! Reports are rendered from a snapshot of the session taken when the request
//! arrives; live events applied meanwhile do not leak into them. Layout and
//! PDF serialisation run on the blocking pool.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::backend::DetectionClient;
use crate::dashboard::{DashboardView, HistoryView};
use crate::error::{ApiError, ApiResult};
use crate::feed::FeedHandle;
use crate::model::{AggregateStats, HistoryQuery, PushMessage, ReportFormat, ReportQuery, ThreatRecord};
use crate::report::{
    CancelFlag, DEFAULT_ATTRIBUTION, Document, PdfRenderer, ReportOptions,
    render_audit_report_cancellable, render_incident_report,
};
use crate::storage::{ReportArchive, ReportMeta};

/// Default number of archived reports listed.
const DEFAULT_LIST_LIMIT: u32 = 50;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub feed: FeedHandle,
    pub client: DetectionClient,
    pub archive: ReportArchive,
    pub renderer: Arc<PdfRenderer>,
    /// Offset used to localise report timestamps.
    pub utc_offset: FixedOffset,
    pub attribution: String,
}

impl AppState {
    pub fn new(
        feed: FeedHandle,
        client: DetectionClient,
        archive: ReportArchive,
        renderer: PdfRenderer,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            feed,
            client,
            archive,
            renderer: Arc::new(renderer),
            utc_offset,
            attribution: DEFAULT_ATTRIBUTION.to_string(),
        }
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            generated_at: Utc::now(),
            utc_offset: self.utc_offset,
            attribution: self.attribution.clone(),
        }
    }
}

/// Build the router with every endpoint mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/threats", get(get_threats))
        .route("/api/threats/:id/report", get(get_incident_report))
        .route("/api/stats", get(get_stats))
        .route("/api/events", post(post_event))
        .route("/api/refresh", post(post_refresh))
        .route("/api/report", get(get_audit_report))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/:id", get(get_archived_report))
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /api/dashboard - Current stats, newest threat and connection state.
#[instrument(skip(state))]
pub async fn get_dashboard(State(state): State<AppState>) -> Json<DashboardView> {
    let view = DashboardView::from_status(&state.feed.snapshot());
    info!(
        total = view.stats.total,
        critical = view.stats.critical,
        has_data = view.has_data,
        "Dashboard queried"
    );
    Json(view)
}

/// GET /api/threats - The reconciled timeline, newest first.
///
/// # Query Parameters
///
/// - `q` (optional): case-insensitive match on scenario type or risk level
#[instrument(skip(state))]
pub async fn get_threats(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryView> {
    let status = state.feed.snapshot();
    let view = match &status.session {
        Some(session) => HistoryView::search(session.timeline(), query.q.as_deref()),
        None => HistoryView::search(&Default::default(), query.q.as_deref()),
    };
    info!(matched = view.len(), total = view.total, "History queried");
    Json(view)
}

/// GET /api/stats - Current aggregate counters.
#[instrument(skip(state))]
pub async fn get_stats(State(state): State<AppState>) -> Json<AggregateStats> {
    Json(state.feed.snapshot().stats())
}

/// POST /api/events - Accept one pushed threat.
///
/// # Request Body
///
/// ```json
/// {"event": "new_threat", "data": {"id": "...", "risk_level": "HIGH", ...}}
/// ```
///
/// Returns `202 Accepted` once the event is queued for the feed.
#[instrument(skip(state, message))]
pub async fn post_event(
    State(state): State<AppState>,
    Json(message): Json<PushMessage>,
) -> ApiResult<StatusCode> {
    let PushMessage::NewThreat(record) = &message;
    info!(id = %record.id, level = %record.risk_level, "Live threat pushed");

    state
        .feed
        .push(message)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/refresh - Reload the snapshot from the detection backend.
///
/// On failure the current (stale) session is kept and `502` is returned.
#[instrument(skip(state))]
pub async fn post_refresh(State(state): State<AppState>) -> ApiResult<Response> {
    let records = match state.client.fetch_threats().await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, backend = %state.client.base_url(), "Snapshot fetch failed");
            let message = format!("snapshot fetch failed: {}", e);
            let reported = async {
                state.feed.set_connected(false).await?;
                state.feed.report_error(&message).await
            };
            if let Err(send) = reported.await {
                warn!(error = %send, "Live feed unavailable");
            }
            return Err(ApiError::Upstream(message));
        }
    };

    let stats = match state.client.fetch_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(error = %e, "Stats fetch failed; deriving stats from snapshot");
            None
        }
    };

    let count = records.len();
    let queued = async {
        state.feed.set_connected(true).await?;
        state.feed.load_snapshot(records, stats).await
    };
    queued.await.map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(records = count, "Snapshot refresh queued");
    Ok((StatusCode::ACCEPTED, Json(json!({ "records": count }))).into_response())
}

/// GET /api/threats/:id/report - Incident report for one threat.
///
/// Looks the record up in the current timeline first, then asks the
/// detection backend.
#[instrument(skip(state))]
pub async fn get_incident_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    let record = find_record(&state, &id).await?;
    let options = state.report_options();

    let document =
        tokio::task::spawn_blocking(move || render_incident_report(&record, &options)).await?;

    respond_with(&state, document, query.format).await
}

/// GET /api/report - Audit report over the (optionally filtered) timeline.
#[instrument(skip(state))]
pub async fn get_audit_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    let status = state.feed.snapshot();
    let records: Vec<ThreatRecord> = match &status.session {
        Some(session) => HistoryView::search(session.timeline(), query.q.as_deref()).threats,
        None => Vec::new(),
    };
    let options = state.report_options();

    // Dropping this handler (client gone) stops the render at the next page.
    let guard = CancelOnDrop(CancelFlag::new());
    let flag = guard.0.clone();
    let document = tokio::task::spawn_blocking(move || {
        render_audit_report_cancellable(&records, &options, &flag)
    })
    .await??;
    drop(guard);

    respond_with(&state, document, query.format).await
}

/// Query parameters for the archive listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

/// GET /api/reports - Archived reports, newest first.
#[instrument(skip(state))]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ReportMeta>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let reports = state
        .archive
        .list_reports(limit)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    info!(count = reports.len(), "Archived reports listed");
    Ok(Json(reports))
}

/// GET /api/reports/:id - Download an archived report.
#[instrument(skip(state))]
pub async fn get_archived_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let stored = state
        .archive
        .get_report(id)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("report {} not found", id)))?;

    Ok(pdf_response(&stored.meta.file_name, stored.body))
}

async fn find_record(state: &AppState, id: &str) -> ApiResult<ThreatRecord> {
    let status = state.feed.snapshot();
    if let Some(record) = status
        .session
        .as_ref()
        .and_then(|s| s.timeline().iter().find(|r| r.id == id))
    {
        return Ok(record.clone());
    }

    match state.client.fetch_threat(id).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(ApiError::NotFound(format!("threat {} not found", id))),
        Err(e) => {
            warn!(id = %id, error = %e, "Backend lookup failed");
            Err(ApiError::NotFound(format!("threat {} not found", id)))
        }
    }
}

/// Serve the document as layout JSON, or render, archive and serve it as PDF.
async fn respond_with(
    state: &AppState,
    document: Document,
    format: ReportFormat,
) -> ApiResult<Response> {
    if format == ReportFormat::Json {
        return Ok(Json(document).into_response());
    }

    let renderer = state.renderer.clone();
    let (document, bytes) = tokio::task::spawn_blocking(move || {
        renderer.render(&document).map(|bytes| (document, bytes))
    })
    .await??;

    match state.archive.insert_report(&document, &bytes, Utc::now()).await {
        Ok(id) => info!(id, file = %document.file_name, pages = document.page_count(), "Report archived"),
        Err(e) => warn!(file = %document.file_name, error = %e, "Failed to archive report"),
    }

    Ok(pdf_response(&document.file_name, bytes))
}

fn pdf_response(file_name: &str, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
