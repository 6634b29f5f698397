//! Client for the detection backend's REST API.
//!
//! # Endpoints
//!
//! - `GET /api/threats`: every known threat record (JSON array)
//! - `GET /api/stats`: `{"total": n, "critical": n}`
//! - `GET /api/threat-explanation/{id}`: a single record, 404 when unknown
//!
//! Decoding is lenient: array elements that are not records are skipped,
//! missing fields become placeholders.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::model::{AggregateStats, ThreatRecord, decode_snapshot};

/// Base URL used when none is configured.
const DETECTION_API_BASE: &str = "http://localhost:5000";

#[derive(Clone, Debug)]
pub struct DetectionClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for DetectionClient {
    fn default() -> Self {
        Self::new(DETECTION_API_BASE)
    }
}

impl DetectionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Like [`new`](Self::new), with a per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the bulk snapshot of threat records.
    pub async fn fetch_threats(&self) -> anyhow::Result<Vec<ThreatRecord>> {
        let url = format!("{}/api/threats", self.base_url);

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let values = response.json::<Vec<Value>>().await?;
        let received = values.len();
        let records = decode_snapshot(values);

        debug!(received, decoded = records.len(), "Fetched threat snapshot");
        Ok(records)
    }

    /// Fetch the backend's own aggregate counters.
    pub async fn fetch_stats(&self) -> anyhow::Result<AggregateStats> {
        let url = format!("{}/api/stats", self.base_url);

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let stats = response.json::<AggregateStats>().await?;
        Ok(stats)
    }

    /// Fetch a single record by id. `None` when the backend does not know it.
    pub async fn fetch_threat(&self, id: &str) -> anyhow::Result<Option<ThreatRecord>> {
        let url = format!(
            "{}/api/threat-explanation/{}",
            self.base_url,
            urlencoding::encode(id)
        );

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record = response.error_for_status()?.json::<ThreatRecord>().await?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;
    use axum::{Json, Router, extract::Path, http::StatusCode as AxumStatus, routing::get};
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Serve a canned detection backend on an ephemeral port.
    async fn fake_backend() -> String {
        let app = Router::new()
            .route(
                "/api/threats",
                get(|| async {
                    Json(json!([
                        {"id": "a", "risk_level": "LOW", "timestamp": "2025-03-01T10:00:00"},
                        "not a record",
                        {"id": "b", "risk_level": "CRITICAL", "confidence": 98.5}
                    ]))
                }),
            )
            .route(
                "/api/stats",
                get(|| async { Json(json!({"total": 12, "critical": 3})) }),
            )
            .route(
                "/api/threat-explanation/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "with space" {
                        Ok(Json(json!({"id": id, "risk_level": "HIGH"})))
                    } else {
                        Err((AxumStatus::NOT_FOUND, Json(json!({"error": "Threat not found"}))))
                    }
                }),
            );

        serve(app).await
    }

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_threats_skips_garbage() {
        let client = DetectionClient::new(&fake_backend().await);

        let records = client.fetch_threats().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].risk_level, RiskLevel::Critical);
        assert!(records[1].timestamp.is_none());
    }

    #[tokio::test]
    async fn test_fetch_threats_keeps_factor_order() {
        let body = r#"[{"id": "a", "risk_factors": {"frequency": 5, "behavioral": 4, "geographic": 3}}]"#;
        let app = Router::new().route("/api/threats", get(move || async move { body }));
        let client = DetectionClient::new(&serve(app).await);

        let records = client.fetch_threats().await.unwrap();

        let names: Vec<_> = records[0].risk_factors.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["frequency", "behavioral", "geographic"]);
    }

    #[tokio::test]
    async fn test_fetch_stats() {
        let client = DetectionClient::new(&fake_backend().await);

        let stats = client.fetch_stats().await.unwrap();

        assert_eq!(stats, AggregateStats { total: 12, critical: 3 });
    }

    #[tokio::test]
    async fn test_fetch_threat_encodes_id_and_maps_404() {
        let client = DetectionClient::new(&fake_backend().await);

        let found = client.fetch_threat("with space").await.unwrap();
        let missing = client.fetch_threat("nope").await.unwrap();

        assert_eq!(found.map(|r| r.risk_level), Some(RiskLevel::High));
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let client =
            DetectionClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500))
                .unwrap();

        assert!(client.fetch_threats().await.is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(DetectionClient::new("http://x:5000/").base_url(), "http://x:5000");
    }
}
