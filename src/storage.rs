//! SQLite archive of rendered reports.
//!
//! Every PDF handed out by the API is also kept here so that a report can be
//! downloaded again exactly as it was generated, even after the live timeline
//! has moved on.
//!
//! - `file_name`: suggested download name
//! - `kind`: `incident` or `audit`
//! - `created_ts`: Unix timestamp in seconds (server-assigned)
//! - `body`: the PDF bytes

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::report::{Document, ReportKind};

/// Metadata of an archived report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub id: i64,
    pub file_name: String,
    pub kind: String,
    pub record_count: i64,
    pub page_count: i64,
    pub created_at: DateTime<Utc>,
}

/// An archived report including its PDF body.
#[derive(Debug, Clone)]
pub struct StoredReport {
    pub meta: ReportMeta,
    pub body: Vec<u8>,
}

/// Database connection pool wrapper.
#[derive(Clone, Debug)]
pub struct ReportArchive {
    pool: SqlitePool,
}

impl ReportArchive {
    /// Open the archive and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:cyberguard.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to `:memory:` is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let archive = Self { pool };
        archive.initialize_schema().await?;

        Ok(archive)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                record_count INTEGER NOT NULL,
                page_count INTEGER NOT NULL,
                created_ts INTEGER NOT NULL,
                body BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_reports_created_ts
            ON reports(created_ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a rendered report. Returns its id.
    pub async fn insert_report(
        &self,
        document: &Document,
        body: &[u8],
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        // An incident report always covers exactly one record.
        let (kind, record_count) = match document.kind {
            ReportKind::Incident => ("incident", 1),
            ReportKind::Audit => ("audit", document.table_rows as i64),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO reports (file_name, kind, record_count, page_count, created_ts, body)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.file_name)
        .bind(kind)
        .bind(record_count)
        .bind(document.page_count() as i64)
        .bind(created_at.timestamp())
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch one report with its body.
    pub async fn get_report(&self, id: i64) -> anyhow::Result<Option<StoredReport>> {
        let row = sqlx::query(
            r#"
            SELECT id, file_name, kind, record_count, page_count, created_ts, body
            FROM reports
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StoredReport {
            meta: meta_from_row(&row),
            body: row.get("body"),
        }))
    }

    /// Newest first, metadata only.
    pub async fn list_reports(&self, limit: u32) -> anyhow::Result<Vec<ReportMeta>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_name, kind, record_count, page_count, created_ts
            FROM reports
            ORDER BY created_ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(meta_from_row).collect())
    }
}

fn meta_from_row(row: &SqliteRow) -> ReportMeta {
    let created_ts: i64 = row.get("created_ts");
    ReportMeta {
        id: row.get("id"),
        file_name: row.get("file_name"),
        kind: row.get("kind"),
        record_count: row.get("record_count"),
        page_count: row.get("page_count"),
        created_at: Utc
            .timestamp_opt(created_ts, 0)
            .single()
            .unwrap_or_default(),
    }
}
