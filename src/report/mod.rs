//! Report generation.
//!
//! Reports are laid out into a backend-agnostic [`Document`] first, then
//! serialised to PDF by [`PdfRenderer`]. Layout is deterministic: the same
//! records and [`ReportOptions`] always produce the same document.
//!
//! - [`render_incident_report`]: one record, detailed.
//! - [`render_audit_report`]: many records, summary plus a paginated table.
//!
//! Both are total over their input. Missing fields render as placeholders.

pub mod audit;
pub mod incident;
pub mod layout;
pub mod pdf;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, FixedOffset, Offset, Utc};

pub use audit::{AUDIT_FILE_NAME, render_audit_report, render_audit_report_cancellable};
pub use incident::{incident_file_name, render_incident_report};
pub use layout::{AuditSummary, Document, DrawOp, Page, ReportKind, Section};
pub use pdf::PdfRenderer;

/// Attribution line printed in every footer.
pub const DEFAULT_ATTRIBUTION: &str = "AI-Powered Threat Detection System";

/// Inputs that would otherwise make rendering depend on the environment.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Printed as the audit report's generation time.
    pub generated_at: DateTime<Utc>,

    /// Offset used to localise timestamps.
    pub utc_offset: FixedOffset,

    pub attribution: String,
}

impl ReportOptions {
    pub fn new(generated_at: DateTime<Utc>, utc_offset: FixedOffset) -> Self {
        Self {
            generated_at,
            utc_offset,
            attribution: DEFAULT_ATTRIBUTION.to_string(),
        }
    }

    /// Format a timestamp the way the dashboard shows it:
    /// `3/1/2025, 10:15:30 AM`.
    pub fn localize(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.utc_offset)
            .format("%-m/%-d/%Y, %-I:%M:%S %p")
            .to_string()
    }

    /// Like [`localize`](Self::localize), blank when the timestamp is missing.
    pub fn localize_opt(&self, ts: Option<DateTime<Utc>>) -> String {
        ts.map(|ts| self.localize(ts)).unwrap_or_default()
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::new(Utc::now(), Utc.fix())
    }
}

/// Cooperative cancellation for long audit renders.
///
/// Checked at page boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
