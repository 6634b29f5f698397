//! Presentation views over the live feed.
//!
//! These are thin: everything they show is derived from a [`FeedStatus`]
//! snapshot at the time of the request.
//!
//! - [`DashboardView`]: headline numbers, the current threat and its colour.
//! - [`HistoryView`]: the full timeline, optionally filtered by a search term.

use serde::Serialize;

use crate::feed::FeedStatus;
use crate::model::{AggregateStats, RiskLevel, Rgb, ThreatRecord, Timeline};

/// How many of the newest records the dashboard lists.
pub const RECENT_LIMIT: usize = 10;

/// The live dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub stats: AggregateStats,

    /// The newest known threat.
    pub current_threat: Option<ThreatRecord>,

    /// Severity colour of the current threat.
    pub current_color: Option<Rgb>,

    /// Whether the detection backend answered at last contact.
    pub connected: bool,

    /// False until a snapshot or live event has been seen.
    pub has_data: bool,

    /// Set when the data shown may be stale.
    pub last_error: Option<String>,

    pub by_level: LevelBreakdown,

    /// Newest records first, at most [`RECENT_LIMIT`].
    pub recent: Vec<ThreatRecord>,
}

impl DashboardView {
    pub fn from_status(status: &FeedStatus) -> Self {
        let session = status.session.as_deref();
        let current_threat = session.and_then(|s| s.most_recent()).cloned();

        Self {
            stats: status.stats(),
            current_color: current_threat.as_ref().map(|t| t.risk_level.color()),
            current_threat,
            connected: status.connected,
            has_data: session.is_some(),
            last_error: status.last_error.clone(),
            by_level: session
                .map(|s| LevelBreakdown::from_records(s.timeline()))
                .unwrap_or_default(),
            recent: session
                .map(|s| s.timeline().iter().take(RECENT_LIMIT).cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// Timeline record counts per risk level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl LevelBreakdown {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ThreatRecord>) -> Self {
        let mut breakdown = Self::default();
        for record in records {
            match record.risk_level {
                RiskLevel::Critical => breakdown.critical += 1,
                RiskLevel::High => breakdown.high += 1,
                RiskLevel::Medium => breakdown.medium += 1,
                RiskLevel::Low => breakdown.low += 1,
                RiskLevel::Unknown => breakdown.unknown += 1,
            }
        }
        breakdown
    }
}

/// The searchable history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    /// The trimmed search term, if any.
    pub query: Option<String>,

    /// Records in the timeline before filtering.
    pub total: usize,

    /// Matching records, newest first.
    pub threats: Vec<ThreatRecord>,
}

impl HistoryView {
    /// Filter `timeline` by a case-insensitive substring match on the
    /// scenario type or the risk level. A blank term matches everything.
    pub fn search(timeline: &Timeline, term: Option<&str>) -> Self {
        let query = term.map(str::trim).filter(|t| !t.is_empty());
        let needle = query.map(str::to_lowercase);

        let threats = timeline
            .iter()
            .filter(|record| match &needle {
                Some(needle) => matches(record, needle),
                None => true,
            })
            .cloned()
            .collect();

        Self {
            query: query.map(str::to_string),
            total: timeline.len(),
            threats,
        }
    }

    pub fn len(&self) -> usize {
        self.threats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threats.is_empty()
    }
}

fn matches(record: &ThreatRecord, needle: &str) -> bool {
    record.scenario.kind.to_lowercase().contains(needle)
        || record.risk_level.label().to_lowercase().contains(needle)
}
