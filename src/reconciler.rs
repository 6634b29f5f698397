//! Reconciliation of the bulk snapshot with the live event stream.
//!
//! The session keeps one consistent view of every known threat:
//!
//! - The snapshot path deduplicates by `id` (last occurrence wins) and sorts
//!   newest-first, then scans the result once for the aggregates.
//! - The live path always inserts at the head of the timeline, whatever the
//!   embedded timestamp says, and bumps the counters incrementally.
//!
//! Reconciliation never fails. Malformed records are carried as-is.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{AggregateStats, ThreatRecord, Timeline};

/// The reconciled view owned by a dashboard session.
///
/// Created by [`SessionState::load_snapshot`], replaced wholesale on the next
/// reload, discarded when the session ends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    timeline: Timeline,
    stats: AggregateStats,
    #[serde(skip)]
    ids: HashSet<String>,
}

impl SessionState {
    /// Build a session from a bulk snapshot.
    ///
    /// Duplicate ids keep their last occurrence in input order. The timeline is
    /// sorted by timestamp descending; equal timestamps keep arrival order and
    /// records without a timestamp sort last.
    pub fn load_snapshot(records: Vec<ThreatRecord>) -> Self {
        let mut slots: Vec<Option<ThreatRecord>> = Vec::with_capacity(records.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for record in records {
            if !record.id.is_empty()
                && let Some(previous) = positions.insert(record.id.clone(), slots.len())
            {
                slots[previous] = None;
            }
            slots.push(Some(record));
        }

        let mut deduped: Vec<ThreatRecord> = slots.into_iter().flatten().collect();
        deduped.sort_by(newest_first);

        let stats = AggregateStats::scan(&deduped);
        let ids = deduped
            .iter()
            .filter(|r| !r.id.is_empty())
            .map(|r| r.id.clone())
            .collect();

        debug!(
            total = stats.total,
            critical = stats.critical,
            "Snapshot reconciled"
        );

        Self {
            timeline: deduped.into(),
            stats,
            ids,
        }
    }

    /// Build a session from a snapshot plus the backend's own aggregates.
    ///
    /// Server stats are authoritative when present and consistent; otherwise
    /// the scan-derived values stand.
    pub fn load_snapshot_with_stats(
        records: Vec<ThreatRecord>,
        server_stats: Option<AggregateStats>,
    ) -> Self {
        let mut state = Self::load_snapshot(records);
        match server_stats {
            Some(stats) if stats.is_consistent() => state.stats = stats,
            Some(stats) => warn!(
                total = stats.total,
                critical = stats.critical,
                "Ignoring inconsistent server stats"
            ),
            None => {}
        }
        state
    }

    /// Apply a single live event.
    ///
    /// The record becomes the head of the timeline. A stored record with the
    /// same id is superseded; records without an id never supersede anything.
    /// `total` is incremented unconditionally, so a record re-pushed after
    /// appearing in the snapshot is counted twice.
    ///
    /// Constant time unless the id repeats, in which case the stale copy is
    /// removed with a linear scan.
    pub fn apply_live_event(&mut self, record: ThreatRecord) {
        if !record.id.is_empty() && !self.ids.insert(record.id.clone()) {
            self.timeline.retain(|existing| existing.id != record.id);
        }

        self.stats.total += 1;
        if record.is_critical() {
            self.stats.critical += 1;
        }

        self.timeline.push_front(record);
    }

    /// The newest known threat, if any.
    pub fn most_recent(&self) -> Option<&ThreatRecord> {
        self.timeline.front()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }
}

/// Timestamp descending; missing timestamps last.
fn newest_first(a: &ThreatRecord, b: &ThreatRecord) -> Ordering {
    match (a.timestamp, b.timestamp) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
