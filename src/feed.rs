//! The live feed: a single task that owns session mutation.
//!
//! Producers (the push endpoint, snapshot reloads, transport monitors) send
//! [`FeedMessage`]s through a bounded channel. One consumer applies them in
//! arrival order and publishes the resulting [`FeedStatus`] on a `watch`
//! channel. Readers get a cheap clone of the status; the session inside is an
//! `Arc`, so a reader holding an older status keeps an unchanged view while
//! the consumer moves on.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::{AggregateStats, PushMessage, ThreatRecord};
use crate::reconciler::SessionState;

/// Input to the feed loop.
#[derive(Debug)]
pub enum FeedMessage {
    /// A fresh bulk snapshot. Replaces the session wholesale.
    Snapshot {
        records: Vec<ThreatRecord>,
        stats: Option<AggregateStats>,
    },
    /// One pushed record.
    LiveEvent(ThreatRecord),
    /// The detection backend became reachable or unreachable.
    Connection(bool),
    /// Fetching or receiving failed. The current session is kept as-is.
    TransportError(String),
}

/// What readers see.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedStatus {
    /// `None` until the first snapshot or live event arrives.
    pub session: Option<Arc<SessionState>>,
    pub connected: bool,
    /// Last transport failure; cleared by the next successful snapshot.
    pub last_error: Option<String>,
    /// Messages applied so far.
    pub revision: u64,
}

impl FeedStatus {
    /// Stats of the current session, zero when there is none.
    pub fn stats(&self) -> AggregateStats {
        self.session
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default()
    }

    fn apply(&mut self, message: FeedMessage) {
        match message {
            FeedMessage::Snapshot { records, stats } => {
                let count = records.len();
                let session = SessionState::load_snapshot_with_stats(records, stats);
                info!(
                    records = count,
                    timeline = session.len(),
                    total = session.stats().total,
                    "Snapshot loaded"
                );
                self.session = Some(Arc::new(session));
                self.last_error = None;
            }
            FeedMessage::LiveEvent(record) => {
                debug!(id = %record.id, level = %record.risk_level, "Live threat received");
                let session = self.session.get_or_insert_with(Default::default);
                Arc::make_mut(session).apply_live_event(record);
            }
            FeedMessage::Connection(connected) => {
                if connected != self.connected {
                    info!(connected, "Backend connection state changed");
                }
                self.connected = connected;
            }
            FeedMessage::TransportError(error) => {
                warn!(error = %error, "Transport error; keeping current state");
                self.last_error = Some(error);
            }
        }
        self.revision += 1;
    }
}

/// Cheap, cloneable access to a running feed.
#[derive(Clone, Debug)]
pub struct FeedHandle {
    tx: mpsc::Sender<FeedMessage>,
    status: watch::Receiver<FeedStatus>,
}

impl FeedHandle {
    pub async fn send(&self, message: FeedMessage) -> anyhow::Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("live feed has stopped"))
    }

    pub async fn load_snapshot(
        &self,
        records: Vec<ThreatRecord>,
        stats: Option<AggregateStats>,
    ) -> anyhow::Result<()> {
        self.send(FeedMessage::Snapshot { records, stats }).await
    }

    pub async fn push(&self, message: PushMessage) -> anyhow::Result<()> {
        match message {
            PushMessage::NewThreat(record) => self.send(FeedMessage::LiveEvent(record)).await,
        }
    }

    pub async fn report_error(&self, error: impl ToString) -> anyhow::Result<()> {
        self.send(FeedMessage::TransportError(error.to_string()))
            .await
    }

    pub async fn set_connected(&self, connected: bool) -> anyhow::Result<()> {
        self.send(FeedMessage::Connection(connected)).await
    }

    /// The current status, by value.
    pub fn snapshot(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    /// A receiver that is notified after every applied message.
    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct LiveFeed;

impl LiveFeed {
    /// Start the consumer task. It runs until every [`FeedHandle`] is dropped.
    pub fn spawn(capacity: usize) -> (FeedHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<FeedMessage>(capacity.max(1));
        let (status_tx, status_rx) = watch::channel(FeedStatus::default());

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                status_tx.send_modify(|status| status.apply(message));
            }
            debug!("Live feed stopped");
        });

        (
            FeedHandle {
                tx,
                status: status_rx,
            },
            handle,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, level: RiskLevel, minutes: i64) -> ThreatRecord {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        ThreatRecord::new(id, level, ts)
    }

    async fn settle(handle: &FeedHandle, revision: u64) -> FeedStatus {
        let mut rx = handle.subscribe();
        let status = rx.wait_for(|s| s.revision >= revision).await.unwrap();
        status.clone()
    }

    #[tokio::test]
    async fn test_snapshot_then_live_event() {
        let (feed, _task) = LiveFeed::spawn(8);

        feed.load_snapshot(
            vec![
                record("a", RiskLevel::Low, 1),
                record("b", RiskLevel::Critical, 2),
            ],
            None,
        )
        .await
        .unwrap();
        feed.push(PushMessage::NewThreat(record("c", RiskLevel::Critical, 0)))
            .await
            .unwrap();

        let status = settle(&feed, 2).await;
        let session = status.session.unwrap();
        let ids: Vec<_> = session.timeline().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(session.stats(), AggregateStats { total: 3, critical: 2 });
    }

    #[tokio::test]
    async fn test_reader_snapshot_is_isolated_from_later_events() {
        let (feed, _task) = LiveFeed::spawn(8);
        feed.load_snapshot(vec![record("a", RiskLevel::Low, 1)], None)
            .await
            .unwrap();
        let before = settle(&feed, 1).await;

        feed.push(PushMessage::NewThreat(record("b", RiskLevel::High, 2)))
            .await
            .unwrap();
        let after = settle(&feed, 2).await;

        assert_eq!(before.session.as_ref().map(|s| s.len()), Some(1));
        assert_eq!(after.session.as_ref().map(|s| s.len()), Some(2));
        assert!(!Arc::ptr_eq(
            before.session.as_ref().unwrap(),
            after.session.as_ref().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_unobserved_session_is_updated_in_place() {
        let (feed, _task) = LiveFeed::spawn(8);
        feed.load_snapshot(vec![record("a", RiskLevel::Low, 1)], None)
            .await
            .unwrap();
        let before = settle(&feed, 1)
            .await
            .session
            .map(|s| Arc::as_ptr(&s))
            .unwrap();

        feed.push(PushMessage::NewThreat(record("b", RiskLevel::High, 2)))
            .await
            .unwrap();
        let after = settle(&feed, 2).await.session.unwrap();

        assert_eq!(after.len(), 2);
        assert_eq!(Arc::as_ptr(&after), before);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_stale_state() {
        let (feed, _task) = LiveFeed::spawn(8);
        feed.load_snapshot(vec![record("a", RiskLevel::Critical, 1)], None)
            .await
            .unwrap();
        feed.set_connected(true).await.unwrap();
        feed.report_error("connection refused").await.unwrap();
        feed.set_connected(false).await.unwrap();

        let status = settle(&feed, 4).await;

        assert!(!status.connected);
        assert_eq!(status.last_error.as_deref(), Some("connection refused"));
        assert_eq!(status.stats(), AggregateStats { total: 1, critical: 1 });
    }

    #[tokio::test]
    async fn test_live_event_before_snapshot_creates_session() {
        let (feed, _task) = LiveFeed::spawn(8);

        feed.push(PushMessage::NewThreat(record("z", RiskLevel::Medium, 0)))
            .await
            .unwrap();

        let status = settle(&feed, 1).await;
        assert_eq!(status.stats(), AggregateStats { total: 1, critical: 0 });
    }

    #[tokio::test]
    async fn test_snapshot_clears_last_error() {
        let (feed, _task) = LiveFeed::spawn(8);
        feed.report_error("timeout").await.unwrap();
        feed.load_snapshot(vec![], Some(AggregateStats { total: 5, critical: 1 }))
            .await
            .unwrap();

        let status = settle(&feed, 2).await;

        assert!(status.last_error.is_none());
        assert_eq!(status.stats(), AggregateStats { total: 5, critical: 1 });
    }

    #[tokio::test]
    async fn test_task_stops_when_handles_drop() {
        let (feed, task) = LiveFeed::spawn(1);
        drop(feed);

        tokio_test::assert_ok!(task.await);
    }
}
