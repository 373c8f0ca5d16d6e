// Session state shared by the refresh pipeline and the HTTP handlers
use crate::domain::sensor::SensorRegistry;
use crate::domain::series::{SensorSeries, TimeWindow, TimestampAxis};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A complete result of one refresh. Never mutated after publication.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub series: SensorSeries,
    pub axis: TimestampAxis,
    pub window: Option<TimeWindow>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(
        series: SensorSeries,
        axis: TimestampAxis,
        window: TimeWindow,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            series,
            axis,
            window: Some(window),
            fetched_at: Some(fetched_at),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("selection index {index} is outside the timestamp axis (length {len})")]
    SelectionOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Default)]
struct ViewState {
    snapshot: Arc<Snapshot>,
    selection: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Session {
    registry: RwLock<Arc<SensorRegistry>>,
    view: RwLock<ViewState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn registry(&self) -> Arc<SensorRegistry> {
        self.registry.read().await.clone()
    }

    pub async fn replace_registry(&self, registry: SensorRegistry) -> Arc<SensorRegistry> {
        let registry = Arc::new(registry);
        *self.registry.write().await = registry.clone();
        registry
    }

    /// Current snapshot together with the selected axis index
    pub async fn current(&self) -> (Arc<Snapshot>, Option<usize>) {
        let view = self.view.read().await;
        (view.snapshot.clone(), view.selection)
    }

    /// Swap in a new snapshot and move the selection to its newest timestamp
    pub async fn publish(&self, snapshot: Snapshot) -> (Arc<Snapshot>, Option<usize>) {
        let snapshot = Arc::new(snapshot);
        let selection = snapshot.axis.last_index();

        let mut view = self.view.write().await;
        view.snapshot = snapshot.clone();
        view.selection = selection;
        (snapshot, selection)
    }

    /// Move the selection within the current snapshot
    pub async fn select(&self, index: usize) -> Result<Arc<Snapshot>, ViewError> {
        let mut view = self.view.write().await;
        let len = view.snapshot.axis.len();
        if index >= len {
            return Err(ViewError::SelectionOutOfRange { index, len });
        }
        view.selection = Some(index);
        Ok(view.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::SensorReading;

    fn snapshot(timestamps: &[i64]) -> Snapshot {
        let (series, axis) = SensorSeries::group(
            timestamps
                .iter()
                .map(|ts| SensorReading::new(1, *ts, 20.0)),
        );
        Snapshot {
            series,
            axis,
            window: None,
            fetched_at: None,
        }
    }

    #[tokio::test]
    async fn test_publish_resets_selection_to_live() {
        let session = Session::new();
        session.publish(snapshot(&[100, 200, 300])).await;
        session.select(0).await.unwrap();

        let (_, selection) = session.publish(snapshot(&[100, 200])).await;

        assert_eq!(selection, Some(1));
        assert_eq!(session.current().await.1, Some(1));
    }

    #[tokio::test]
    async fn test_select_out_of_range() {
        let session = Session::new();
        session.publish(snapshot(&[100, 200])).await;

        assert_eq!(
            session.select(2).await.unwrap_err(),
            ViewError::SelectionOutOfRange { index: 2, len: 2 }
        );
        assert_eq!(session.current().await.1, Some(1));
    }

    #[tokio::test]
    async fn test_empty_session() {
        let session = Session::new();
        let (snapshot, selection) = session.current().await;

        assert!(snapshot.axis.is_empty());
        assert_eq!(selection, None);
        assert!(session.registry().await.is_empty());
    }

    #[tokio::test]
    async fn test_readers_keep_their_snapshot_across_publish() {
        let session = Session::new();
        session.publish(snapshot(&[100])).await;
        let (held, _) = session.current().await;

        session.publish(snapshot(&[100, 200, 300])).await;

        assert_eq!(held.axis.len(), 1);
        assert_eq!(session.current().await.0.axis.len(), 3);
    }
}
