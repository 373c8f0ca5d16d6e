// Refresh pipeline - Timer and selection triggers feeding one ingestion/render loop
use crate::application::ingest_service::{IngestReport, IngestService};
use crate::application::sensor_service::SensorService;
use crate::application::session::{Session, Snapshot, ViewError};
use crate::application::sensor_api::SourceError;
use crate::application::view_service::ViewService;
use crate::domain::view::RenderSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

const COMMAND_BUFFER: usize = 32;
const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Started,
    /// A refresh was already running
    Skipped,
}

/// Result of one completed refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(IngestReport),
    NoSensors,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("refresh pipeline is not running")]
    Closed,
}

enum Command {
    Refresh {
        reply: oneshot::Sender<RefreshOutcome>,
    },
    Select {
        index: usize,
        reply: oneshot::Sender<Result<RenderSet, ViewError>>,
    },
}

/// Cloneable sender side used by the HTTP handlers
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
}

impl PipelineHandle {
    pub async fn refresh(&self) -> Result<RefreshOutcome, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Refresh { reply })
            .await
            .map_err(|_| PipelineError::Closed)?;
        rx.await.map_err(|_| PipelineError::Closed)
    }

    pub async fn select(&self, index: usize) -> Result<RenderSet, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Select { index, reply })
            .await
            .map_err(|_| PipelineError::Closed)?;
        Ok(rx.await.map_err(|_| PipelineError::Closed)??)
    }
}

/// Clears the in-flight flag when a refresh task ends, however it ends
struct RefreshGuard(Arc<AtomicBool>);

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Pipeline {
    session: Arc<Session>,
    sensors: SensorService,
    ingest: IngestService,
    view: ViewService,
    updates: broadcast::Sender<RenderSet>,
    // Held from a session change until its render is broadcast, so the last
    // broadcast always matches the current snapshot and selection
    broadcast_order: Mutex<()>,
    in_flight: Arc<AtomicBool>,
    interval: Duration,
    reload_devices: bool,
}

impl Pipeline {
    pub fn new(
        session: Arc<Session>,
        sensors: SensorService,
        ingest: IngestService,
        view: ViewService,
        interval: Duration,
        reload_devices: bool,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            session,
            sensors,
            ingest,
            view,
            updates,
            broadcast_order: Mutex::new(()),
            in_flight: Arc::new(AtomicBool::new(false)),
            interval,
            reload_devices,
        }
    }

    /// Sender for render updates; subscribe to receive every published render
    pub fn updates(&self) -> broadcast::Sender<RenderSet> {
        self.updates.clone()
    }

    /// Start the worker loop. The first scheduled refresh runs one interval from now.
    pub fn spawn(self) -> (PipelineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let pipeline = Arc::new(self);
        let task = tokio::spawn(pipeline.run(rx));
        (PipelineHandle { commands: tx }, task)
    }

    async fn run(self: Arc<Self>, mut commands: mpsc::Receiver<Command>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.clone().trigger_refresh() == RefreshOutcome::Skipped {
                        tracing::warn!("Scheduled refresh skipped, previous refresh still running");
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::Refresh { reply }) => {
                        let _ = reply.send(self.clone().trigger_refresh());
                    }
                    Some(Command::Select { index, reply }) => {
                        let _ = reply.send(self.select(index).await);
                    }
                    None => {
                        tracing::info!("Refresh pipeline shutting down");
                        break;
                    }
                },
            }
        }
    }

    fn try_begin_refresh(&self) -> Option<RefreshGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard(self.in_flight.clone()))
    }

    fn trigger_refresh(self: Arc<Self>) -> RefreshOutcome {
        let Some(guard) = self.try_begin_refresh() else {
            return RefreshOutcome::Skipped;
        };

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = self.refresh_cycle(Utc::now()).await {
                tracing::error!("Error refreshing metrics: {}", e);
            }
        });
        RefreshOutcome::Started
    }

    /// One full load: sensors if needed, readings for the civil day of `now`,
    /// then publish and broadcast the live render.
    ///
    /// On error nothing is published and the previous snapshot stays current.
    pub async fn refresh_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome, SourceError> {
        let mut registry = self.session.registry().await;
        if registry.is_empty() || self.reload_devices {
            registry = self.sensors.load_sensors(&self.session).await;
        }
        if registry.is_empty() {
            tracing::warn!("No sensors known, skipping metrics refresh");
            return Ok(CycleOutcome::NoSensors);
        }

        let window = self.view.clock().day_window(now);
        let ingested = self.ingest.load_readings(&registry, window).await?;
        let report = ingested.report;

        let _order = self.broadcast_order.lock().await;
        let (snapshot, selection) = self
            .session
            .publish(Snapshot::new(ingested.series, ingested.axis, window, now))
            .await;

        tracing::info!(
            "Refreshed {}/{} readings from {} pages ({} timestamps, {} dropped)",
            report.accepted,
            report.entries,
            report.pages,
            snapshot.axis.len(),
            report.unknown_sensor + report.invalid
        );

        match self.view.render_selection(&snapshot, &registry, selection) {
            Ok(render) => {
                let _ = self.updates.send(render);
            }
            Err(e) => tracing::error!("Error rendering refreshed snapshot: {}", e),
        }

        Ok(CycleOutcome::Published(report))
    }

    async fn select(&self, index: usize) -> Result<RenderSet, ViewError> {
        let _order = self.broadcast_order.lock().await;
        let snapshot = self.session.select(index).await?;
        let registry = self.session.registry().await;
        let render = self.view.select_timestamp(&snapshot, &registry, index)?;
        let _ = self.updates.send(render.clone());
        Ok(render)
    }
}
