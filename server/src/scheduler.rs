//! Refresh scheduling
//!
//! Rendering happens here, off the engine's event loop: the periodic task
//! renders every client in a roster snapshot once per interval, and one-shot
//! renders are triggered for freshly connected clients. Either way the result
//! is a [`RefreshBatch`] sent back to the event loop, which is the only place
//! frames are applied.
//!
//! Each client renders in its own task. A slow, failing or panicking render
//! only affects that client's outcome.

use crate::board::{BoardFrame, BoardRenderer};
use crate::error::DisplayError;
use crate::roster::{RosterEntry, RosterSnapshot, RosterTracker};
use crate::tab::{TabFrame, TabRenderer};
use display_shared::ClientId;
use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Logical clock advanced once per periodic refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshTick(pub u64);

impl fmt::Display for RefreshTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that turns a roster entry into a frame ready to apply
pub trait FrameRenderer: Clone + Send + Sync + 'static {
    type Frame: Send + 'static;

    fn render(
        &self,
        entry: &RosterEntry,
    ) -> impl Future<Output = Result<Self::Frame, DisplayError>> + Send;
}

/// Render result for one client of a snapshot
#[derive(Debug)]
pub struct RenderOutcome<F> {
    pub entry: RosterEntry,
    pub result: Result<F, DisplayError>,
}

/// Renders every entry of `snapshot` concurrently
///
/// Outcomes come back in snapshot order. A render task that panics is
/// reported as a `RenderTask` error for its client only.
pub async fn render_all<R: FrameRenderer>(
    renderer: &R,
    snapshot: &RosterSnapshot,
) -> Vec<RenderOutcome<R::Frame>> {
    let tasks: Vec<(RosterEntry, JoinHandle<Result<R::Frame, DisplayError>>)> = snapshot
        .iter()
        .map(|entry| {
            let renderer = renderer.clone();
            let task_entry = entry.clone();
            let task = tokio::spawn(async move { renderer.render(&task_entry).await });
            (entry.clone(), task)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (entry, task) in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(DisplayError::RenderTask {
                client: entry.client.clone(),
                reason: e.to_string(),
            }),
        };
        outcomes.push(RenderOutcome { entry, result });
    }
    outcomes
}

/// Counts of what happened to each client during one refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub applied: usize,
    /// Clients that disconnected mid-refresh, or frames superseded by newer ones
    pub skipped: usize,
    pub failed: usize,
}

impl RefreshReport {
    /// Records the outcome for one client, logging failures
    pub fn record(&mut self, client: &ClientId, result: Result<(), DisplayError>) {
        match result {
            Ok(()) => self.applied += 1,
            Err(e) if e.is_stale() => {
                debug!("Skipping {}: {}", client, e);
                self.skipped += 1;
            }
            Err(e) => {
                warn!("Display refresh failed for {}: {}", client, e);
                self.failed += 1;
            }
        }
    }

    pub fn merge(&mut self, other: RefreshReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }
}

/// Tab and board frames for one client, rendered together
#[derive(Debug)]
pub struct ClientFrame {
    pub tab: TabFrame,
    pub board: BoardFrame,
}

/// Renders both displays of a client
#[derive(Clone)]
pub struct ClientRenderer {
    pub tab: TabRenderer,
    pub board: BoardRenderer,
}

impl ClientRenderer {
    async fn render_client(&self, entry: &RosterEntry) -> Result<ClientFrame, DisplayError> {
        let tab = self.tab.render(entry).await?;
        let board = self.board.render(entry).await?;
        Ok(ClientFrame { tab, board })
    }
}

impl FrameRenderer for ClientRenderer {
    type Frame = ClientFrame;

    fn render(
        &self,
        entry: &RosterEntry,
    ) -> impl Future<Output = Result<ClientFrame, DisplayError>> + Send {
        self.render_client(entry)
    }
}

/// Why a batch was rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    Periodic,
    Connect,
    Reload,
}

/// Rendered frames on their way to the event loop
#[derive(Debug)]
pub struct RefreshBatch {
    pub tick: RefreshTick,
    pub origin: RefreshOrigin,
    pub outcomes: Vec<RenderOutcome<ClientFrame>>,
}

/// Drives periodic and connect-triggered renders
pub struct RefreshScheduler {
    period: Duration,
    tick: Arc<AtomicU64>,
    renderer: ClientRenderer,
}

impl RefreshScheduler {
    pub fn new(period: Duration, renderer: ClientRenderer) -> Self {
        Self {
            period,
            tick: Arc::new(AtomicU64::new(0)),
            renderer,
        }
    }

    pub fn renderer(&self) -> &ClientRenderer {
        &self.renderer
    }

    pub fn current_tick(&self) -> RefreshTick {
        RefreshTick(self.tick.load(Ordering::SeqCst))
    }

    /// Advances the logical clock, returning the new tick
    pub fn advance(&self) -> RefreshTick {
        RefreshTick(self.tick.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Spawns the task that refreshes every connected client once per period
    ///
    /// The task runs until the receiving side of `batches` goes away.
    pub fn spawn_periodic(
        &self,
        roster: Arc<RwLock<RosterTracker>>,
        batches: mpsc::UnboundedSender<RefreshBatch>,
    ) -> JoinHandle<()> {
        let period = self.period;
        let tick = Arc::clone(&self.tick);
        let renderer = self.renderer.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            info!("Display refresh running every {:?}", period);

            loop {
                ticker.tick().await;

                let current = RefreshTick(tick.fetch_add(1, Ordering::SeqCst) + 1);
                let snapshot = roster.read().await.snapshot();
                if snapshot.is_empty() {
                    continue;
                }

                let started = Instant::now();
                let outcomes = render_all(&renderer, &snapshot).await;
                let elapsed = started.elapsed();
                if elapsed > period {
                    warn!(
                        "Refresh {} for {} clients took {:?}, longer than the {:?} period",
                        current,
                        snapshot.len(),
                        elapsed,
                        period
                    );
                }

                let batch = RefreshBatch {
                    tick: current,
                    origin: RefreshOrigin::Periodic,
                    outcomes,
                };
                if batches.send(batch).is_err() {
                    debug!("Event loop gone, stopping display refresh");
                    break;
                }
            }
        })
    }

    /// Spawns a render of every client in `snapshot`, sent back as one batch
    /// tagged with `tick`
    pub fn spawn_render(
        &self,
        snapshot: RosterSnapshot,
        tick: RefreshTick,
        origin: RefreshOrigin,
        batches: mpsc::UnboundedSender<RefreshBatch>,
    ) -> JoinHandle<()> {
        let renderer = self.renderer.clone();

        tokio::spawn(async move {
            let outcomes = render_all(&renderer, &snapshot).await;
            let batch = RefreshBatch {
                tick,
                origin,
                outcomes,
            };
            if batches.send(batch).is_err() {
                debug!("Event loop gone, dropping {:?} render {}", origin, tick);
            }
        })
    }

    /// Spawns a one-shot render of a single freshly admitted client
    ///
    /// The batch carries the current tick, so a periodic refresh that lands
    /// first is not overwritten by this older render.
    pub fn trigger(
        &self,
        entry: RosterEntry,
        batches: mpsc::UnboundedSender<RefreshBatch>,
    ) -> JoinHandle<()> {
        let tick = self.current_tick();
        let renderer = self.renderer.clone();

        tokio::spawn(async move {
            let client = entry.client.clone();
            let result = renderer.render(&entry).await;
            let batch = RefreshBatch {
                tick,
                origin: RefreshOrigin::Connect,
                outcomes: vec![RenderOutcome { entry, result }],
            };
            if batches.send(batch).is_err() {
                debug!("Event loop gone, dropping connect render for {}", client);
            }
        })
    }
}
