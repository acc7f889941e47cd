//! Display engine event loop
//!
//! The engine owns the roster, both presentation managers and the session
//! sink. Everything that writes to the sink runs here, one event at a time:
//!
//! - lifecycle events admit or evict clients and tear down their displays
//! - rendered batches from the refresh scheduler are applied
//! - reload requests tear down every display and start rebuilding it
//!
//! Rendering itself happens on scheduler tasks, reload included, so a slow
//! attribute provider never stalls lifecycle handling.

use crate::board::{BoardPresentationManager, BoardRenderer};
use crate::config::EngineConfig;
use crate::error::DisplayError;
use crate::provider::{AttributeProvider, Attributes, RankSource};
use crate::roster::RosterTracker;
use crate::scheduler::{
    render_all, ClientRenderer, RefreshBatch, RefreshOrigin, RefreshReport, RefreshScheduler,
    RefreshTick,
};
use crate::sink::SessionSink;
use crate::tab::{TabPresentationManager, TabRenderer};
use display_shared::ClientId;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Connection changes reported by the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected(ClientId),
    Disconnected(ClientId),
}

/// Messages sent from handles to the engine loop
#[derive(Debug)]
enum Command {
    Lifecycle(LifecycleEvent),
    Reload,
    Shutdown,
}

/// Cloneable way to feed events into a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            error!("Failed to send {:?} to display engine", e.0);
        }
    }

    pub fn connect(&self, client: ClientId) {
        self.send(Command::Lifecycle(LifecycleEvent::Connected(client)));
    }

    pub fn disconnect(&self, client: ClientId) {
        self.send(Command::Lifecycle(LifecycleEvent::Disconnected(client)));
    }

    /// Tears down and rebuilds every connected client's display
    pub fn reload(&self) {
        self.send(Command::Reload);
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}

/// What one pass of the event loop did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Connected(ClientId),
    Disconnected(ClientId),
    /// A connect was rejected, the client is already in the roster
    Rejected(ClientId),
    /// Displays torn down, rebuild will arrive as a batch at this tick
    Reloaded(RefreshTick),
    Refreshed {
        tick: RefreshTick,
        report: RefreshReport,
    },
    Stopped,
}

/// Keeps every connected client's tab list and sidebar in sync
pub struct DisplayEngine<S: SessionSink> {
    roster: Arc<RwLock<RosterTracker>>,
    tab: TabPresentationManager,
    board: BoardPresentationManager,
    scheduler: RefreshScheduler,
    sink: S,

    /// Tick of the newest batch applied per client
    last_applied: HashMap<ClientId, RefreshTick>,

    // Communication channels
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    batch_tx: mpsc::UnboundedSender<RefreshBatch>,
    batch_rx: mpsc::UnboundedReceiver<RefreshBatch>,
}

impl<S: SessionSink> DisplayEngine<S> {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn AttributeProvider>,
        ranks: Option<Arc<dyn RankSource>>,
        sink: S,
    ) -> Self {
        let mut attributes = Attributes::new(provider, config.lookup_timeout);
        if let Some(ranks) = ranks {
            attributes = attributes.with_ranks(ranks);
        }

        let tab = TabRenderer::new(attributes.clone(), config.tab);
        let board = BoardRenderer::new(attributes, config.board);
        let scheduler = RefreshScheduler::new(
            config.refresh_interval,
            ClientRenderer {
                tab: tab.clone(),
                board: board.clone(),
            },
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();

        Self {
            roster: Arc::new(RwLock::new(RosterTracker::new())),
            tab: TabPresentationManager::new(tab),
            board: BoardPresentationManager::new(board),
            scheduler,
            sink,
            last_applied: HashMap::new(),
            command_tx,
            command_rx,
            batch_tx,
            batch_rx,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            commands: self.command_tx.clone(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn roster(&self) -> Arc<RwLock<RosterTracker>> {
        Arc::clone(&self.roster)
    }

    pub fn tab(&self) -> &TabPresentationManager {
        &self.tab
    }

    pub fn board(&self) -> &BoardPresentationManager {
        &self.board
    }

    pub fn current_tick(&self) -> RefreshTick {
        self.scheduler.current_tick()
    }

    /// Admits the client and starts a one-shot render of its displays
    ///
    /// The render is applied once its batch reaches the event loop.
    pub async fn on_connect(&mut self, client: ClientId) -> Result<(), DisplayError> {
        let entry = self.roster.write().await.admit(client)?;
        debug!("Rendering displays of {}", entry.client);
        self.scheduler.trigger(entry, self.batch_tx.clone());
        Ok(())
    }

    /// Evicts the client and removes everything shown for it
    ///
    /// Teardown runs even if the client was not in the roster.
    pub async fn on_disconnect(&mut self, client: &ClientId) {
        self.roster.write().await.evict(client);

        self.tab.teardown_one(client, &mut self.sink);
        self.board.teardown_one(client, &mut self.sink);
        self.last_applied.remove(client);
    }

    /// Applies a rendered batch
    ///
    /// Frames for clients whose session ended are skipped, as are frames
    /// older than one already applied to that client.
    pub async fn apply_batch(&mut self, batch: RefreshBatch) -> RefreshReport {
        let roster = Arc::clone(&self.roster);
        let roster = roster.read().await;

        let mut report = RefreshReport::default();
        for outcome in batch.outcomes {
            let client = outcome.entry.client.clone();

            if matches!(self.last_applied.get(&client), Some(last) if *last > batch.tick) {
                debug!(
                    "Dropping {:?} frame {} for {}, already showing a newer one",
                    batch.origin, batch.tick, client
                );
                report.skipped += 1;
                continue;
            }

            let tab = &mut self.tab;
            let board = &mut self.board;
            let sink = &mut self.sink;
            let result = outcome.result.and_then(|frame| {
                tab.apply(frame.tab, &roster, &mut *sink)?;
                board.apply(frame.board, &roster, &mut *sink)
            });

            if result.is_ok() {
                self.last_applied.insert(client.clone(), batch.tick);
            }
            report.record(&client, result);
        }

        match batch.origin {
            RefreshOrigin::Periodic => {
                let pruned = self.board.prune_torn_down();
                debug!(
                    "Refresh {}: {} applied, {} skipped, {} failed, {} old panels pruned",
                    batch.tick, report.applied, report.skipped, report.failed, pruned
                );
            }
            RefreshOrigin::Reload => info!(
                "Displays reloaded for {} clients ({} skipped, {} failed)",
                report.applied, report.skipped, report.failed
            ),
            RefreshOrigin::Connect => {}
        }
        report
    }

    /// Renders and applies every connected client right away
    pub async fn refresh_now(&mut self) -> RefreshReport {
        let tick = self.scheduler.advance();
        let snapshot = self.roster.read().await.snapshot();
        let outcomes = render_all(self.scheduler.renderer(), &snapshot).await;

        self.apply_batch(RefreshBatch {
            tick,
            origin: RefreshOrigin::Periodic,
            outcomes,
        })
        .await
    }

    /// Tears down every connected client's display and starts rebuilding it
    ///
    /// The rebuild renders off the loop and comes back as a `Reload` batch at
    /// the returned tick, applied like any other batch.
    pub async fn reload(&mut self) -> RefreshTick {
        let snapshot = self.roster.read().await.snapshot();
        for client in snapshot.client_ids() {
            self.tab.teardown_one(client, &mut self.sink);
            self.board.teardown_one(client, &mut self.sink);
        }

        // Batches rendered before the reload must not overwrite it
        let tick = self.scheduler.advance();
        self.last_applied = snapshot
            .client_ids()
            .map(|client| (client.clone(), tick))
            .collect();

        info!("Reloading displays of {} clients", snapshot.len());
        self.scheduler.spawn_render(
            snapshot,
            tick,
            RefreshOrigin::Reload,
            self.batch_tx.clone(),
        );
        tick
    }

    /// Waits for the next command or rendered batch and handles it
    pub async fn step(&mut self) -> Step {
        tokio::select! {
            biased;

            command = self.command_rx.recv() => match command {
                Some(Command::Lifecycle(LifecycleEvent::Connected(client))) => {
                    match self.on_connect(client.clone()).await {
                        Ok(()) => Step::Connected(client),
                        Err(e) => {
                            warn!("Rejected connect: {}", e);
                            Step::Rejected(client)
                        }
                    }
                }
                Some(Command::Lifecycle(LifecycleEvent::Disconnected(client))) => {
                    self.on_disconnect(&client).await;
                    Step::Disconnected(client)
                }
                Some(Command::Reload) => Step::Reloaded(self.reload().await),
                Some(Command::Shutdown) | None => Step::Stopped,
            },

            Some(batch) = self.batch_rx.recv() => {
                let tick = batch.tick;
                let report = self.apply_batch(batch).await;
                Step::Refreshed { tick, report }
            }
        }
    }

    /// Runs the engine until shutdown
    ///
    /// Starts the periodic refresh, processes events in order, and on exit
    /// stops the refresh and tears down every remaining display.
    pub async fn run(&mut self) {
        let refresher = self
            .scheduler
            .spawn_periodic(Arc::clone(&self.roster), self.batch_tx.clone());

        info!("Display engine started");

        loop {
            if let Step::Stopped = self.step().await {
                info!("Display engine shutting down");
                break;
            }
        }

        refresher.abort();

        let clients: Vec<ClientId> = self.roster.read().await.snapshot().client_ids().cloned().collect();
        for client in &clients {
            self.on_disconnect(client).await;
        }
    }
}
