//! Live pipeline: sources → hub → store → dispatcher, plus periodic tasks.
//!
//! # Architecture
//!
//! - One task per source pushes `Sentence`s into a bounded hub queue
//! - The hub worker owns the `RoutingHub` and feeds decoded records to
//!   the store worker, the only writer of the `ContactStore`
//! - Aging, snapshot and stats tasks reach the workers through unbounded
//!   command channels; replies come back on oneshots
//! - The printer drains the `EventDispatcher` and writes JSON lines
//!
//! Shutdown cancels the sources first. The hub and store stop when their
//! input queues close, then the periodic tasks and the printer stop.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use ais_core::config::Config;
use ais_core::contacts::{IdentificationRecord, RemarkEntry};
use ais_core::hub::{RawEntry, SourceStats};
use ais_core::snapshot::{MetadataRow, PositionRow};
use ais_core::{ChangeEvent, ContactStore, DecodedRecord, EventDispatcher, Mmsi};
use ais_core::{Route, RoutingHub, RoutingMatrix};

use crate::db::Database;
use crate::outputs::{self, ChannelSink, OUTPUT_QUEUE_CAPACITY};
use crate::sources::{self, now_secs, Sentence, SourceReport};

/// Capacity of the source → hub and hub → store queues.
pub const INGEST_QUEUE_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub aging_interval: Duration,
    pub snapshot_interval: Duration,
    pub stats_interval: Duration,
    pub print_interval: Duration,
    /// Write events to stdout as JSON lines.
    pub print_events: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            aging_interval: Duration::from_secs(10),
            snapshot_interval: Duration::from_secs(60),
            stats_interval: Duration::from_secs(60),
            print_interval: Duration::from_millis(250),
            print_events: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker commands
// ---------------------------------------------------------------------------

pub enum HubCommand {
    Stats(oneshot::Sender<BTreeMap<String, SourceStats>>),
    DrainRaw(oneshot::Sender<Vec<RawEntry>>),
}

pub enum StoreCommand {
    Sweep { now: f64 },
    Query { mmsi: Mmsi, reply: oneshot::Sender<ChangeEvent> },
    SetRemarks(HashMap<Mmsi, RemarkEntry>),
    SetManualPosition { lat: f64, lon: f64 },
    IdDb,
    Snapshot { now: f64, reply: oneshot::Sender<Snapshot> },
    ContactCount(oneshot::Sender<usize>),
}

/// Rows for the persistence sink.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub positions: Vec<PositionRow>,
    pub metadata: Vec<MetadataRow>,
    pub identifications: Vec<IdentificationRecord>,
}

impl Snapshot {
    fn take(store: &mut ContactStore, now: f64) -> Self {
        Snapshot {
            positions: store.position_rows(now),
            metadata: store.metadata_rows(now),
            identifications: store.identification_rows(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Single owner of the `RoutingHub`. Exits when every source has stopped.
pub async fn hub_worker(
    mut hub: RoutingHub,
    mut lines: mpsc::Receiver<Sentence>,
    mut commands: mpsc::UnboundedReceiver<HubCommand>,
    records: mpsc::Sender<(String, DecodedRecord)>,
) -> BTreeMap<String, SourceStats> {
    loop {
        tokio::select! {
            biased;
            Some(cmd) = commands.recv() => match cmd {
                HubCommand::Stats(reply) => { let _ = reply.send(hub.stats()); }
                HubCommand::DrainRaw(reply) => { let _ = reply.send(hub.drain_raw()); }
            },
            sentence = lines.recv() => {
                let Some(s) = sentence else { break };
                if let Some(record) = hub.ingest(&s.source, &s.line, s.timestamp) {
                    if records.send((s.source, record)).await.is_err() {
                        warn!("store worker gone, hub stopping");
                        break;
                    }
                }
            }
        }
    }
    info!("hub stopped");
    hub.stats()
}

/// Single writer of the `ContactStore`. Exits when the hub has stopped.
pub async fn store_worker(
    mut store: ContactStore,
    mut records: mpsc::Receiver<(String, DecodedRecord)>,
    mut commands: mpsc::UnboundedReceiver<StoreCommand>,
    dispatcher: Arc<EventDispatcher>,
) -> ContactStore {
    loop {
        tokio::select! {
            biased;
            Some(cmd) = commands.recv() => handle_store_command(&mut store, cmd, &dispatcher),
            record = records.recv() => {
                let Some((source, record)) = record else { break };
                if let Some(event) = store.apply(&source, &record) {
                    dispatcher.emit(event);
                }
            }
        }
    }
    info!(contacts = store.len(), "store stopped");
    store
}

fn handle_store_command(store: &mut ContactStore, cmd: StoreCommand, dispatcher: &EventDispatcher) {
    match cmd {
        StoreCommand::Sweep { now } => {
            let events = store.sweep(now);
            if !events.is_empty() {
                debug!(events = events.len(), "aging sweep");
            }
            dispatcher.emit_all(events);
        }
        StoreCommand::Query { mmsi, reply } => {
            let _ = reply.send(store.query(mmsi));
        }
        StoreCommand::SetRemarks(remarks) => dispatcher.emit(store.set_remarks(remarks)),
        StoreCommand::SetManualPosition { lat, lon } => {
            dispatcher.emit(store.set_manual_position(lat, lon, now_secs()));
        }
        StoreCommand::IdDb => dispatcher.emit(store.iddb()),
        StoreCommand::Snapshot { now, reply } => {
            let _ = reply.send(Snapshot::take(store, now));
        }
        StoreCommand::ContactCount(reply) => {
            let _ = reply.send(store.len());
        }
    }
}

/// Periodically ask the store to age its contacts.
pub async fn aging_task(
    store: mpsc::UnboundedSender<StoreCommand>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if store.send(StoreCommand::Sweep { now: now_secs() }).is_err() {
                    break;
                }
            }
        }
    }
    debug!("aging stopped");
}

/// Write a snapshot to the database.
pub fn write_snapshot(db: &mut Database, snapshot: &Snapshot) {
    let result = db
        .add_positions(&snapshot.positions)
        .and_then(|_| db.add_metadata(&snapshot.metadata))
        .and_then(|_| db.upsert_identifications(&snapshot.identifications));
    match result {
        Ok(_) => debug!(
            positions = snapshot.positions.len(),
            metadata = snapshot.metadata.len(),
            "snapshot written"
        ),
        Err(e) => warn!(error = %e, "snapshot write failed"),
    }
}

/// Periodically pull snapshot rows from the store into SQLite.
pub async fn snapshot_task(
    mut db: Database,
    store: mpsc::UnboundedSender<StoreCommand>,
    interval: Duration,
    shutdown: CancellationToken,
) -> Database {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let (reply, rx) = oneshot::channel();
                if store.send(StoreCommand::Snapshot { now: now_secs(), reply }).is_err() {
                    break;
                }
                let Ok(snapshot) = rx.await else { break };
                write_snapshot(&mut db, &snapshot);
            }
        }
    }
    db
}

/// Periodic received/parsed log line per source.
pub async fn stats_task(
    hub: mpsc::UnboundedSender<HubCommand>,
    store: mpsc::UnboundedSender<StoreCommand>,
    dispatcher: Arc<EventDispatcher>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let (reply, rx) = oneshot::channel();
                if hub.send(HubCommand::Stats(reply)).is_err() {
                    break;
                }
                let Ok(stats) = rx.await else { break };
                for (source, s) in &stats {
                    info!(source = %source, received = s.received, parsed = s.parsed, failed = s.failed, "source stats");
                }

                let (reply, rx) = oneshot::channel();
                if hub.send(HubCommand::DrainRaw(reply)).is_ok() {
                    if let Ok(raw) = rx.await {
                        for entry in &raw {
                            trace!(source = %entry.source, kind = ?entry.kind, mmsi = ?entry.mmsi, line = %entry.line, "raw");
                        }
                        debug!(raw = raw.len(), "raw ring drained");
                    }
                }

                let (reply, rx) = oneshot::channel();
                if store.send(StoreCommand::ContactCount(reply)).is_ok() {
                    if let Ok(contacts) = rx.await {
                        info!(contacts, events_dropped = dispatcher.dropped(), "store stats");
                    }
                }
            }
        }
    }
}

/// Drain the dispatcher and write each event as one JSON line.
pub fn print_events<W: Write>(dispatcher: &EventDispatcher, out: &mut W) -> std::io::Result<usize> {
    let events = dispatcher.drain();
    for event in &events {
        match serde_json::to_string(event) {
            Ok(json) => writeln!(out, "{json}")?,
            Err(e) => warn!(error = %e, "event not serializable"),
        }
    }
    out.flush()?;
    Ok(events.len())
}

/// The presentation consumer. Drains once more after shutdown.
pub async fn printer_task(dispatcher: Arc<EventDispatcher>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = print_events(&dispatcher, &mut std::io::stdout().lock()) {
                    warn!(error = %e, "stdout write failed");
                    break;
                }
            }
        }
    }
    let _ = print_events(&dispatcher, &mut std::io::stdout().lock());
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Handles to a running pipeline.
pub struct Pipeline {
    pub dispatcher: Arc<EventDispatcher>,
    pub hub_commands: mpsc::UnboundedSender<HubCommand>,
    pub store_commands: mpsc::UnboundedSender<StoreCommand>,
    sources: JoinSet<SourceReport>,
    source_shutdown: CancellationToken,
    task_shutdown: CancellationToken,
    hub: JoinHandle<BTreeMap<String, SourceStats>>,
    store: JoinHandle<ContactStore>,
    aging: JoinHandle<()>,
    stats: JoinHandle<()>,
    snapshots: Option<JoinHandle<Database>>,
    printer: Option<JoinHandle<()>>,
    outputs: Vec<JoinHandle<()>>,
}

/// What the pipeline did, returned by `shutdown`.
#[derive(Debug)]
pub struct PipelineSummary {
    pub stats: BTreeMap<String, SourceStats>,
    pub contacts: usize,
    pub events_dropped: u64,
}

impl Pipeline {
    /// Build every stage from `config` and start it.
    pub async fn start(config: &Config, db: Option<Database>, options: PipelineOptions) -> Result<Self> {
        let mut store = ContactStore::new(config.contacts.clone(), config.position.clone());
        if let Some(db) = &db {
            let known = db
                .load_identifications()
                .context("loading identification table")?;
            info!(records = known.len(), "identification table loaded");
            store.load_identities(known);
        }

        let matrix = RoutingMatrix::from_sources(&config.sources);
        let mut hub = RoutingHub::new(matrix);
        let mut outputs = Vec::new();

        if let Some(path) = &config.outputs.serial {
            let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
            hub.add_sink(Route::Serial, Box::new(ChannelSink::new(tx)));
            let path = PathBuf::from(path);
            outputs.push(tokio::spawn(async move {
                if let Err(e) = outputs::run_serial_out(path, rx).await {
                    warn!(error = %e, "serial-out failed");
                }
            }));
        }
        if let Some(addr) = &config.outputs.network {
            let listener = TcpListener::bind(addr.as_str())
                .await
                .with_context(|| format!("binding network-out on {addr}"))?;
            let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
            hub.add_sink(Route::Network, Box::new(ChannelSink::new(tx)));
            outputs.push(tokio::spawn(outputs::run_network_out(listener, rx)));
        }
        for source in &config.sources {
            if source.route_serial && config.outputs.serial.is_none() {
                warn!(source = %source.name, "routed to serial-out, but no serial output configured");
            }
            if source.route_network && config.outputs.network.is_none() {
                warn!(source = %source.name, "routed to network-out, but no network output configured");
            }
        }

        let dispatcher = Arc::new(EventDispatcher::default());
        let source_shutdown = CancellationToken::new();
        let task_shutdown = CancellationToken::new();

        let (line_tx, line_rx) = mpsc::channel(INGEST_QUEUE_CAPACITY);
        let (record_tx, record_rx) = mpsc::channel(INGEST_QUEUE_CAPACITY);
        let (hub_tx, hub_rx) = mpsc::unbounded_channel();
        let (store_tx, store_rx) = mpsc::unbounded_channel();

        let mut sources = JoinSet::new();
        for source in &config.sources {
            sources.spawn(sources::run_source(
                source.clone(),
                line_tx.clone(),
                source_shutdown.clone(),
            ));
        }
        drop(line_tx);
        if config.sources.is_empty() {
            warn!("no sources configured");
        }

        let hub = tokio::spawn(hub_worker(hub, line_rx, hub_rx, record_tx));
        let store = tokio::spawn(store_worker(store, record_rx, store_rx, Arc::clone(&dispatcher)));
        let aging = tokio::spawn(aging_task(
            store_tx.clone(),
            options.aging_interval,
            task_shutdown.clone(),
        ));
        let stats = tokio::spawn(stats_task(
            hub_tx.clone(),
            store_tx.clone(),
            Arc::clone(&dispatcher),
            options.stats_interval,
            task_shutdown.clone(),
        ));
        let snapshots = db.map(|db| {
            tokio::spawn(snapshot_task(
                db,
                store_tx.clone(),
                options.snapshot_interval,
                task_shutdown.clone(),
            ))
        });
        let printer = options.print_events.then(|| {
            tokio::spawn(printer_task(
                Arc::clone(&dispatcher),
                options.print_interval,
                task_shutdown.clone(),
            ))
        });

        info!(sources = config.sources.len(), "pipeline started");
        Ok(Pipeline {
            dispatcher,
            hub_commands: hub_tx,
            store_commands: store_tx,
            sources,
            source_shutdown,
            task_shutdown,
            hub,
            store,
            aging,
            stats,
            snapshots,
            printer,
            outputs,
        })
    }

    /// Resolve once every source has reached end of stream.
    pub async fn sources_finished(&mut self) {
        while let Some(joined) = self.sources.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "source task failed");
            }
        }
    }

    /// Stop source → hub → store → periodic tasks, in that order.
    pub async fn shutdown(mut self) -> Result<PipelineSummary> {
        self.source_shutdown.cancel();
        self.sources_finished().await;

        let stats = self.hub.await.context("hub worker panicked")?;
        for output in self.outputs {
            let _ = output.await;
        }

        drop(self.hub_commands);
        drop(self.store_commands);
        let mut store = self.store.await.context("store worker panicked")?;

        self.task_shutdown.cancel();
        let _ = self.aging.await;
        let _ = self.stats.await;
        if let Some(snapshots) = self.snapshots {
            let mut db = snapshots.await.context("snapshot task panicked")?;
            write_snapshot(&mut db, &Snapshot::take(&mut store, now_secs()));
        }
        if let Some(printer) = self.printer {
            let _ = printer.await;
        }

        let summary = PipelineSummary {
            stats,
            contacts: store.len(),
            events_dropped: self.dispatcher.dropped(),
        };
        info!(contacts = summary.contacts, "pipeline stopped");
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
