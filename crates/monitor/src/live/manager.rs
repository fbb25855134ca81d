//! Single-owner monitor loop.
//!
//! One spawned task owns the [`SessionSet`]. Watcher callbacks and the
//! periodic process poll only feed that task; it parses, upserts and
//! reconciles serially, then publishes an immutable snapshot. Readers never
//! see a half-applied pass.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use claude_watch_core::{
    parse_session, scan_sessions, ParseError, ProcessMap, Session, SessionSet, Upsert,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::process::{locate_processes, ProcessSource};
use super::watcher::ChangeFeed;
use crate::config::MonitorConfig;
use crate::error::MonitorError;

const EVENT_CAPACITY: usize = 256;

/// Changes published after each pass of the owner loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// A transcript seen for the first time.
    SessionDiscovered { session: Box<Session> },
    /// A known transcript was re-parsed.
    SessionUpdated { session: Box<Session> },
    /// Liveness was recomputed for the whole set.
    Reconciled { live: usize },
}

/// Scan and locate once, concurrently, then reconcile. Used for the initial
/// load and by one-shot callers that do not need a running monitor.
pub async fn load_once(
    config: &MonitorConfig,
    source: Arc<dyn ProcessSource>,
) -> Result<SessionSet, MonitorError> {
    let (scanned, processes) = tokio::join!(scan_sessions(&config.root), locate(config, source));
    let mut set = SessionSet::new();
    set.replace_all(scanned?);
    let live = set.reconcile(&processes);
    info!("Loaded {} sessions, {} live", set.len(), live);
    Ok(set)
}

async fn locate(config: &MonitorConfig, source: Arc<dyn ProcessSource>) -> ProcessMap {
    let target = config.process_name.clone();
    let deadline = config.locate_deadline;
    tokio::task::spawn_blocking(move || locate_processes(source.as_ref(), &target, deadline))
        .await
        .unwrap_or_else(|e| {
            warn!("Process locator task failed: {}", e);
            ProcessMap::new()
        })
}

pub struct Monitor;

impl Monitor {
    /// Spawn the owner task. Must be called from within a tokio runtime.
    pub fn spawn(config: MonitorConfig, source: Arc<dyn ProcessSource>) -> MonitorHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(SessionSet::new()));
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let owner = Owner {
            sessions: SessionSet::new(),
            config,
            source,
            snapshot_tx,
            events_tx: events_tx.clone(),
        };
        let task = tokio::spawn(owner.run(cancel.clone()));

        MonitorHandle {
            snapshot: snapshot_rx,
            events: events_tx,
            cancel,
            task,
        }
    }
}

/// Read side of a running monitor.
pub struct MonitorHandle {
    snapshot: watch::Receiver<Arc<SessionSet>>,
    events: broadcast::Sender<MonitorEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// The latest published session set.
    pub fn snapshot(&self) -> Arc<SessionSet> {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified whenever a new snapshot is published.
    pub fn snapshots(&self) -> watch::Receiver<Arc<SessionSet>> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Stop the owner task, release the file watch, and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Monitor task ended abnormally: {}", e);
        }
    }
}

struct Owner {
    sessions: SessionSet,
    config: MonitorConfig,
    source: Arc<dyn ProcessSource>,
    snapshot_tx: watch::Sender<Arc<SessionSet>>,
    events_tx: broadcast::Sender<MonitorEvent>,
}

impl Owner {
    async fn run(mut self, cancel: CancellationToken) {
        // Watch before the initial scan so writes during the scan are queued, not lost.
        let (path_tx, mut path_rx) = mpsc::channel::<PathBuf>(self.config.queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let mut feed = match ChangeFeed::start(&self.config.root, enqueue(path_tx, dropped.clone())) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!("{}; relying on periodic process poll only", e);
                None
            }
        };
        let mut drops_seen = 0u64;

        self.full_load().await;

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial load already covered it.
        poll.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(first) = path_rx.recv() => {
                    let mut batch = BTreeSet::from([first]);
                    while let Ok(path) = path_rx.try_recv() {
                        batch.insert(path);
                    }

                    let drops = dropped.load(Ordering::Relaxed);
                    if drops > drops_seen {
                        drops_seen = drops;
                        info!(dropped_total = drops, "Watcher events were dropped; rescanning");
                        self.full_load().await;
                    } else {
                        self.apply_changes(batch).await;
                    }
                }
                _ = poll.tick() => self.refresh_liveness().await,
            }
        }

        if let Some(feed) = feed.as_mut() {
            feed.stop();
        }
        info!("Monitor stopped");
    }

    /// Rebuild the whole set from disk.
    async fn full_load(&mut self) {
        match load_once(&self.config, self.source.clone()).await {
            Ok(set) => {
                let known: BTreeSet<String> = self.sessions.iter().map(|s| s.id.clone()).collect();
                self.sessions = set;
                let live = self.sessions.live().count();
                for session in self.sessions.iter() {
                    let session = Box::new(session.clone());
                    let event = if known.contains(&session.id) {
                        MonitorEvent::SessionUpdated { session }
                    } else {
                        MonitorEvent::SessionDiscovered { session }
                    };
                    let _ = self.events_tx.send(event);
                }
                let _ = self.events_tx.send(MonitorEvent::Reconciled { live });
                self.publish();
            }
            Err(e) => warn!("Transcript scan failed: {}", e),
        }
    }

    /// Re-parse each changed transcript, then one locate and a full reconcile.
    async fn apply_changes(&mut self, paths: BTreeSet<PathBuf>) {
        for path in paths {
            let session = match parse_session(&path).await {
                Ok(session) => session,
                Err(ParseError::NotFound { .. }) => {
                    debug!("Transcript vanished before parse: {:?}", path);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping transcript {:?}: {}", path, e);
                    continue;
                }
            };
            let boxed = Box::new(session.clone());
            let event = match self.sessions.upsert(session) {
                Upsert::Inserted => MonitorEvent::SessionDiscovered { session: boxed },
                Upsert::Replaced => MonitorEvent::SessionUpdated { session: boxed },
            };
            let _ = self.events_tx.send(event);
        }
        self.refresh_liveness().await;
    }

    async fn refresh_liveness(&mut self) {
        let processes = locate(&self.config, self.source.clone()).await;
        let live = self.sessions.reconcile(&processes);
        let _ = self.events_tx.send(MonitorEvent::Reconciled { live });
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.sessions.clone()));
    }
}

/// Watcher callback: hand the path to the owner's queue without blocking.
/// A full queue drops the event and counts it; the owner rescans on its next
/// pass when it notices.
fn enqueue(tx: mpsc::Sender<PathBuf>, dropped: Arc<AtomicU64>) -> impl Fn(PathBuf) + Send + 'static {
    move |path| {
        if tx.try_send(path).is_err() {
            let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if count == 1 || count % 100 == 0 {
                warn!(dropped_total = count, "Change queue full; event dropped");
            }
        }
    }
}
