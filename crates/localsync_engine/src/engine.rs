//! The sync engine orchestrator.

use crate::adapter::AdapterRegistry;
use crate::config::EngineConfig;
use crate::conflict::ConflictResolver;
use crate::cycle::CycleReport;
use crate::error::{EngineError, EngineResult};
use crate::observer::SyncObserver;
use crate::queue::SyncQueue;
use crate::remote::RemoteClient;
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use localsync_protocol::{Conflict, EntityKind, QueueItem, SyncAction};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A snapshot of the engine's process-wide counters.
///
/// Counters are monotonically increasing and reset only at process
/// start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    /// Whether the background loop is running.
    pub is_running: bool,
    /// Result of the most recent reachability check.
    pub network_available: bool,
    /// When the last successful cycle finished.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Completed sync cycles.
    pub sync_count: u64,
    /// Cycle and per-item errors.
    pub error_count: u64,
    /// Version conflicts resolved.
    pub conflict_count: u64,
    /// Pending queue items.
    pub queue_size: usize,
}

/// Shared engine state, owned by the handle and the background task.
pub(crate) struct Inner<S, R> {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<S>,
    pub(crate) remote: Arc<R>,
    pub(crate) registry: Arc<AdapterRegistry>,
    pub(crate) queue: SyncQueue<S>,
    pub(crate) resolver: ConflictResolver,
    pub(crate) observer: RwLock<Option<Arc<dyn SyncObserver>>>,
    pub(crate) user: RwLock<Option<Uuid>>,
    pub(crate) running: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    /// Bumped on every (re)start; a loop whose epoch is stale exits
    /// without touching the running flag.
    pub(crate) epoch: AtomicU64,
    pub(crate) wake: Notify,
    pub(crate) network_available: AtomicBool,
    pub(crate) cycle_lock: tokio::sync::Mutex<()>,
    pub(crate) sync_count: AtomicU64,
    pub(crate) error_count: AtomicU64,
    pub(crate) conflict_count: AtomicU64,
    pub(crate) failure_streak: AtomicU32,
    pub(crate) last_sync_time: RwLock<Option<DateTime<Utc>>>,
}

impl<S: LocalStore, R: RemoteClient> Inner<S, R> {
    /// Runs one cycle under the cycle lock and folds the outcome into
    /// the stats. Both the background loop and `sync_now` come through
    /// here, enforcing at-most-one concurrent cycle per engine.
    pub(crate) async fn run_guarded_cycle(&self, user_id: Uuid) -> EngineResult<CycleReport> {
        let _guard = self.cycle_lock.lock().await;

        match self.run_cycle(user_id).await {
            Ok(report) => {
                self.failure_streak.store(0, Ordering::SeqCst);
                self.sync_count.fetch_add(1, Ordering::SeqCst);
                *self.last_sync_time.write() = Some(Utc::now());
                let observer = self.observer.read().clone();
                if let Some(observer) = observer {
                    observer.on_success(&report);
                }
                Ok(report)
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                self.failure_streak.fetch_add(1, Ordering::SeqCst);
                let observer = self.observer.read().clone();
                if let Some(observer) = observer {
                    observer.on_error(&e);
                }
                Err(e)
            }
        }
    }

    pub(crate) fn notify_conflict(&self, conflict: &Conflict) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_conflict_resolved(conflict);
        }
    }

    /// Whether the store holds no server-acknowledged rows yet.
    fn needs_hydration(&self) -> EngineResult<bool> {
        Ok(self
            .store
            .all_entities()?
            .iter()
            .all(|(_, record)| record.synced_at.is_none()))
    }

    /// Fetches all remote entities and writes them into the store
    /// already marked synced. Returns the number of rows hydrated.
    pub(crate) async fn hydrate(&self, user_id: Uuid) -> EngineResult<usize> {
        let response = self.call_remote(self.remote.fetch_all(user_id)).await?;
        let mut hydrated = 0usize;

        for wire in &response.items {
            let Some(adapter) = self.registry.get(&wire.kind) else {
                warn!(kind = %wire.kind, "no adapter registered, skipping fetched entity");
                continue;
            };
            let mut record = match adapter.from_wire(&wire.payload) {
                Ok(record) => record,
                Err(e) => {
                    warn!(kind = %wire.kind, id = %wire.id, error = %e, "skipping malformed fetched entity");
                    continue;
                }
            };
            record.version = wire.version;
            record.server_id = Some(wire.id);
            self.store.apply_remote(&wire.kind, record)?;
            hydrated += 1;
        }

        info!(count = hydrated, total = response.count, "hydration complete");
        Ok(hydrated)
    }
}

/// The synchronization engine.
///
/// Owns the background scheduling loop, the cycle lock discipline, and
/// the process-wide stats. Local use never blocks on the engine: the
/// application writes to its store and enqueues mutations; the engine
/// reconciles in the background whenever the network allows.
pub struct SyncEngine<S, R> {
    inner: Arc<Inner<S, R>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    /// Creates an engine over the given collaborators.
    pub fn new(
        config: EngineConfig,
        store: Arc<S>,
        remote: Arc<R>,
        registry: AdapterRegistry,
    ) -> Self {
        let registry = Arc::new(registry);
        let queue = SyncQueue::new(Arc::clone(&store), Arc::clone(&registry), config.max_retries);
        let resolver = ConflictResolver::new(config.strategy);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                remote,
                registry,
                queue,
                resolver,
                observer: RwLock::new(None),
                user: RwLock::new(None),
                running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                wake: Notify::new(),
                network_available: AtomicBool::new(false),
                cycle_lock: tokio::sync::Mutex::new(()),
                sync_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                conflict_count: AtomicU64::new(0),
                failure_streak: AtomicU32::new(0),
                last_sync_time: RwLock::new(None),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Registers the observer receiving cycle and conflict events.
    pub fn register_observer(&self, observer: Arc<dyn SyncObserver>) {
        *self.inner.observer.write() = Some(observer);
    }

    /// Sets the account context without starting the background loop,
    /// for callers that only drive `sync_now` manually.
    pub fn set_account(&self, user_id: Uuid) {
        *self.inner.user.write() = Some(user_id);
    }

    /// The queue view, for enqueueing local mutations.
    pub fn queue(&self) -> &SyncQueue<S> {
        &self.inner.queue
    }

    /// Starts the background loop for the given account.
    ///
    /// Fails with [`EngineError::MissingAccount`] when no account is
    /// provided; calling while already running is a no-op, but calling
    /// after a non-blocking `stop` restarts the loop (the draining
    /// task exits on its own, superseded by the new one). Must be
    /// called from within a tokio runtime.
    pub fn start(&self, user_id: Option<Uuid>) -> EngineResult<()> {
        let user_id = user_id.ok_or(EngineError::MissingAccount)?;

        let draining = self.inner.shutdown.load(Ordering::SeqCst);
        if self.inner.running.swap(true, Ordering::SeqCst) && !draining {
            warn!("sync engine already running, ignoring start");
            return Ok(());
        }

        *self.inner.user.write() = Some(user_id);
        self.inner.shutdown.store(false, Ordering::SeqCst);
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        // wake a superseded loop: the permit covers one not yet
        // parked, the broadcast covers one already on the idle wait
        self.inner.wake.notify_one();
        self.inner.wake.notify_waiters();

        let inner = Arc::clone(&self.inner);
        *self.handle.lock() = Some(tokio::spawn(run_loop(inner, epoch)));
        info!(%user_id, "sync engine started");
        Ok(())
    }

    /// Signals the background loop to stop.
    ///
    /// With `wait`, blocks until the loop exits or `timeout` elapses;
    /// an overrun is reported by returning `false`, never escalated —
    /// the task is detached and finishes its current step on its own.
    /// Without `wait`, the handle stays in place so a later blocking
    /// `stop` can still join the draining loop. Shutdown latency is
    /// bounded by one in-flight request because the cancellation flag
    /// is only checked between items and cycles.
    pub async fn stop(&self, wait: bool, timeout: Duration) -> bool {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
        self.inner.wake.notify_waiters();

        if !wait {
            return true;
        }

        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return true;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => {
                info!("sync engine stopped");
                true
            }
            Err(_) => {
                warn!(?timeout, "sync loop did not stop within timeout, detaching");
                false
            }
        }
    }

    /// Runs one cycle now, under the same lock as the background loop.
    ///
    /// Returns `Ok(false)` when the network is unreachable or any item
    /// failed; the failures stay queued for later cycles.
    pub async fn sync_now(&self) -> EngineResult<bool> {
        let user_id = self.inner.user.read().ok_or(EngineError::MissingAccount)?;

        let online = self.inner.remote.ping().await;
        self.inner.network_available.store(online, Ordering::SeqCst);
        if !online {
            debug!("manual sync requested while offline");
            return Ok(false);
        }

        let report = self.inner.run_guarded_cycle(user_id).await?;
        Ok(report.is_clean())
    }

    /// Shortens the idle wait of a sleeping loop.
    ///
    /// Never preempts an in-progress cycle or bypasses the cycle lock.
    pub fn request_immediate_sync(&self, reason: &str) {
        debug!(reason, "immediate sync requested");
        self.inner.wake.notify_one();
    }

    /// One-shot hydration: fetches all remote entities for the account
    /// and writes them into the store already marked synced. Returns
    /// whether anything was hydrated.
    ///
    /// `start` runs the same hydration automatically when the store
    /// holds no synced rows yet; this entry point is for callers that
    /// want to hydrate eagerly (e.g. right after sign-in) or re-pull
    /// on demand.
    pub async fn initial_sync(&self) -> EngineResult<bool> {
        let user_id = self.inner.user.read().ok_or(EngineError::MissingAccount)?;
        Ok(self.inner.hydrate(user_id).await? > 0)
    }

    /// Re-enqueues an unsynced local row whose queue item was dropped.
    pub fn force_resync(&self, kind: &EntityKind, entity_id: Uuid) -> EngineResult<()> {
        let record = self
            .inner
            .store
            .get_entity(kind, entity_id)?
            .ok_or_else(|| EngineError::store(format!("no local row for {kind} {entity_id}")))?;

        let adapter = self.inner.registry.require(kind)?;
        let snapshot = adapter.to_wire(&record)?;
        let action = if record.is_deleted() {
            SyncAction::Delete
        } else {
            SyncAction::Upsert
        };
        self.inner.queue.enqueue(kind.clone(), entity_id, action, snapshot)
    }

    /// Snapshot of the process-wide stats.
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            is_running: self.inner.running.load(Ordering::SeqCst),
            network_available: self.inner.network_available.load(Ordering::SeqCst),
            last_sync_time: *self.inner.last_sync_time.read(),
            sync_count: self.inner.sync_count.load(Ordering::SeqCst),
            error_count: self.inner.error_count.load(Ordering::SeqCst),
            conflict_count: self.inner.conflict_count.load(Ordering::SeqCst),
            queue_size: self.inner.queue.len().unwrap_or(0),
        }
    }

    /// All pending queue items in dependency order.
    pub fn get_queue_status(&self) -> EngineResult<Vec<QueueItem>> {
        self.inner.queue.status()
    }
}

/// The background loop: hydrate a cold store once, then ping, cycle,
/// wait, repeat.
///
/// Errors inside a cycle are counted and swallowed; the loop itself is
/// never fatal. The idle wait backs off while cycles keep failing and
/// resets to the configured interval on success; an immediate-sync
/// request only shortens the wait. A loop whose epoch has been
/// superseded by a restart exits at the next check without clearing
/// the running flag.
async fn run_loop<S, R>(inner: Arc<Inner<S, R>>, epoch: u64)
where
    S: LocalStore + 'static,
    R: RemoteClient + 'static,
{
    info!("sync loop running");

    let stopping = |inner: &Inner<S, R>| {
        inner.shutdown.load(Ordering::SeqCst) || inner.epoch.load(Ordering::SeqCst) != epoch
    };

    // cold start: pull server state before the first cycle
    match inner.needs_hydration() {
        Ok(true) => {
            if inner.remote.ping().await {
                let user = *inner.user.read();
                if let Some(user_id) = user {
                    match inner.hydrate(user_id).await {
                        Ok(count) => info!(count, "hydrated cold store at startup"),
                        Err(e) => {
                            warn!(error = %e, "startup hydration failed, continuing with cycles");
                            inner.error_count.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }
        }
        Ok(false) => {}
        Err(e) => warn!(error = %e, "could not inspect store for startup hydration"),
    }

    loop {
        if stopping(&inner) {
            break;
        }

        let online = inner.remote.ping().await;
        inner.network_available.store(online, Ordering::SeqCst);

        if online {
            let user = *inner.user.read();
            if let Some(user_id) = user {
                if let Err(e) = inner.run_guarded_cycle(user_id).await {
                    warn!(error = %e, "sync cycle failed");
                }
            }
        } else {
            debug!("network unavailable, skipping sync cycle");
        }

        if stopping(&inner) {
            break;
        }

        let streak = inner.failure_streak.load(Ordering::SeqCst);
        let wait = if streak == 0 {
            inner.config.sync_interval
        } else {
            inner.config.backoff.delay_for_streak(streak)
        };

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = inner.wake.notified() => {
                debug!("idle wait cut short");
            }
        }
    }

    if inner.epoch.load(Ordering::SeqCst) == epoch {
        inner.running.store(false, Ordering::SeqCst);
    }
    info!("sync loop stopped");
}
