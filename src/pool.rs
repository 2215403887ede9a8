// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bounded pool of pre-configured SQLite connections.
//!
//! Idle connections sit in a FIFO queue. A checkout waits up to
//! `connection_timeout` for one to come back; only after that wait does the
//! pool try to open an extra connection, and only while fewer than
//! `max_connections` exist. A background reaper closes connections that sat
//! idle longer than `idle_timeout`, never dropping below `min_connections`.
//!
//! All bookkeeping (idle queue, the set of live ids, the in-use set) lives
//! behind one mutex so that the reaper, returns and overflow growth cannot
//! interleave. The lock is never held across an `.await` or while a
//! connection is being opened.

use crate::config::PoolConfig;
use crate::error::{Result, StorageError};
use crate::fallback::open_configured;
use crate::logging::TARGET;
use rusqlite::Connection;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct IdleConnection {
    id: u64,
    conn: Connection,
    last_used: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleConnection>,
    all: HashSet<u64>,
    in_use: HashSet<u64>,
    initialized: bool,
}

struct PoolShared {
    path: PathBuf,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Notify,
    next_id: AtomicU64,
}

/// Point-in-time counts, mainly for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
}

pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    init_gate: tokio::sync::Mutex<()>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    pub fn new(path: impl AsRef<Path>, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                path: path.as_ref().to_path_buf(),
                config,
                state: Mutex::new(PoolState::default()),
                available: Notify::new(),
                next_id: AtomicU64::new(1),
            }),
            init_gate: tokio::sync::Mutex::new(()),
            reaper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.lock().initialized
    }

    /// Open `min_connections` connections and start the idle reaper.
    /// A second call is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let _gate = self.init_gate.lock().await;
        if self.is_initialized() {
            return Ok(());
        }
        self.shared.config.validate()?;

        let mut opened = Vec::with_capacity(self.shared.config.min_connections);
        for _ in 0..self.shared.config.min_connections {
            opened.push(self.shared.open_blocking().await?);
        }
        {
            let mut state = self.shared.lock();
            let now = Instant::now();
            for conn in opened {
                let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
                state.all.insert(id);
                state.idle.push_back(IdleConnection {
                    id,
                    conn,
                    last_used: now,
                });
            }
            state.initialized = true;
        }

        let handle = tokio::spawn(reaper_loop(
            Arc::downgrade(&self.shared),
            self.shared.config.reap_interval,
        ));
        if let Some(old) = lock_reaper(&self.reaper).replace(handle) {
            old.abort();
        }

        info!(
            target: TARGET,
            event = "pool_initialized",
            min = self.shared.config.min_connections,
            max = self.shared.config.max_connections,
            path = %self.shared.path.display()
        );
        Ok(())
    }

    /// Check out a connection, growing the pool after `connection_timeout`
    /// if it is below `max_connections`, otherwise failing with
    /// [`StorageError::ConnectionExhausted`].
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        if !self.is_initialized() {
            self.initialize().await?;
        }
        let timeout = self.shared.config.connection_timeout;
        match tokio::time::timeout(timeout, self.shared.wait_for_idle()).await {
            Ok(lease) => Ok(lease),
            Err(_) => self.shared.grow(timeout).await,
        }
    }

    /// Explicit form of dropping the lease.
    pub fn return_connection(&self, lease: PooledConnection) {
        drop(lease);
    }

    /// Close idle connections older than `idle_timeout`, keeping at least
    /// `min_connections` alive. Returns how many were closed.
    pub fn reap_idle(&self) -> usize {
        self.shared.reap_idle()
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        PoolStatus {
            total: state.all.len(),
            idle: state.idle.len(),
            in_use: state.in_use.len(),
        }
    }

    /// Stop the reaper and close every idle connection. Leases still checked
    /// out are closed when they drop instead of being re-enqueued.
    pub fn close_all(&self) {
        if let Some(handle) = lock_reaper(&self.reaper).take() {
            handle.abort();
        }
        let drained: Vec<IdleConnection> = {
            let mut state = self.shared.lock();
            let drained = state.idle.drain(..).collect();
            state.all.clear();
            state.in_use.clear();
            state.initialized = false;
            drained
        };
        let closed = drained.len();
        drop(drained);
        info!(target: TARGET, event = "pool_closed", closed);
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Some(handle) = lock_reaper(&self.reaper).take() {
            handle.abort();
        }
    }
}

fn lock_reaper(m: &Mutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PoolShared {
    // Every critical section leaves the state consistent, so a poisoned lock
    // is still safe to use.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open_blocking(&self) -> Result<Connection> {
        let path = self.path.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || open_configured(&path, &config)).await?
    }

    fn try_checkout(self: &Arc<Self>) -> Option<PooledConnection> {
        let mut state = self.lock();
        let idle = state.idle.pop_front()?;
        state.in_use.insert(idle.id);
        Some(PooledConnection::pooled(Arc::clone(self), idle.id, idle.conn))
    }

    async fn wait_for_idle(self: &Arc<Self>) -> PooledConnection {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(lease) = self.try_checkout() {
                return lease;
            }
            notified.await;
        }
    }

    async fn grow(self: &Arc<Self>, waited: std::time::Duration) -> Result<PooledConnection> {
        let reservation = {
            let mut state = self.lock();
            if state.all.len() >= self.config.max_connections {
                warn!(
                    target: TARGET,
                    event = "pool_exhausted",
                    max = self.config.max_connections,
                    waited_ms = waited.as_millis() as u64
                );
                return Err(StorageError::ConnectionExhausted {
                    max: self.config.max_connections,
                    waited,
                });
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            state.all.insert(id);
            state.in_use.insert(id);
            Reservation {
                pool: self,
                id: Some(id),
            }
        };

        // The reservation releases the slot if opening fails or this future
        // is dropped mid-open.
        let conn = self.open_blocking().await?;
        let id = reservation.keep();
        let total = self.lock().all.len();
        info!(target: TARGET, event = "pool_grew", total);
        Ok(PooledConnection::pooled(Arc::clone(self), id, conn))
    }

    fn give_back(&self, id: u64, conn: Connection) {
        let mut state = self.lock();
        if state.in_use.remove(&id) {
            state.idle.push_back(IdleConnection {
                id,
                conn,
                last_used: Instant::now(),
            });
            drop(state);
            self.available.notify_one();
        } else {
            drop(state);
            drop(conn);
            debug!(target: TARGET, event = "stale_connection_closed", id);
        }
    }

    fn forget(&self, id: u64) {
        let mut state = self.lock();
        state.in_use.remove(&id);
        state.all.remove(&id);
    }

    /// Drop a slot whose connection is gone and wake one waiter.
    fn discard(&self, id: u64) {
        self.forget(id);
        self.available.notify_one();
    }

    fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let (closed, total) = {
            let mut state = self.lock();
            let mut excess = state.all.len().saturating_sub(self.config.min_connections);
            let mut closed = Vec::new();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            while let Some(idle) = state.idle.pop_front() {
                if excess > 0 && now.duration_since(idle.last_used) > self.config.idle_timeout {
                    excess -= 1;
                    closed.push(idle);
                } else {
                    kept.push_back(idle);
                }
            }
            state.idle = kept;
            for idle in &closed {
                state.all.remove(&idle.id);
            }
            (closed, state.all.len())
        };
        let count = closed.len();
        drop(closed);
        if count > 0 {
            info!(target: TARGET, event = "pool_reaped", closed = count, total);
        }
        count
    }
}

struct Reservation<'a> {
    pool: &'a PoolShared,
    id: Option<u64>,
}

impl Reservation<'_> {
    fn keep(mut self) -> u64 {
        self.id.take().unwrap_or_default()
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.pool.forget(id);
        }
    }
}

async fn reaper_loop(pool: Weak<PoolShared>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(shared) = pool.upgrade() else { break };
        shared.reap_idle();
    }
}

enum Origin {
    Pool { pool: Arc<PoolShared>, id: u64 },
    Detached,
}

impl Origin {
    fn slot(&self) -> Option<(Arc<PoolShared>, u64)> {
        match self {
            Origin::Pool { pool, id } => Some((Arc::clone(pool), *id)),
            Origin::Detached => None,
        }
    }
}

/// Meeting point between `interact` and the blocking task that holds the
/// connection while a statement runs.
#[derive(Default)]
struct Handoff {
    conn: Option<Connection>,
    finished: bool,
    abandoned: bool,
}

fn lock_handoff(m: &Mutex<Handoff>) -> MutexGuard<'_, Handoff> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lives inside the blocking task. Once the work is done (or has panicked)
/// the connection is handed to the waiting lease, or, when nobody is waiting
/// any more, straight back to the pool. Either way the pool slot stays taken
/// until the statement has finished.
struct Landing {
    handoff: Option<Arc<Mutex<Handoff>>>,
    slot: Option<(Arc<PoolShared>, u64)>,
}

impl Landing {
    fn deliver(mut self, conn: Connection) {
        self.settle(Some(conn));
    }

    fn settle(&mut self, conn: Option<Connection>) {
        let Some(handoff) = self.handoff.take() else {
            return;
        };
        let mut state = lock_handoff(&handoff);
        if !state.abandoned {
            state.finished = true;
            state.conn = conn;
            return;
        }
        drop(state);
        if let Some((pool, id)) = self.slot.take() {
            debug!(target: TARGET, event = "abandoned_work_finished", id);
            match conn {
                Some(conn) => pool.give_back(id, conn),
                None => pool.discard(id),
            }
        }
    }
}

impl Drop for Landing {
    fn drop(&mut self) {
        // Only reached without a delivery when `f` panicked.
        self.settle(None);
    }
}

/// A connection checked out from the pool (or opened by the fallback path).
///
/// Dropping the lease hands a pooled connection back to the idle queue and
/// closes a detached one. If an `interact` future is dropped while its
/// statement is still running, the blocking task returns the connection
/// itself when the statement completes.
pub struct PooledConnection {
    conn: Option<Connection>,
    in_flight: Option<Arc<Mutex<Handoff>>>,
    origin: Origin,
}

impl PooledConnection {
    fn pooled(pool: Arc<PoolShared>, id: u64, conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            in_flight: None,
            origin: Origin::Pool { pool, id },
        }
    }

    pub(crate) fn detached(conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            in_flight: None,
            origin: Origin::Detached,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.origin, Origin::Pool { .. })
    }

    /// Run blocking SQLite work on this connection off the async executor.
    ///
    /// If `f` panics the connection is discarded and its pool slot freed.
    /// Dropping the returned future does not cancel `f`.
    pub async fn interact<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.reclaim();
        let Some(mut conn) = self.conn.take() else {
            return Err(StorageError::LeaseLost);
        };
        let handoff = Arc::new(Mutex::new(Handoff::default()));
        let landing = Landing {
            handoff: Some(Arc::clone(&handoff)),
            slot: self.origin.slot(),
        };
        self.in_flight = Some(Arc::clone(&handoff));

        let joined = tokio::task::spawn_blocking(move || {
            let out = f(&mut conn);
            landing.deliver(conn);
            out
        })
        .await;

        self.in_flight = None;
        self.conn = lock_handoff(&handoff).conn.take();
        joined?
    }

    /// Pick up the connection left behind by a dropped `interact` future.
    /// If that statement is still running, the lease gives up its slot to
    /// the blocking task and becomes unusable.
    fn reclaim(&mut self) {
        let Some(handoff) = self.in_flight.take() else {
            return;
        };
        let mut state = lock_handoff(&handoff);
        if state.finished {
            self.conn = state.conn.take();
        } else {
            state.abandoned = true;
            self.origin = Origin::Detached;
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.reclaim();
        let Origin::Pool { pool, id } = &self.origin else {
            return;
        };
        match self.conn.take() {
            Some(conn) => pool.give_back(*id, conn),
            None => pool.discard(*id),
        }
    }
}
