//!
//! Connection registry
//! -------------------
//! The process-wide set of live sessions. A session is present exactly while
//! its worker runs: the listener registers on accept and the returned RAII
//! guard, moved into the worker task, deregisters on every exit path
//! (normal close, error, panic, abort). `close_all` is the shutdown escape
//! hatch: it walks the set once and aborts every worker, which drops its
//! socket and unblocks any pending read or write.
//!
//! The mutex is held only for the duration of one register/deregister/count
//! operation, never across socket I/O.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::metrics::MetricsSink;

struct ConnectionHandle {
    peer: SocketAddr,
    abort: Option<AbortHandle>,
}

pub struct Registry {
    sessions: Mutex<HashMap<u64, ConnectionHandle>>,
    next_id: AtomicU64,
    metrics: MetricsSink,
}

impl Registry {
    pub fn new(metrics: MetricsSink) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics,
        })
    }

    /// Add a session on accept. The guard deregisters when dropped.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> RegistryGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut sessions = self.sessions.lock();
            sessions.insert(id, ConnectionHandle { peer, abort: None });
            sessions.len()
        };
        debug!(target: "ferry::registry", "registered session {} for {} ({} live)", id, peer, count);
        self.metrics.emit("ActiveClients", count as f64);
        RegistryGuard { registry: self.clone(), id }
    }

    /// Attach the worker's abort handle once it has been spawned. A no-op if
    /// the session already finished.
    pub fn arm(&self, id: u64, abort: AbortHandle) {
        if let Some(handle) = self.sessions.lock().get_mut(&id) {
            handle.abort = Some(abort);
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Walk the set once, force-close every live session and clear it.
    pub fn close_all(&self) {
        let drained: Vec<(u64, ConnectionHandle)> =
            self.sessions.lock().drain().collect();
        for (id, handle) in drained {
            debug!(target: "ferry::registry", "force-closing session {} for {}", id, handle.peer);
            if let Some(abort) = handle.abort {
                abort.abort();
            }
        }
        self.metrics.emit("ActiveClients", 0.0);
    }

    fn deregister(&self, id: u64) {
        let count = {
            let mut sessions = self.sessions.lock();
            sessions.remove(&id);
            sessions.len()
        };
        debug!(target: "ferry::registry", "deregistered session {} ({} live)", id, count);
        self.metrics.emit("ActiveClients", count as f64);
    }
}

pub struct RegistryGuard {
    registry: Arc<Registry>,
    id: u64,
}

impl RegistryGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
