//! Name-indexed store of live resources. Each entry owns the command
//! channel of the resource's actor; one mutex over the map makes
//! resolution and eviction mutually exclusive per name, while admissions
//! themselves stay per-resource inside the actors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::error::Error;
use crate::scheduler::{self, Cmd};
use crate::types::ResourceName;

/// Liveness bookkeeping shared between the registry, the actor, and every
/// pinned reference. The reaper consults it under the registry mutex.
#[derive(Debug)]
pub struct ResourceMeta {
    /// Live [`ResourceRef`] pins; nonzero blocks eviction
    pins: AtomicUsize,
    /// Holders plus waiters, maintained by the actor
    busy: AtomicUsize,
    /// Refreshed when the busy count drops back to zero
    last_idle: Mutex<Instant>,
    /// Fixed by the creating request
    idle_lifespan: Duration,
}

impl ResourceMeta {
    fn new(idle_lifespan: Duration) -> Self {
        Self {
            pins: AtomicUsize::new(1),
            busy: AtomicUsize::new(0),
            last_idle: Mutex::new(Instant::now()),
            idle_lifespan,
        }
    }

    /// Called by the actor after applying each command
    pub fn update(&self, busy: usize) {
        let prev = self.busy.swap(busy, Ordering::SeqCst);
        if busy == 0 && prev != 0 {
            *lock_ignore_poison(&self.last_idle) = Instant::now();
        }
    }

    fn evictable(&self, now: Instant) -> bool {
        if self.pins.load(Ordering::SeqCst) != 0 || self.busy.load(Ordering::SeqCst) != 0 {
            return false;
        }
        let idle_since = *lock_ignore_poison(&self.last_idle);
        now.saturating_duration_since(idle_since) > self.idle_lifespan
    }
}

struct Entry {
    tx: mpsc::Sender<Cmd>,
    meta: Arc<ResourceMeta>,
}

/// Pinned reference to a live resource, handed out by
/// [`Registry::resolve`]. While any pin exists the reaper leaves the entry
/// alone; sessions drop it the moment they stop caring.
#[derive(Debug)]
pub struct ResourceRef {
    tx: mpsc::Sender<Cmd>,
    meta: Arc<ResourceMeta>,
}

impl ResourceRef {
    /// Command channel of the resource's actor
    pub fn sender(&self) -> &mpsc::Sender<Cmd> {
        &self.tx
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        self.meta.pins.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The daemon's shared resource map.
pub struct Registry {
    inner: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a pinned reference, creating the resource (actor spawned,
    /// idle lifespan fixed) on first reference when `create` allows it.
    /// Creation spawns a task, so this must run inside a tokio runtime.
    pub fn resolve(
        &self,
        name: &ResourceName,
        create: bool,
        idle_lifespan: Duration,
    ) -> Result<ResourceRef, Error> {
        let mut map = lock_ignore_poison(&self.inner);
        if let Some(entry) = map.get(name.as_str()) {
            entry.meta.pins.fetch_add(1, Ordering::SeqCst);
            return Ok(ResourceRef {
                tx: entry.tx.clone(),
                meta: Arc::clone(&entry.meta),
            });
        }
        if !create {
            return Err(Error::ResourceNotFound);
        }
        let meta = Arc::new(ResourceMeta::new(idle_lifespan));
        let tx = scheduler::spawn(name.clone(), Arc::clone(&meta));
        map.insert(
            name.as_str().to_string(),
            Entry {
                tx: tx.clone(),
                meta: Arc::clone(&meta),
            },
        );
        tracing::debug!(resource = %name, kind = ?name.kind(), "resource created");
        Ok(ResourceRef { tx, meta })
    }

    /// Evicts every unpinned, idle, expired resource and returns their
    /// names. The map lock is held for the whole sweep, so no resolve can
    /// interleave with an eviction.
    pub fn sweep(&self, now: Instant) -> Vec<String> {
        let mut map = lock_ignore_poison(&self.inner);
        let mut evicted = Vec::new();
        map.retain(|name, entry| {
            if entry.meta.evictable(now) {
                evicted.push(name.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        lock_ignore_poison(&self.inner).contains_key(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
