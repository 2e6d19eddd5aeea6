//! Concurrency governor: admission pools, duplicate suppression and the
//! batch completion barrier.
//!
//! - The *global* pool bounds simultaneous track pipelines.
//! - The *download* pool bounds simultaneous network transfers (covers,
//!   direct downloads, individual segment fetches).
//! - The [`ActiveKeySet`] drops requests whose output key is already in flight.
//!
//! A unit never holds two permits of the same pool, so a pipeline waiting for
//! a download slot cannot starve the pipelines that hold them.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::{Error, Result};

/// Two-tier admission control plus the in-flight key registry of one run.
#[derive(Debug, Clone)]
pub struct Governor {
    global: Arc<Semaphore>,
    download: Arc<Semaphore>,
    active: ActiveKeySet,
}

impl Governor {
    pub fn new(max_global_workers: usize, max_download_workers: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_global_workers.max(1))),
            download: Arc::new(Semaphore::new(max_download_workers.max(1))),
            active: ActiveKeySet::new(),
        }
    }

    /// Wait for a global slot. Held for the whole track pipeline.
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        self.global
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Semaphore error: {}", e)))
    }

    /// Wait for a download slot. Held for one network transfer.
    pub async fn download_slot(&self) -> Result<OwnedSemaphorePermit> {
        self.download
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Semaphore error: {}", e)))
    }

    /// The download pool, for engines that take one slot per fetch.
    pub fn download_slots(&self) -> Arc<Semaphore> {
        self.download.clone()
    }

    pub fn active_keys(&self) -> &ActiveKeySet {
        &self.active
    }

    /// Claim `key`; `None` means the same output is already in flight.
    pub fn claim(&self, key: impl Into<String>) -> Option<KeyClaim> {
        self.active.claim(key)
    }

    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }

    pub fn available_download(&self) -> usize {
        self.download.available_permits()
    }
}

/// Keys of in-flight work (temp file paths, batch source URLs).
#[derive(Debug, Clone, Default)]
pub struct ActiveKeySet {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl ActiveKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check-and-insert `key`.
    pub fn claim(&self, key: impl Into<String>) -> Option<KeyClaim> {
        let key = key.into();
        let mut keys = self.keys.lock();
        if !keys.insert(key.clone()) {
            debug!(key = %key, "key already in flight");
            return None;
        }
        Some(KeyClaim {
            keys: self.keys.clone(),
            key,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

/// Presence of a key in an [`ActiveKeySet`]; released on drop.
#[derive(Debug)]
pub struct KeyClaim {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl KeyClaim {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyClaim {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}

/// Completion barrier of one batch.
///
/// Units may spawn further units through a clone; [`Batch::wait`] returns
/// once every unit, nested ones included, has finished.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    tracker: TaskTracker,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, unit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(unit);
    }

    /// Spawn `unit` so that both this batch and `group` wait for it.
    pub fn spawn_in<F>(&self, group: &Batch, unit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(group.tracker.track_future(unit));
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every spawned unit has completed.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
