//! SharedQueue - async handle over one LocalQueue
//!
//! The recorder, the sync engine and the management API all hold clones of
//! the same handle. One mutex serializes every mutation; the blocking file
//! I/O runs on tokio's blocking pool so the executor never stalls on fsync.
//! Readers receive cloned snapshots.

use contracts::{Measurement, MeasurementId, QueueStats};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::QueueError;
use crate::queue::{CompactStats, LocalQueue, RejectedEntry};

/// Cloneable async handle to the local queue
#[derive(Clone)]
pub struct SharedQueue {
    inner: Arc<Mutex<LocalQueue>>,
    path: Arc<PathBuf>,
}

impl SharedQueue {
    pub fn new(queue: LocalQueue) -> Self {
        Self {
            path: Arc::new(queue.path().to_path_buf()),
            inner: Arc::new(Mutex::new(queue)),
        }
    }

    /// Journal location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the queue journal at `path` on the blocking pool
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let queue = tokio::task::spawn_blocking(move || LocalQueue::open(path))
            .await
            .map_err(|e| QueueError::Worker(e.to_string()))??;
        Ok(Self::new(queue))
    }

    /// Run `f` against the queue under the lock, off the async executor
    async fn with<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&mut LocalQueue) -> Result<R, QueueError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut queue = inner.lock().map_err(|_| QueueError::Poisoned)?;
            f(&mut queue)
        })
        .await
        .map_err(|e| QueueError::Worker(e.to_string()))?
    }

    pub async fn append(&self, measurement: Measurement) -> Result<(), QueueError> {
        self.with(move |q| q.append(measurement)).await
    }

    pub async fn pending(&self) -> Result<Vec<Measurement>, QueueError> {
        self.with(|q| Ok(q.pending())).await
    }

    pub async fn deliverable(&self, limit: usize) -> Result<Vec<Measurement>, QueueError> {
        self.with(move |q| Ok(q.deliverable(limit))).await
    }

    pub async fn mark_synced(&self, id: MeasurementId) -> Result<bool, QueueError> {
        self.with(move |q| q.mark_synced(id)).await
    }

    pub async fn flag_rejected(
        &self,
        id: MeasurementId,
        reason: impl Into<String>,
    ) -> Result<bool, QueueError> {
        let reason = reason.into();
        self.with(move |q| q.flag_rejected(id, reason)).await
    }

    pub async fn release(&self, id: MeasurementId) -> Result<bool, QueueError> {
        self.with(move |q| q.release(id)).await
    }

    pub async fn release_all(&self) -> Result<usize, QueueError> {
        self.with(|q| q.release_all()).await
    }

    pub async fn rejected(&self) -> Result<Vec<RejectedEntry>, QueueError> {
        self.with(|q| Ok(q.rejected())).await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.with(|q| Ok(q.stats())).await
    }

    pub async fn history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Measurement>, QueueError> {
        self.with(move |q| Ok(q.history(limit, offset))).await
    }

    pub async fn get(&self, id: MeasurementId) -> Result<Option<Measurement>, QueueError> {
        self.with(move |q| Ok(q.get(&id))).await
    }

    pub async fn last(&self) -> Result<Option<Measurement>, QueueError> {
        self.with(|q| Ok(q.last())).await
    }

    pub async fn compact(&self) -> Result<CompactStats, QueueError> {
        self.with(|q| q.compact()).await
    }
}
