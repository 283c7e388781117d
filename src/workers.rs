//! Background work that must not hold up the simulation: memory writes and
//! snapshot flushes.
//!
//! The queue is bounded and never blocks the producer. When it is full the
//! task is dropped with a warning.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use crate::memory::MemoryRecord;
use crate::traits::MemoryStore;

#[derive(Debug)]
pub enum BackgroundTask {
    SaveMemory(MemoryRecord),
    FlushSnapshot,
}

impl BackgroundTask {
    fn kind(&self) -> &'static str {
        match self {
            BackgroundTask::SaveMemory(_) => "save_memory",
            BackgroundTask::FlushSnapshot => "flush_snapshot",
        }
    }
}

/// Whatever knows how to write the town's state to disk
pub trait Snapshotter: Send + Sync {
    fn write_snapshot(&self) -> Result<()>;
}

/// Producer side of the background queue
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<BackgroundTask>,
}

impl TaskQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<BackgroundTask>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues without waiting. Returns false when the task was dropped.
    pub fn submit(&self, task: BackgroundTask) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                log::warn!("⚠️ Background queue full, dropping {}", task.kind());
                false
            }
            Err(TrySendError::Closed(task)) => {
                log::debug!("Background queue closed, dropping {}", task.kind());
                false
            }
        }
    }
}

/// Runs until shutdown is signalled or every producer is gone, flushing a
/// snapshot every `interval`. Tasks still queued at shutdown are processed
/// before returning.
pub async fn run_worker(
    mut rx: mpsc::Receiver<BackgroundTask>,
    memory: Arc<dyn MemoryStore>,
    snapshots: Arc<dyn Snapshotter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                flush(snapshots.clone()).await;
            }
            task = rx.recv() => match task {
                Some(task) => handle(task, memory.as_ref(), &snapshots).await,
                None => break,
            },
        }
    }

    while let Ok(task) = rx.try_recv() {
        handle(task, memory.as_ref(), &snapshots).await;
    }
    log::info!("🧹 Background worker stopped");
}

async fn handle(task: BackgroundTask, memory: &dyn MemoryStore, snapshots: &Arc<dyn Snapshotter>) {
    match task {
        BackgroundTask::SaveMemory(record) => {
            let owner = record.owner.clone();
            if let Err(e) = memory.store(record).await {
                log::error!("❌ Failed to store memory for {}: {:#}", owner, e);
            }
        }
        BackgroundTask::FlushSnapshot => flush(snapshots.clone()).await,
    }
}

/// File writes go to the blocking pool so the runtime threads stay free
async fn flush(snapshots: Arc<dyn Snapshotter>) {
    match tokio::task::spawn_blocking(move || snapshots.write_snapshot()).await {
        Ok(Ok(())) => log::debug!("Snapshot written"),
        Ok(Err(e)) => log::error!("❌ Snapshot failed: {:#}", e),
        Err(e) => log::error!("❌ Snapshot writer crashed: {}", e),
    }
}
