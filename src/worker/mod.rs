//! Chart sync workers
//!
//! Each worker pulls [`ArtifactRequest`]s from the shared [`WorkQueue`] and
//! runs them through [`runner::process_request`] until the shutdown token
//! is cancelled. Results are collected in the shared [`WorkerContext`] so a
//! panicking worker loses nothing it already finished.

pub mod http;
pub mod runner;

pub use runner::{ArtifactRequest, ItemOutcome, ItemRecord, Stage, TaskError};

use crate::index::{IndexCache, VersionPolicy};
use crate::observability::Metrics;
use crate::progress::ProgressBoard;
use crate::publish::Publisher;
use crate::queue::WorkQueue;
use http::Downloader;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a worker needs, shared by the whole pool
pub struct WorkerContext {
    pub index: Arc<IndexCache>,
    pub downloader: Arc<Downloader>,
    pub publisher: Publisher,
    pub progress: ProgressBoard,
    pub metrics: Arc<Metrics>,
    pub policy: VersionPolicy,
}

/// Finished item records, appended by workers as they go
#[derive(Debug, Default)]
pub struct RecordLog {
    records: Mutex<Vec<ItemRecord>>,
}

impl RecordLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ItemRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    pub fn take(&self) -> Vec<ItemRecord> {
        std::mem::take(
            &mut *self
                .records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

/// Worker loop: idle until a request arrives or shutdown is requested
pub async fn run_worker(
    id: usize,
    ctx: Arc<WorkerContext>,
    queue: Arc<WorkQueue<ArtifactRequest>>,
    records: Arc<RecordLog>,
    shutdown: CancellationToken,
) {
    debug!(worker = id, "Worker started");
    let mut processed = 0usize;

    loop {
        let claimed = tokio::select! {
            _ = shutdown.cancelled() => break,
            claimed = queue.get() => match claimed {
                Some(claimed) => claimed,
                None => break,
            },
        };

        let record = runner::process_request(&ctx, &claimed).await;
        records.push(record);
        processed += 1;
        // dropping the claim marks the item done
        drop(claimed);
    }

    debug!(worker = id, processed, "Worker stopped");
}
