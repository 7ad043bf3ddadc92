//! Sync run orchestration
//!
//! Architecture:
//! 1. Every manifest entry is put on a [`WorkQueue`] once
//! 2. The index of every distinct repository is fetched up front
//! 3. N workers drain the queue (resolve → cache → download → publish)
//! 4. Once the queue barrier opens, the destination is reindexed exactly once
//! 5. Workers are cancelled and awaited; join errors are collected, not raised

use crate::config::Manifest;
use crate::index::{IndexCache, ResolveError, ResolvedArtifact, VersionPolicy};
use crate::observability::{Metrics, MetricsSnapshot};
use crate::progress::ProgressBoard;
use crate::publish::Publisher;
use crate::queue::WorkQueue;
use crate::worker::http::Downloader;
use crate::worker::{ArtifactRequest, ItemOutcome, ItemRecord, RecordLog, WorkerContext, run_worker};
use bon::Builder;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Knobs for one sync run
#[derive(Debug, Clone, Builder)]
pub struct SyncOptions {
    #[builder(default = 3)]
    pub workers: usize,
    #[builder(default)]
    pub version_policy: VersionPolicy,
    #[builder(default)]
    pub fail_on_publish_error: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexOutcome {
    Completed,
    Failed(String),
}

/// Result of a sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub metrics: MetricsSnapshot,
    /// One record per processed request, in completion order
    pub items: Vec<ItemRecord>,
    pub reindex: ReindexOutcome,
    /// Panics or cancellations observed while joining workers
    pub worker_errors: Vec<String>,
    /// Requests left in the queue because every worker died
    pub abandoned: usize,
}

impl SyncReport {
    pub fn has_fatal_failures(&self) -> bool {
        self.items.iter().any(ItemRecord::is_fatal)
            || !self.worker_errors.is_empty()
            || self.abandoned > 0
    }

    pub fn has_publish_failures(&self) -> bool {
        self.items.iter().any(ItemRecord::is_publish_failure)
            || matches!(self.reindex, ReindexOutcome::Failed(_))
    }

    pub fn exit_ok(&self, fail_on_publish_error: bool) -> bool {
        !self.has_fatal_failures() && !(fail_on_publish_error && self.has_publish_failures())
    }

    pub fn published(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Published { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|item| item.is_fatal()).count()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let publish_failures = self
            .items
            .iter()
            .filter(|item| item.is_publish_failure())
            .count();
        let reindex = match &self.reindex {
            ReindexOutcome::Completed => "ok".to_string(),
            ReindexOutcome::Failed(e) => format!("failed ({e})"),
        };

        format!(
            "{} charts: {} published ({} cached), {} failed, {} publish failures; reindex {}",
            self.items.len() + self.abandoned,
            self.published(),
            self.metrics.cache_hits,
            self.failed() + self.abandoned,
            publish_failures,
            reindex
        )
    }
}

/// Drives a whole sync run over a bounded worker pool
pub struct Coordinator {
    index: Arc<IndexCache>,
    downloader: Arc<Downloader>,
    publisher: Publisher,
    progress: ProgressBoard,
    options: SyncOptions,
}

impl Coordinator {
    pub fn new(
        index: Arc<IndexCache>,
        downloader: Arc<Downloader>,
        publisher: Publisher,
        options: SyncOptions,
    ) -> Self {
        Self {
            index,
            downloader,
            publisher,
            progress: ProgressBoard::new(),
            options,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBoard) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, manifest: &Manifest) -> SyncReport {
        let metrics = Arc::new(Metrics::new());
        let queue = Arc::new(WorkQueue::new());
        let records = Arc::new(RecordLog::new());

        for request in manifest.requests() {
            let name = request.name.clone();
            match queue.put(request) {
                Ok(()) => metrics.request_enqueued(),
                Err(e) => error!(name = %name, error = %e, "Could not enqueue chart"),
            }
        }

        self.prefetch(manifest).await;

        let ctx = Arc::new(WorkerContext {
            index: self.index.clone(),
            downloader: self.downloader.clone(),
            publisher: self.publisher.clone(),
            progress: self.progress.clone(),
            metrics: metrics.clone(),
            policy: self.options.version_policy,
        });

        let shutdown = CancellationToken::new();
        let worker_count = self.options.workers.max(1);
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(run_worker(
                id,
                ctx.clone(),
                queue.clone(),
                records.clone(),
                shutdown.clone(),
            ));
        }
        info!(workers = worker_count, charts = queue.unfinished(), "Sync started");

        let mut worker_errors = Vec::new();
        let drained = queue.join();
        tokio::pin!(drained);
        loop {
            tokio::select! {
                _ = &mut drained => break,
                joined = workers.join_next() => match joined {
                    Some(Err(e)) => {
                        error!(error = %e, "Worker terminated abnormally");
                        worker_errors.push(e.to_string());
                    }
                    Some(Ok(())) => {}
                    None => {
                        error!(remaining = queue.unfinished(), "All workers exited before the queue drained");
                        break;
                    }
                },
            }
        }
        let abandoned = queue.unfinished();

        let reindex = match self.publisher.reindex(&manifest.rt_repo).await {
            Ok(_) => ReindexOutcome::Completed,
            Err(e) => {
                warn!(repo = %manifest.rt_repo, error = %e, "Reindex failed");
                ReindexOutcome::Failed(e.to_string())
            }
        };

        shutdown.cancel();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker terminated abnormally");
                worker_errors.push(e.to_string());
            }
        }

        let report = SyncReport {
            metrics: metrics.snapshot(),
            items: records.take(),
            reindex,
            worker_errors,
            abandoned,
        };
        info!(summary = %report.summary(), "Sync finished");
        report
    }

    /// Resolve every manifest entry without downloading or publishing
    pub async fn resolve(
        &self,
        manifest: &Manifest,
    ) -> Vec<(ArtifactRequest, Result<ResolvedArtifact, ResolveError>)> {
        self.prefetch(manifest).await;

        let mut resolved = Vec::new();
        for request in manifest.requests() {
            let result = self
                .index
                .resolve(
                    &request.repo_url,
                    &request.name,
                    request.version.as_deref(),
                    self.options.version_policy,
                )
                .await;
            resolved.push((request, result));
        }
        resolved
    }

    /// Fetch every distinct repository index concurrently
    async fn prefetch(&self, manifest: &Manifest) {
        let mut fetches = JoinSet::new();
        for repo in manifest.repositories() {
            let index = self.index.clone();
            let repo = repo.to_string();
            // failures are memoized and logged by the cache
            fetches.spawn(async move {
                let _ = index.get_index(&repo).await;
            });
        }
        while fetches.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Stage;
    use std::path::PathBuf;

    fn record(outcome: ItemOutcome) -> ItemRecord {
        ItemRecord {
            repo_url: "https://charts.example.com".to_string(),
            name: "app".to_string(),
            outcome,
        }
    }

    fn report(items: Vec<ItemRecord>, reindex: ReindexOutcome) -> SyncReport {
        SyncReport {
            metrics: MetricsSnapshot::default(),
            items,
            reindex,
            worker_errors: Vec::new(),
            abandoned: 0,
        }
    }

    #[test]
    fn test_options_defaults() {
        let options = SyncOptions::default();
        assert_eq!(options.workers, 3);
        assert_eq!(options.version_policy, VersionPolicy::PinnedOrLatestFallback);
        assert!(!options.fail_on_publish_error);

        let options = SyncOptions::builder().workers(8).fail_on_publish_error(true).build();
        assert_eq!(options.workers, 8);
        assert!(options.fail_on_publish_error);
    }

    #[test]
    fn test_publish_failures_only_fail_when_configured() {
        let report = report(
            vec![record(ItemOutcome::PublishFailed {
                version: "1.0.0".to_string(),
                path: PathBuf::from("/cache/app-1.0.0.tgz"),
                error: "exit 1".to_string(),
            })],
            ReindexOutcome::Completed,
        );

        assert!(!report.has_fatal_failures());
        assert!(report.exit_ok(false));
        assert!(!report.exit_ok(true));
    }

    #[test]
    fn test_failed_item_is_fatal() {
        let report = report(
            vec![record(ItemOutcome::Failed {
                stage: Stage::Download,
                error: "HTTP 404".to_string(),
            })],
            ReindexOutcome::Completed,
        );

        assert!(report.has_fatal_failures());
        assert!(!report.exit_ok(false));
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_failed_reindex_counts_as_publish_failure() {
        let report = report(Vec::new(), ReindexOutcome::Failed("exit 2".to_string()));
        assert!(report.exit_ok(false));
        assert!(!report.exit_ok(true));
        assert!(report.summary().ends_with("reindex failed (exit 2)"));
    }

    #[test]
    fn test_summary() {
        let report = report(
            vec![record(ItemOutcome::Published {
                version: "1.0.0".to_string(),
                path: PathBuf::from("/cache/app-1.0.0.tgz"),
                cached: false,
            })],
            ReindexOutcome::Completed,
        );

        assert_eq!(
            report.summary(),
            "1 charts: 1 published (0 cached), 0 failed, 0 publish failures; reindex ok"
        );
    }
}
