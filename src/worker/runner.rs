//! Task runner - carries one chart request through resolve, cache, download and publish

use super::WorkerContext;
use super::http::DownloadError;
use crate::cache::CacheStore;
use crate::index::{ResolveError, ResolvedArtifact};
use crate::progress::ProgressTask;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Cache directory {path} unusable: {source}")]
    Cache {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl TaskError {
    pub fn stage(&self) -> Stage {
        match self {
            TaskError::Resolve(_) => Stage::Resolve,
            TaskError::Cache { .. } | TaskError::Download(_) => Stage::Download,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// One manifest entry queued for synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub repo_url: String,
    pub name: String,
    /// `None`, empty or `latest` select the first listed version
    pub version: Option<String>,
    /// Destination repository id
    pub dest_repo: String,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Resolve => f.write_str("resolve"),
            Stage::Download => f.write_str("download"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Published {
        version: String,
        path: PathBuf,
        cached: bool,
    },
    PublishFailed {
        version: String,
        path: PathBuf,
        error: String,
    },
    Failed {
        stage: Stage,
        error: String,
    },
}

/// What happened to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub repo_url: String,
    pub name: String,
    pub outcome: ItemOutcome,
}

impl ItemRecord {
    /// Resolve and download failures fail the run
    pub fn is_fatal(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed { .. })
    }

    pub fn is_publish_failure(&self) -> bool {
        matches!(self.outcome, ItemOutcome::PublishFailed { .. })
    }
}

/// A chart available in the local cache
struct Fetched {
    artifact: ResolvedArtifact,
    path: PathBuf,
    cached: bool,
}

/// Process a single chart request
///
/// Never fails: every error ends up in the returned [`ItemRecord`].
pub async fn process_request(ctx: &WorkerContext, request: &ArtifactRequest) -> ItemRecord {
    let mut task = ctx.progress.add_task(format!("Download {}", request.name));

    let outcome = match fetch(ctx, request, &mut task).await {
        Ok(fetched) => publish(ctx, request, fetched).await,
        Err(e) => {
            let stage = e.stage();
            task.fail(&e);
            match stage {
                Stage::Resolve => ctx.metrics.resolve_failed(),
                Stage::Download => ctx.metrics.download_failed(),
            }
            error!(
                repo = %request.repo_url,
                name = %request.name,
                %stage,
                error = %e,
                "Chart failed"
            );
            ItemOutcome::Failed {
                stage,
                error: e.to_string(),
            }
        }
    };

    ItemRecord {
        repo_url: request.repo_url.clone(),
        name: request.name.clone(),
        outcome,
    }
}

async fn fetch(
    ctx: &WorkerContext,
    request: &ArtifactRequest,
    task: &mut ProgressTask,
) -> Result<Fetched> {
    let artifact = ctx
        .index
        .resolve(
            &request.repo_url,
            &request.name,
            request.version.as_deref(),
            ctx.policy,
        )
        .await?;
    task.set_label(format!("Download {}", artifact.file_name));

    let cache = CacheStore::new(&request.cache_dir);
    let cache_error = |source: std::io::Error| TaskError::Cache {
        path: request.cache_dir.display().to_string(),
        source,
    };

    if let Some(hit) = cache.lookup(&artifact.file_name).await.map_err(cache_error)? {
        info!(name = %request.name, path = %hit.path.display(), size = hit.size, "Cache hit");
        task.complete_from_cache(hit.size);
        ctx.metrics.cache_hit();
        return Ok(Fetched {
            artifact,
            path: hit.path,
            cached: true,
        });
    }

    cache.ensure_dir().await.map_err(cache_error)?;
    let path = cache.path_for(&artifact.file_name);

    let size = ctx
        .downloader
        .download(&artifact.url, &path, |downloaded, total| {
            if task.total() != Some(total) {
                task.start(total);
            }
            task.set_completed(downloaded);
        })
        .await?;

    task.finish();
    ctx.metrics.download_completed(size);
    info!(name = %request.name, url = %artifact.url, size, "Chart downloaded");

    Ok(Fetched {
        artifact,
        path,
        cached: false,
    })
}

async fn publish(ctx: &WorkerContext, request: &ArtifactRequest, fetched: Fetched) -> ItemOutcome {
    let Fetched {
        artifact,
        path,
        cached,
    } = fetched;

    match ctx
        .publisher
        .upload(&path, &request.dest_repo, &request.name, &artifact.version)
        .await
    {
        Ok(_) => ItemOutcome::Published {
            version: artifact.version,
            path,
            cached,
        },
        Err(e) => {
            ctx.metrics.publish_failed();
            warn!(
                name = %request.name,
                version = %artifact.version,
                error = %e,
                "Publishing failed"
            );
            ItemOutcome::PublishFailed {
                version: artifact.version,
                path,
                error: e.to_string(),
            }
        }
    }
}
