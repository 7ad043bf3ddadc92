//! Memoized repository index fetching

use super::document::IndexDocument;
use super::resolver::{self, ResolvedArtifact, VersionPolicy};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("failed to fetch {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed index at {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_yaml::Error,
    },
}

type Fetched = Result<Arc<IndexDocument>, Arc<IndexError>>;

/// Per-repository index cache with single-flight fetches
///
/// Each repository URL owns a [`OnceCell`]; concurrent first callers all
/// await the same in-flight request. Failures are memoized as well, so a
/// broken repository costs one request per run, not one per chart.
pub struct IndexCache {
    client: Client,
    timeout: Duration,
    slots: Mutex<HashMap<String, Arc<OnceCell<Fetched>>>>,
    fetches: AtomicUsize,
}

impl IndexCache {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            slots: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Load the index for `repo_url`, fetching it on first use
    pub async fn get_index(&self, repo_url: &str) -> Fetched {
        let key = normalize(repo_url);
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(key.clone()).or_default().clone()
        };

        slot.get_or_init(|| self.fetch(&key)).await.clone()
    }

    /// Resolve a chart to its download location
    pub async fn resolve(
        &self,
        repo_url: &str,
        name: &str,
        version: Option<&str>,
        policy: VersionPolicy,
    ) -> resolver::Result<ResolvedArtifact> {
        let document = self.get_index(repo_url).await?;
        resolver::resolve_in(&document, repo_url, name, version, policy)
    }

    /// Forget the memoized result for one repository
    pub async fn invalidate(&self, repo_url: &str) {
        self.slots.lock().await.remove(&normalize(repo_url));
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    /// Number of network fetches issued so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn fetch(&self, repo_url: &str) -> Fetched {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let url = index_url(repo_url);
        debug!(url = %url, "Fetching repository index");

        match self.fetch_document(&url).await {
            Ok(document) => {
                info!(url = %url, charts = document.chart_count(), "Repository index loaded");
                Ok(Arc::new(document))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to load repository index");
                Err(Arc::new(e))
            }
        }
    }

    async fn fetch_document(&self, url: &str) -> Result<IndexDocument, IndexError> {
        let request_error = |source: reqwest::Error| {
            if source.is_timeout() {
                IndexError::Timeout {
                    url: url.to_string(),
                }
            } else {
                IndexError::Request {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(request_error)?;

        IndexDocument::parse(&body).map_err(|source| IndexError::Parse {
            url: url.to_string(),
            source,
        })
    }
}

fn normalize(repo_url: &str) -> String {
    repo_url.trim().trim_end_matches('/').to_string()
}

pub fn index_url(repo_url: &str) -> String {
    format!("{}/index.yaml", normalize(repo_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    const INDEX: &str = r#"
entries:
  app:
    - version: 1.0.0
      urls: ["charts/app-1.0.0.tgz"]
"#;

    /// Serve `body` at `/index.yaml`, counting requests
    async fn serve(status: StatusCode, body: &'static str, hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/index.yaml",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    // keep the request in flight so concurrent callers overlap
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    (status, body)
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn cache() -> IndexCache {
        IndexCache::new(Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let repo = serve(StatusCode::OK, INDEX, hits.clone()).await;
        let cache = Arc::new(cache());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let repo = repo.clone();
            handles.push(tokio::spawn(async move { cache.get_index(&repo).await }));
        }
        for handle in handles {
            let document = handle.await.unwrap().unwrap();
            assert_eq!(document.chart_count(), 1);
        }

        // later calls, with or without trailing slash, stay cached
        cache.get_index(&format!("{repo}/")).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let repo = serve(StatusCode::OK, INDEX, hits.clone()).await;
        let cache = cache();

        cache.get_index(&repo).await.unwrap();
        cache.invalidate(&repo).await;
        cache.get_index(&repo).await.unwrap();
        cache.clear().await;
        cache.get_index(&repo).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_http_error_is_memoized() {
        let hits = Arc::new(AtomicUsize::new(0));
        let repo = serve(StatusCode::NOT_FOUND, "gone", hits.clone()).await;
        let cache = cache();

        for _ in 0..3 {
            let err = cache.get_index(&repo).await.unwrap_err();
            assert!(matches!(*err, IndexError::Status { status: 404, .. }));
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_index() {
        let hits = Arc::new(AtomicUsize::new(0));
        let repo = serve(StatusCode::OK, "entries: [broken", hits).await;

        let err = cache().get_index(&repo).await.unwrap_err();
        assert!(matches!(*err, IndexError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_repository() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = cache().get_index(&format!("http://{addr}")).await.unwrap_err();
        assert!(matches!(*err, IndexError::Request { .. }));
    }

    #[tokio::test]
    async fn test_resolve_through_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let repo = serve(StatusCode::OK, INDEX, hits).await;
        let cache = cache();

        let resolved = cache
            .resolve(&repo, "app", Some("latest"), VersionPolicy::default())
            .await
            .unwrap();
        assert_eq!(resolved.url, format!("{repo}/charts/app-1.0.0.tgz"));

        let err = cache
            .resolve(&repo, "nope", None, VersionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, resolver::ResolveError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_index_url() {
        assert_eq!(index_url("https://repo.example.com/"), "https://repo.example.com/index.yaml");
        assert_eq!(index_url("https://repo.example.com"), "https://repo.example.com/index.yaml");
    }
}
