//! HTTP client for downloading charts

use crate::cache::{create_partial, discard};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Request, Response};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tower::retry::{Policy, Retry};
use tower::{ServiceExt, service_fn};
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Response from {0} has no Content-Length header")]
    MissingContentLength(String),

    #[error("Body ended after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },

    #[error("Writing {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Longest silence allowed between two reads, body chunks included
    pub read_timeout: Duration,
    /// Whole-request bound for chart downloads (connect through last byte)
    pub request_timeout: Duration,
    /// Extra attempts after a transient transport failure
    pub max_retries: u32,
    /// First retry delay, doubled on every further retry
    pub retry_backoff: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(600),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            user_agent: format!("chartsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Build the shared reqwest client used for indexes and downloads
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| DownloadError::RequestFailed(e.to_string()))
}

/// Retries a request while the transport itself fails
///
/// HTTP error statuses are responses, not transport failures, and are never
/// retried here.
#[derive(Debug, Clone)]
struct TransportRetry {
    remaining: u32,
    attempt: u32,
    backoff: Duration,
}

impl TransportRetry {
    fn new(retries: u32, backoff: Duration) -> Self {
        Self {
            remaining: retries,
            attempt: 0,
            backoff,
        }
    }

    fn next_delay(&self) -> Duration {
        self.backoff
            .checked_mul(2u32.saturating_pow(self.attempt))
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

impl Policy<Request, Response, reqwest::Error> for TransportRetry {
    type Future = tokio::time::Sleep;

    fn retry(
        &mut self,
        request: &mut Request,
        result: &mut std::result::Result<Response, reqwest::Error>,
    ) -> Option<Self::Future> {
        let error = result.as_ref().err()?;
        if self.remaining == 0 || !is_transient(error) {
            return None;
        }

        let delay = self.next_delay();
        self.remaining -= 1;
        self.attempt += 1;
        warn!(
            url = %request.url(),
            attempt = self.attempt,
            error = %error,
            "Transport failure, retrying"
        );

        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, request: &Request) -> Option<Request> {
        request.try_clone()
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

fn classify(error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::Timeout
    } else if error.is_redirect() {
        DownloadError::TooManyRedirects
    } else {
        DownloadError::RequestFailed(error.to_string())
    }
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Streaming chart downloader
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    config: HttpConfig,
}

impl Downloader {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Reuse an existing client (shares its connection pool)
    pub fn with_client(client: Client, config: HttpConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Download `url` into `destination`.
    ///
    /// `on_progress(downloaded, total)` fires once when the size is known and
    /// after every written chunk. The body goes to a private `.part` sibling
    /// that is renamed onto `destination` on success and deleted on failure,
    /// so concurrent downloads of one destination do not interfere.
    pub async fn download<F>(&self, url: &str, destination: &Path, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(u64, u64),
    {
        debug!(url, "Starting download");

        let response = self.send_with_retry(url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = content_length(&response)
            .ok_or_else(|| DownloadError::MissingContentLength(url.to_string()))?;
        on_progress(0, total);

        let (file, part) = create_partial(destination).map_err(|source| DownloadError::Io {
            path: destination.display().to_string(),
            source,
        })?;
        let outcome = async {
            let written =
                stream_to_file(response, File::from_std(file), &part, total, &mut on_progress)
                    .await?;
            tokio::fs::rename(&part, destination)
                .await
                .map_err(|source| DownloadError::Io {
                    path: destination.display().to_string(),
                    source,
                })?;
            Ok(written)
        }
        .await;

        match outcome {
            Ok(written) => {
                debug!(url, size = written, "Download completed");
                Ok(written)
            }
            Err(e) => {
                if let Err(remove) = discard(&part).await {
                    warn!(path = %part.display(), error = %remove, "Could not remove partial download");
                }
                warn!(url, error = %e, "Download failed");
                Err(e)
            }
        }
    }

    async fn send_with_retry(&self, url: &str) -> Result<Response> {
        let request = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;

        let client = self.client.clone();
        let transport = service_fn(move |request: Request| {
            let client = client.clone();
            async move { client.execute(request).await }
        });
        let policy = TransportRetry::new(self.config.max_retries, self.config.retry_backoff);

        Retry::new(policy, transport)
            .oneshot(request)
            .await
            .map_err(classify)
    }
}

async fn stream_to_file<F>(
    mut response: Response,
    mut file: File,
    path: &Path,
    total: u64,
    on_progress: &mut F,
) -> Result<u64>
where
    F: FnMut(u64, u64),
{
    let io_error = |source: std::io::Error| DownloadError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut downloaded = 0u64;

    while let Some(chunk) = response.chunk().await.map_err(|e| {
        if e.is_timeout() {
            DownloadError::Timeout
        } else {
            DownloadError::RequestFailed(format!("Failed to read body: {}", e))
        }
    })? {
        file.write_all(&chunk).await.map_err(io_error)?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    file.flush().await.map_err(io_error)?;

    if downloaded != total {
        return Err(DownloadError::Incomplete {
            expected: total,
            received: downloaded,
        });
    }

    Ok(downloaded)
}
