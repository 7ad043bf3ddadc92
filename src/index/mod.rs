//! Chart repository indexes
//!
//! A repository publishes `index.yaml` listing every chart it serves and,
//! per chart, an ordered list of versions with download URLs. This module
//! fetches those documents once per repository ([`IndexCache`]) and turns a
//! `(repo, name, version)` triple into a [`ResolvedArtifact`].
//!
//! ```rust,ignore
//! use chartsync::index::{IndexCache, VersionPolicy};
//!
//! let cache = IndexCache::new(client, Duration::from_secs(10));
//! let artifact = cache
//!     .resolve("https://charts.example.com", "app", Some("latest"), VersionPolicy::default())
//!     .await?;
//! println!("{} -> {}", artifact.file_name, artifact.url);
//! ```

mod cache;
mod document;
mod resolver;

pub use cache::{IndexCache, IndexError, index_url};
pub use document::{ChartVersion, IndexDocument};
pub(crate) use document::optional_string_or_number;
pub use resolver::{
    LATEST, ResolveError, ResolvedArtifact, VersionPolicy, resolve_in, version_from_file_name,
};
