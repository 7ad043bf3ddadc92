//! Local chart cache
//!
//! A cached chart is a file named after the download URL's last path
//! segment inside the manifest's cache directory. Presence of the file is
//! taken as proof of a complete earlier download; downloads land in a
//! uniquely named hidden `.part` file next to the target and are only
//! renamed into place once complete, so concurrent downloads of the same
//! file never share a partial.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const PARTIAL_SUFFIX: &str = ".part";

/// An already downloaded chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of `file_name` inside the cache
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub async fn has(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn size_of(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    /// Look `file_name` up, returning its size on a hit
    pub async fn lookup(&self, file_name: &str) -> io::Result<Option<CacheHit>> {
        let path = self.path_for(file_name);
        if !self.has(&path).await {
            return Ok(None);
        }

        let size = self.size_of(&path).await?;
        debug!(path = %path.display(), size, "Cache hit");
        Ok(Some(CacheHit { path, size }))
    }
}

/// Remove a file, treating "already gone" as success
pub async fn discard(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create a fresh partial file beside `destination`
///
/// Every call gets its own `.<file>.<random>.part` name. The file is not
/// removed automatically; callers rename it into place or [`discard`] it.
pub fn create_partial(destination: &Path) -> io::Result<(std::fs::File, PathBuf)> {
    let dir = destination
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = format!(
        ".{}.",
        destination
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default()
    );

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)?
        .keep()
        .map_err(|e| e.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lookup_miss_then_hit() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());

        assert_eq!(store.lookup("app-1.0.0.tgz").await.unwrap(), None);

        tokio::fs::write(store.path_for("app-1.0.0.tgz"), vec![0u8; 42])
            .await
            .unwrap();

        let hit = store.lookup("app-1.0.0.tgz").await.unwrap().unwrap();
        assert_eq!(hit.size, 42);
        assert_eq!(hit.path, temp_dir.path().join("app-1.0.0.tgz"));
    }

    #[tokio::test]
    async fn test_partial_file_is_not_a_hit() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let path = store.path_for("app-1.0.0.tgz");

        let (_, partial) = create_partial(&path).unwrap();
        tokio::fs::write(&partial, b"half").await.unwrap();

        assert!(!store.has(&path).await);
        assert_eq!(store.lookup("app-1.0.0.tgz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("a/b/cache"));

        store.ensure_dir().await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_discard_ignores_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path());
        let path = store.path_for("gone.tgz");

        discard(&path).await.unwrap();

        tokio::fs::write(&path, b"x").await.unwrap();
        discard(&path).await.unwrap();
        assert!(!store.has(&path).await);
    }

    #[test]
    fn test_partials_are_unique_per_call() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("app-1.0.0.tgz");

        let (_, first) = create_partial(&destination).unwrap();
        let (_, second) = create_partial(&destination).unwrap();

        assert_ne!(first, second);
        for partial in [&first, &second] {
            let name = partial.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with(".app-1.0.0.tgz."));
            assert!(name.ends_with(".part"));
            assert_eq!(partial.parent(), Some(temp_dir.path()));
        }
    }
}
