use super::cache::IndexError;
use super::document::{ChartVersion, IndexDocument};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Requested version that always selects the first listed record
pub const LATEST: &str = "latest";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Index(#[from] Arc<IndexError>),

    #[error("chart '{name}' not found in {repo}")]
    ArtifactNotFound { repo: String, name: String },

    #[error("version '{version}' of chart '{name}' not found in {repo}")]
    VersionNotFound {
        repo: String,
        name: String,
        version: String,
    },

    #[error("chart '{name}' version '{version}' lists no download URL")]
    NoDownloadUrl { name: String, version: String },

    #[error("invalid download URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// How a pinned version that the index does not list is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Unmatched pins resolve to the first listed record, same as `latest`.
    /// "First" is index order, not semver order.
    #[default]
    PinnedOrLatestFallback,
    /// Unmatched pins fail with [`ResolveError::VersionNotFound`]
    Exact,
}

/// A concrete download location for one chart version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub url: String,
    pub file_name: String,
    pub version: String,
}

impl VersionPolicy {
    /// Pick the version record for `requested` out of `versions`.
    ///
    /// `None` means the policy rejected the request; an empty slice also
    /// yields `None`.
    pub fn select<'a>(
        &self,
        versions: &'a [ChartVersion],
        requested: Option<&str>,
    ) -> Option<&'a ChartVersion> {
        let first = versions.first()?;

        let Some(pinned) = requested.map(str::trim).filter(|v| !v.is_empty() && *v != LATEST)
        else {
            return Some(first);
        };

        match versions.iter().find(|record| record.version == pinned) {
            Some(record) => Some(record),
            None => match self {
                VersionPolicy::PinnedOrLatestFallback => {
                    debug!(
                        requested = pinned,
                        selected = %first.version,
                        "Pinned version not listed, falling back to first entry"
                    );
                    Some(first)
                }
                VersionPolicy::Exact => None,
            },
        }
    }
}

/// Resolve `name`/`requested` against an already loaded index
pub fn resolve_in(
    document: &IndexDocument,
    repo_url: &str,
    name: &str,
    requested: Option<&str>,
    policy: VersionPolicy,
) -> Result<ResolvedArtifact> {
    let versions = document
        .versions(name)
        .filter(|versions| !versions.is_empty())
        .ok_or_else(|| ResolveError::ArtifactNotFound {
            repo: repo_url.to_string(),
            name: name.to_string(),
        })?;

    let record = policy
        .select(versions, requested)
        .ok_or_else(|| ResolveError::VersionNotFound {
            repo: repo_url.to_string(),
            name: name.to_string(),
            version: requested.unwrap_or_default().to_string(),
        })?;

    let raw_url = record
        .urls
        .first()
        .ok_or_else(|| ResolveError::NoDownloadUrl {
            name: name.to_string(),
            version: record.version.clone(),
        })?;

    let url = absolute_url(repo_url, raw_url)?;
    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResolveError::InvalidUrl {
            url: url.to_string(),
            reason: "no file name in path".to_string(),
        })?;

    let version = if record.version.is_empty() {
        version_from_file_name(&file_name, name)
    } else {
        record.version.clone()
    };

    Ok(ResolvedArtifact {
        url: url.into(),
        file_name,
        version,
    })
}

/// Index URLs may be relative to the repository root
fn absolute_url(repo_url: &str, raw: &str) -> Result<Url> {
    let invalid = |reason: String| ResolveError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    if let Ok(url) = Url::parse(raw) {
        return Ok(url);
    }

    let base = Url::parse(&format!("{}/", repo_url.trim_end_matches('/')))
        .map_err(|e| invalid(format!("bad repository URL: {e}")))?;
    base.join(raw).map_err(|e| invalid(e.to_string()))
}

/// `app-1.2.3.tgz` → `1.2.3`
pub fn version_from_file_name(file_name: &str, name: &str) -> String {
    let stem = file_name
        .strip_suffix(".tar.gz")
        .or_else(|| file_name.strip_suffix(".tgz"))
        .or_else(|| Path::new(file_name).file_stem().and_then(|s| s.to_str()))
        .unwrap_or(file_name);

    match stem.strip_prefix(name).and_then(|rest| rest.strip_prefix('-')) {
        Some(version) if !version.is_empty() => version.to_string(),
        _ => stem.rsplit('-').next().unwrap_or(stem).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO: &str = "https://charts.example.com";

    fn app_index() -> IndexDocument {
        IndexDocument::parse(
            r#"
entries:
  app:
    - version: 1.0.0
      urls: ["https://charts.example.com/app-1.0.0.tgz"]
    - version: 1.1.0
      urls: ["https://charts.example.com/app-1.1.0.tgz"]
  relative:
    - version: 0.3.0
      urls: ["charts/relative-0.3.0.tgz"]
  unversioned:
    - urls: ["https://mirror.example.com/unversioned-4.5.6-rc1.tgz"]
  empty:
    - version: 1.0.0
      urls: []
"#,
        )
        .unwrap()
    }

    fn resolve(name: &str, version: Option<&str>) -> Result<ResolvedArtifact> {
        resolve_in(
            &app_index(),
            REPO,
            name,
            version,
            VersionPolicy::PinnedOrLatestFallback,
        )
    }

    #[test]
    fn test_latest_uses_list_order_not_semver() {
        let resolved = resolve("app", Some("latest")).unwrap();

        assert_eq!(resolved.file_name, "app-1.0.0.tgz");
        assert_eq!(resolved.version, "1.0.0");
        assert_eq!(resolved.url, "https://charts.example.com/app-1.0.0.tgz");
    }

    #[test]
    fn test_missing_version_is_latest() {
        assert_eq!(resolve("app", None).unwrap().version, "1.0.0");
        assert_eq!(resolve("app", Some("")).unwrap().version, "1.0.0");
    }

    #[test]
    fn test_pinned_version_matches_exactly() {
        let resolved = resolve("app", Some("1.1.0")).unwrap();
        assert_eq!(resolved.file_name, "app-1.1.0.tgz");
    }

    #[test]
    fn test_unknown_version_falls_back_to_first_entry() {
        let resolved = resolve("app", Some("9.9.9")).unwrap();
        assert_eq!(resolved.file_name, "app-1.0.0.tgz");
    }

    #[test]
    fn test_exact_policy_rejects_unknown_version() {
        let err = resolve_in(&app_index(), REPO, "app", Some("9.9.9"), VersionPolicy::Exact)
            .unwrap_err();

        assert!(matches!(err, ResolveError::VersionNotFound { ref version, .. } if version == "9.9.9"));
    }

    #[test]
    fn test_unknown_chart_is_not_found() {
        let err = resolve("missing", Some("latest")).unwrap_err();
        assert!(matches!(err, ResolveError::ArtifactNotFound { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_record_without_urls() {
        let err = resolve("empty", None).unwrap_err();
        assert!(matches!(err, ResolveError::NoDownloadUrl { .. }));
    }

    #[test]
    fn test_relative_url_joined_onto_repo() {
        let resolved = resolve_in(
            &app_index(),
            "https://charts.example.com/stable/",
            "relative",
            None,
            VersionPolicy::default(),
        )
        .unwrap();

        assert_eq!(
            resolved.url,
            "https://charts.example.com/stable/charts/relative-0.3.0.tgz"
        );
        assert_eq!(resolved.file_name, "relative-0.3.0.tgz");
    }

    #[test]
    fn test_version_parsed_from_file_name_when_record_has_none() {
        let resolved = resolve("unversioned", None).unwrap();
        assert_eq!(resolved.version, "4.5.6-rc1");
    }

    #[test]
    fn test_version_from_file_name() {
        assert_eq!(version_from_file_name("app-1.2.3.tgz", "app"), "1.2.3");
        assert_eq!(version_from_file_name("my-app-1.2.3.tar.gz", "my-app"), "1.2.3");
        assert_eq!(version_from_file_name("other-2.0.0.tgz", "app"), "2.0.0");
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            policy: VersionPolicy,
        }

        let holder: Holder = toml::from_str(r#"policy = "exact""#).unwrap();
        assert_eq!(holder.policy, VersionPolicy::Exact);
    }
}
