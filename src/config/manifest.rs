//! Chart manifest: which charts to mirror and where to publish them
//!
//! ```yaml
//! rtRepo: helm-local
//! cache: .cache/charts
//! charts:
//!   - repo: https://charts.bitnami.com/bitnami
//!     name: redis
//!     version: 18.1.0
//!   - repo: https://prometheus-community.github.io/helm-charts
//!     name: prometheus
//! ```

use crate::index::optional_string_or_number;
use crate::worker::ArtifactRequest;
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Manifest has an empty rtRepo")]
    MissingDestination,

    #[error("Chart #{index} has an empty name")]
    MissingName { index: usize },

    #[error("Chart '{name}' has invalid repository URL '{url}'")]
    InvalidRepoUrl { name: String, url: String },

    #[error("Chart '{0}' is not listed in the manifest")]
    UnknownChart(String),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Destination repository id
    #[serde(rename = "rtRepo", alias = "rt_repo")]
    pub rt_repo: String,
    pub cache: PathBuf,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChartSpec {
    pub repo: String,
    pub name: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub version: Option<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse and validate manifest text
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rt_repo.trim().is_empty() {
            return Err(ManifestError::MissingDestination);
        }

        for (index, chart) in self.charts.iter().enumerate() {
            if chart.name.trim().is_empty() {
                return Err(ManifestError::MissingName { index });
            }

            let valid = Url::parse(chart.repo.trim())
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(ManifestError::InvalidRepoUrl {
                    name: chart.name.clone(),
                    url: chart.repo.clone(),
                });
            }
        }

        Ok(())
    }

    /// Keep only the entries for `chart`; `None` keeps everything
    pub fn filter_chart(mut self, chart: Option<&str>) -> Result<Self> {
        let Some(chart) = chart else {
            return Ok(self);
        };

        self.charts.retain(|spec| spec.name == chart);
        if self.charts.is_empty() {
            return Err(ManifestError::UnknownChart(chart.to_string()));
        }
        Ok(self)
    }

    /// Distinct repository URLs in manifest order
    pub fn repositories(&self) -> Vec<&str> {
        let mut repos: Vec<&str> = Vec::new();
        for chart in &self.charts {
            if !repos.contains(&chart.repo.as_str()) {
                repos.push(&chart.repo);
            }
        }
        repos
    }

    /// One request per chart entry, in manifest order
    pub fn requests(&self) -> Vec<ArtifactRequest> {
        self.charts
            .iter()
            .map(|chart| ArtifactRequest {
                repo_url: chart.repo.trim().to_string(),
                name: chart.name.trim().to_string(),
                version: chart.version.clone(),
                dest_repo: self.rt_repo.clone(),
                cache_dir: self.cache.clone(),
            })
            .collect()
    }
}
