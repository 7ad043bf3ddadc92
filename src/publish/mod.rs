//! Publishing cached charts to the destination repository
//!
//! Publishing is delegated to external commands (by default the JFrog CLI).
//! Command lines come from templates with `{placeholder}` variables:
//!
//! - upload: `{path}`, `{repo}`, `{name}`, `{version}`
//! - reindex: `{repo}`
//!
//! A non-zero exit is reported as [`PublishError::CommandFailed`]; callers
//! decide whether that matters.

mod runner;

pub use runner::{
    CommandOutput, CommandRunner, PublishError, RecordingRunner, Result, ShellRunner,
};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_UPLOAD_COMMAND: &str = "jf rt u {path} {repo}/{name}/{version}/";
pub const DEFAULT_REINDEX_COMMAND: &str = "jf rt curl -XPOST /api/helm/{repo}/reindex";

/// Upload and reindex command templates
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommandTemplates {
    #[serde(default = "default_upload")]
    pub upload: String,
    #[serde(default = "default_reindex")]
    pub reindex: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            upload: default_upload(),
            reindex: default_reindex(),
        }
    }
}

fn default_upload() -> String {
    DEFAULT_UPLOAD_COMMAND.to_string()
}

fn default_reindex() -> String {
    DEFAULT_REINDEX_COMMAND.to_string()
}

/// Substitute `{key}` placeholders; unknown placeholders are left as-is
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |rendered, (key, value)| {
        rendered.replace(&format!("{{{key}}}"), value)
    })
}

/// Pushes charts and triggers reindexing through a [`CommandRunner`]
#[derive(Clone)]
pub struct Publisher {
    runner: Arc<dyn CommandRunner>,
    templates: CommandTemplates,
}

impl Publisher {
    pub fn new(runner: Arc<dyn CommandRunner>, templates: CommandTemplates) -> Self {
        Self { runner, templates }
    }

    /// Upload one cached chart
    pub async fn upload(
        &self,
        path: &Path,
        repo: &str,
        name: &str,
        version: &str,
    ) -> Result<CommandOutput> {
        let path = path.display().to_string();
        let command = render(
            &self.templates.upload,
            &[
                ("path", path.as_str()),
                ("repo", repo),
                ("name", name),
                ("version", version),
            ],
        );

        let output = self.execute(command).await?;
        info!(repo, name, version, "Chart published");
        Ok(output)
    }

    /// Ask the destination repository to rebuild its index
    pub async fn reindex(&self, repo: &str) -> Result<CommandOutput> {
        let command = render(&self.templates.reindex, &[("repo", repo)]);

        let output = self.execute(command).await?;
        info!(repo, "Repository reindexed");
        Ok(output)
    }

    async fn execute(&self, command: String) -> Result<CommandOutput> {
        debug!(command = %command, "Publishing");
        let output = self.runner.run(&command).await?;

        if !output.success() {
            return Err(PublishError::CommandFailed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_templates() {
        let upload = render(
            DEFAULT_UPLOAD_COMMAND,
            &[
                ("path", "/cache/app-1.0.0.tgz"),
                ("repo", "helm-local"),
                ("name", "app"),
                ("version", "1.0.0"),
            ],
        );
        assert_eq!(upload, "jf rt u /cache/app-1.0.0.tgz helm-local/app/1.0.0/");

        let reindex = render(DEFAULT_REINDEX_COMMAND, &[("repo", "helm-local")]);
        assert_eq!(reindex, "jf rt curl -XPOST /api/helm/helm-local/reindex");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("{repo} {other}", &[("repo", "r")]), "r {other}");
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let runner = Arc::new(RecordingRunner::new().fail_when("jf rt u", 1));
        let publisher = Publisher::new(runner.clone(), CommandTemplates::default());

        let err = publisher
            .upload(Path::new("/cache/app-1.0.0.tgz"), "helm-local", "app", "1.0.0")
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::CommandFailed { code: Some(1), .. }));
        assert_eq!(runner.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_reindex_uses_template() {
        let runner = Arc::new(RecordingRunner::new());
        let templates = CommandTemplates {
            reindex: "curl -X POST https://rt.example.com/{repo}/reindex".to_string(),
            ..CommandTemplates::default()
        };

        Publisher::new(runner.clone(), templates)
            .reindex("charts")
            .await
            .unwrap();

        assert_eq!(
            runner.commands(),
            vec!["curl -X POST https://rt.example.com/charts/reindex"]
        );
    }
}
