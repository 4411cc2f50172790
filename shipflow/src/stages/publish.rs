//! Mirror sync of the build output to an artifact bucket.

use super::{Stage, StageContext};
use crate::core::{ErrorDetail, StageId, StageOutcome};
use crate::runner::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Default build output directory, relative to the project.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Where build artifacts are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Preview environment.
    #[default]
    Development,
    /// Live environment.
    Production,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Bucket names and the per-app prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTargets {
    /// Bucket for [`Destination::Development`].
    pub dev_bucket: String,
    /// Bucket for [`Destination::Production`].
    pub prod_bucket: String,
    /// Key prefix inside the bucket.
    pub app_name: String,
}

impl Default for PublishTargets {
    fn default() -> Self {
        Self {
            dev_bucket: "manifest-frontends-dev".to_string(),
            prod_bucket: "manifest-frontends".to_string(),
            app_name: "default-app".to_string(),
        }
    }
}

impl PublishTargets {
    /// Returns the bucket for a destination.
    #[must_use]
    pub fn bucket(&self, destination: Destination) -> &str {
        match destination {
            Destination::Development => &self.dev_bucket,
            Destination::Production => &self.prod_bucket,
        }
    }

    /// Returns `s3://<bucket>/<app_name>/`.
    #[must_use]
    pub fn remote_uri(&self, destination: Destination) -> String {
        format!("s3://{}/{}/", self.bucket(destination), self.app_name)
    }
}

/// Publishes the build output so the remote set equals the local set.
#[derive(Debug, Clone)]
pub struct PublishStage {
    runner: Arc<dyn CommandRunner>,
    targets: PublishTargets,
    output_dir: String,
}

impl PublishStage {
    /// Creates a publish stage with default targets.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            targets: PublishTargets::default(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
        }
    }

    /// Sets the buckets and app prefix.
    #[must_use]
    pub fn with_targets(mut self, targets: PublishTargets) -> Self {
        self.targets = targets;
        self
    }

    /// Sets the build output directory, relative to the project.
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<String>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Returns the absolute build output path for a project.
    #[must_use]
    pub fn output_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.output_dir)
    }

    /// Returns the sync command for a destination.
    #[must_use]
    pub fn sync_command(&self, destination: Destination) -> CommandSpec {
        CommandSpec::new("aws").args([
            "s3".to_string(),
            "sync".to_string(),
            format!("{}/", self.output_dir.trim_end_matches('/')),
            self.targets.remote_uri(destination),
            "--delete".to_string(),
        ])
    }
}

#[async_trait]
impl Stage for PublishStage {
    fn id(&self) -> StageId {
        StageId::Publish
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let destination = ctx.destination();
        let dist = self.output_path(ctx.working_dir());

        if !dist.is_dir() {
            warn!(run_id = %ctx.run_id(), path = %dist.display(), "Build artifacts missing");
            return StageOutcome::failed(
                StageId::Publish,
                "Build artifacts missing",
                ErrorDetail::new(format!("Build artifacts missing: {}", dist.display())),
            );
        }

        let digest_dir = dist.clone();
        let digest = match tokio::task::spawn_blocking(move || artifact_digest(&digest_dir)).await {
            Ok(Ok(digest)) => Some(digest),
            Ok(Err(err)) => {
                warn!(error = %err, "Could not digest build artifacts");
                None
            }
            Err(err) => {
                warn!(error = %err, "Artifact digest task failed");
                None
            }
        };

        let command = self.sync_command(destination);
        let remote_uri = self.targets.remote_uri(destination);

        match self.runner.run(&command, ctx.working_dir()).await {
            Ok(output) => {
                info!(
                    run_id = %ctx.run_id(),
                    destination = %destination,
                    remote = %remote_uri,
                    "Published build artifacts"
                );
                let summary = match destination {
                    Destination::Development => "Upload to development complete",
                    Destination::Production => "Deployment to production complete",
                };
                let mut outcome = StageOutcome::succeeded(StageId::Publish, summary, output.combined())
                    .with_metadata("destination", Value::String(destination.to_string()))
                    .with_metadata("remote_uri", Value::String(remote_uri));
                if let Some((digest, files)) = digest {
                    outcome = outcome
                        .with_metadata("artifact_digest", Value::String(digest))
                        .with_metadata("file_count", Value::from(files));
                }
                outcome
            }
            Err(err) => {
                warn!(run_id = %ctx.run_id(), error = %err, "Publish failed");
                StageOutcome::command_failed(StageId::Publish, format!("Upload to {destination} failed"), &err)
                    .with_metadata("destination", Value::String(destination.to_string()))
            }
        }
    }
}

/// Computes a SHA-256 digest over every file under `dir`.
///
/// Files are visited in sorted relative-path order; each contributes its
/// path, a NUL byte, its length and its contents. Returns the hex digest and
/// the file count.
pub fn artifact_digest(dir: &Path) -> io::Result<(String, usize)> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let contents = std::fs::read(dir.join(relative))?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }

    Ok((hex::encode(hasher.finalize()), files.len()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(io::Error::other)?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(relative);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunKind;
    use crate::testing::{ScriptedResponse, ScriptedRunner};

    fn project_with_dist() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist/assets")).unwrap();
        std::fs::write(dir.path().join("dist/index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("dist/assets/app.js"), "console.log(1)").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_missing_dist_skips_sync() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let stage = PublishStage::new(runner.clone());

        let outcome = stage
            .execute(&StageContext::detached(RunKind::Promote, dir.path()))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.summary, "Build artifacts missing");
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_dev_sync_command() {
        let dir = project_with_dist();
        let runner = Arc::new(ScriptedRunner::new());
        let stage = PublishStage::new(runner.clone()).with_targets(PublishTargets {
            app_name: "storefront".to_string(),
            ..PublishTargets::default()
        });

        let outcome = stage
            .execute(&StageContext::detached(RunKind::ConfigPatch, dir.path()))
            .await;

        assert!(outcome.success);
        assert_eq!(
            runner.invocations(),
            ["aws s3 sync dist/ s3://manifest-frontends-dev/storefront/ --delete"]
        );
        assert_eq!(outcome.metadata_value("destination"), Some(&Value::from("development")));
        assert_eq!(outcome.metadata_value("file_count"), Some(&Value::from(2)));
    }

    #[tokio::test]
    async fn test_production_uses_prod_bucket() {
        let dir = project_with_dist();
        let runner = Arc::new(ScriptedRunner::new());
        let stage = PublishStage::new(runner.clone());

        stage
            .execute(&StageContext::detached(RunKind::Promote, dir.path()))
            .await;

        assert_eq!(
            runner.invocations(),
            ["aws s3 sync dist/ s3://manifest-frontends/default-app/ --delete"]
        );
    }

    #[tokio::test]
    async fn test_sync_failure() {
        let dir = project_with_dist();
        let runner = Arc::new(ScriptedRunner::new().on("aws s3 sync", ScriptedResponse::fail(1, "AccessDenied")));
        let stage = PublishStage::new(runner);

        let outcome = stage
            .execute(&StageContext::detached(RunKind::Promote, dir.path()))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.summary, "Upload to production failed");
        assert!(outcome.error_detail.unwrap().output.unwrap().contains("AccessDenied"));
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let dir = project_with_dist();
        let dist = dir.path().join("dist");

        let (first, count) = artifact_digest(&dist).unwrap();
        let (second, _) = artifact_digest(&dist).unwrap();
        assert_eq!(first, second);
        assert_eq!(count, 2);

        std::fs::write(dist.join("index.html"), "<html>changed</html>").unwrap();
        let (third, _) = artifact_digest(&dist).unwrap();
        assert_ne!(first, third);
    }
}
