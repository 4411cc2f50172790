//! The on-disk configuration document.

use super::merge::deep_merge;
use crate::errors::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Reads, merges and atomically rewrites one JSON configuration file.
///
/// Writers are serialized; readers always see a complete document because
/// each write lands in a temporary file in the same directory that is then
/// renamed over the existing file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    /// Creates a store for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the document exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads and parses the document.
    pub async fn load(&self) -> Result<Value, ConfigError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound { path: self.path.clone() });
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Merges `patch` into the document, writes it back, and returns the
    /// merged document.
    ///
    /// The patch must be a JSON object. The document must already exist.
    pub async fn apply_patch(&self, patch: &Value) -> Result<Value, ConfigError> {
        if !patch.is_object() {
            return Err(ConfigError::InvalidPatch(
                "configuration patch must be a JSON object".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let existing = self.load().await?;
        let merged = deep_merge(&existing, patch);
        self.write(&merged).await?;

        info!(path = %self.path.display(), "Configuration updated");
        Ok(merged)
    }

    /// Replaces the document with `value`.
    pub async fn replace(&self, value: &Value) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        self.write(value).await
    }

    async fn write(&self, value: &Value) -> Result<(), ConfigError> {
        let path = self.path.clone();
        let bytes = to_pretty_json(value).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        let task_path = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&task_path, &bytes))
            .await
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| ConfigError::Io { path, source })?;

        debug!(path = %self.path.display(), "Configuration written");
        Ok(())
    }
}

/// Serializes with four-space indentation and a trailing newline.
fn to_pretty_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
