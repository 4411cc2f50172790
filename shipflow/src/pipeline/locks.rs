//! Per-directory advisory locks serializing runs on the same project.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per canonical working directory.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLocks {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Held for the duration of a run.
#[derive(Debug)]
pub struct WorkspaceGuard {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl WorkspaceGuard {
    /// Returns the locked directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkspaceLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive use of `dir`.
    pub async fn acquire(&self, dir: &Path) -> WorkspaceGuard {
        let path = canonical(dir);
        let lock = Arc::clone(self.locks.entry(path.clone()).or_default().value());
        let guard = lock.lock_owned().await;
        WorkspaceGuard { path, _guard: guard }
    }

    /// Returns true if another run currently holds `dir`.
    #[must_use]
    pub fn is_locked(&self, dir: &Path) -> bool {
        self.locks
            .get(&canonical(dir))
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of directories seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no directory was ever locked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

fn canonical(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}
