//! Recursive project tree listing with file contents.

use crate::errors::ShipflowError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory names never listed.
pub const SKIPPED_DIRS: &[&str] = &["dist", "node_modules", ".git"];

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// One node of the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File or directory name.
    pub name: String,
    /// Path relative to the project root.
    pub path: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// File contents; `null` for directories.
    pub content: Option<String>,
    /// Directory children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeEntry>>,
}

/// Lists `root` recursively off the async runtime.
pub async fn read_tree(root: impl Into<PathBuf>) -> Result<Vec<TreeEntry>, ShipflowError> {
    let root = root.into();
    tokio::task::spawn_blocking(move || read_tree_blocking(&root))
        .await
        .map_err(|e| ShipflowError::Internal(format!("tree listing task failed: {e}")))?
}

/// Lists `root` recursively.
///
/// Fails with [`ShipflowError::ProjectNotFound`] if `root` is not a
/// directory. Unreadable subdirectories are logged and listed as empty.
pub fn read_tree_blocking(root: &Path) -> Result<Vec<TreeEntry>, ShipflowError> {
    if !root.is_dir() {
        return Err(ShipflowError::ProjectNotFound(root.to_path_buf()));
    }
    Ok(walk(root, Path::new("")))
}

fn walk(dir: &Path, relative: &Path) -> Vec<TreeEntry> {
    let mut entries = match list_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "Failed to read directory");
            return Vec::new();
        }
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    entries
        .into_iter()
        .filter(|(name, is_dir)| !(*is_dir && SKIPPED_DIRS.contains(&name.as_str())))
        .map(|(name, is_dir)| {
            let full = dir.join(&name);
            let rel = relative.join(&name);
            if is_dir {
                TreeEntry {
                    children: Some(walk(&full, &rel)),
                    name,
                    path: rel.to_string_lossy().into_owned(),
                    entry_type: EntryType::Directory,
                    content: None,
                }
            } else {
                let content = fs::read_to_string(&full).unwrap_or_else(|err| {
                    warn!(path = %full.display(), error = %err, "Failed to read file");
                    format!("Error reading file: {err}")
                });
                TreeEntry {
                    name,
                    path: rel.to_string_lossy().into_owned(),
                    entry_type: EntryType::File,
                    content: Some(content),
                    children: None,
                }
            }
        })
        .collect()
}

fn list_dir(dir: &Path) -> io::Result<Vec<(String, bool)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        out.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/components")).unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("src/main.tsx"), "render()").unwrap();
        fs::write(dir.path().join("src/components/Hero.tsx"), "export {}").unwrap();
        fs::write(dir.path().join("dist/index.html"), "<html>").unwrap();
        dir
    }

    #[test]
    fn test_tree_skips_build_dirs_and_sorts() {
        let dir = project();
        let tree = read_tree_blocking(dir.path()).unwrap();

        let names: Vec<_> = tree.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["package.json", "src"]);

        let src = &tree[1];
        assert_eq!(src.entry_type, EntryType::Directory);
        let children = src.children.as_ref().unwrap();
        assert_eq!(children[0].name, "components");
        assert_eq!(children[1].path, Path::new("src").join("main.tsx").to_string_lossy());
        assert_eq!(children[1].content.as_deref(), Some("render()"));
    }

    #[test]
    fn test_files_named_like_build_dirs_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/dist"), "release notes").unwrap();

        let tree = read_tree_blocking(dir.path()).unwrap();
        let docs = tree[0].children.as_ref().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "dist");
        assert_eq!(docs[0].entry_type, EntryType::File);
        assert_eq!(docs[0].content.as_deref(), Some("release notes"));
    }

    #[test]
    fn test_entry_shape() {
        let entry = TreeEntry {
            name: "src".to_string(),
            path: "src".to_string(),
            entry_type: EntryType::Directory,
            content: None,
            children: Some(vec![]),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"name": "src", "path": "src", "type": "directory", "content": null, "children": []})
        );
    }

    #[test]
    fn test_non_utf8_file_reports_error_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("logo.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let tree = read_tree_blocking(dir.path()).unwrap();
        assert!(tree[0].content.as_deref().unwrap().starts_with("Error reading file: "));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let err = read_tree("/definitely/not/here").await.unwrap_err();
        assert!(matches!(err, ShipflowError::ProjectNotFound(_)));
    }
}
