//! Read-only views of the project directory.

mod tree;

pub use tree::{read_tree, read_tree_blocking, EntryType, TreeEntry, SKIPPED_DIRS};
