//! Last-Synchronous-State Database: the persistent record of what the two
//! sides of a base folder looked like the last time they were declared
//! equal.
//!
//! There is no teacher module for this directly — artid never persisted a
//! comparison tree, only a TOML `config/archive.rs` history of backup runs.
//! The tree shape here is grounded in artid's `DirTree`/`TreeNode`
//! (`examples/gabo01-artid/src/core/src/ops/core/tree.rs`-style recursive
//! node), generalized from "files under a backup root" to "files, symlinks
//! and sub-folders with a descriptor per side", which is what the
//! specification's §4.8 recursion actually stores.

pub mod codec;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing a last-synchronous-state
/// database.
#[derive(Debug, Error)]
pub enum LssdbError {
    /// Neither side's database file exists. Not a plain I/O error: the
    /// direction engine treats this as first-run, not a failure.
    #[error("no last-synchronous-state database at {0:?}")]
    NotExisting(PathBuf),

    /// The two files' session UUID sets intersect in more than one pair
    /// with opposite lead markers.
    #[error("multiple common sessions between the two database files")]
    MultipleCommonSessions,

    /// The container or one of its streams is corrupt, truncated, or from
    /// an unreadable future version. An out-of-memory failure while
    /// reading an oversized container is rewritten into this variant,
    /// since a partial read of a huge container commonly surfaces that
    /// way.
    #[error("database is corrupted: {0}")]
    Corrupted(String),

    /// Underlying I/O failure opening or writing a container file.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
}

/// Which side of a base folder pair a descriptor or stream belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Side {
    /// The first configured folder of the pair.
    Left,
    /// The second configured folder of the pair.
    Right,
}

/// The rule the categorizer used (or will use) to decide whether two items
/// are equal. Persisted per file entry because the database is only
/// meaningful when read back under a compatible variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompareVariant {
    /// Equal iff mod-time (within tolerance) and size match.
    ByTimeAndSize,
    /// Equal iff byte-for-byte identical, read via the Binary Comparator.
    ByContent,
    /// Equal iff size matches; mod-time is ignored.
    BySize,
}

/// Per-side snapshot of a file as it looked the last time the two sides
/// were declared equal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Descriptor {
    /// Modification time, seconds since epoch, at last sync.
    pub mod_time: i64,
    /// Size in bytes at last sync.
    pub size: u64,
    /// Backend fingerprint at last sync; `0` means unknown.
    pub fingerprint: u64,
}

/// A remembered file: its name, the variant it was compared under, and a
/// descriptor per side.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    /// Item name (not a full path; position in the tree supplies the rest).
    pub name: String,
    /// Compare variant active when this entry was last written.
    pub variant: CompareVariant,
    /// Left-side descriptor.
    pub left: Descriptor,
    /// Right-side descriptor.
    pub right: Descriptor,
}

/// A remembered symlink: name plus per-side link targets.
#[derive(Clone, Debug, PartialEq)]
pub struct SymlinkEntry {
    /// Item name.
    pub name: String,
    /// Left-side link target, as last observed.
    pub left_target: String,
    /// Right-side link target, as last observed.
    pub right_target: String,
}

/// Whether a remembered folder was present on both sides the last time
/// this tree was saved.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FolderStatus {
    /// Present, and in sync, on both sides.
    InSync,
    /// Present only on the left at last sync.
    LeftOnly,
    /// Present only on the right at last sync.
    RightOnly,
}

/// A remembered folder: name, status, and everything recursively below it.
#[derive(Clone, Debug, PartialEq)]
pub struct FolderEntry {
    /// Item name.
    pub name: String,
    /// Presence status at last sync.
    pub status: FolderStatus,
    /// Contents of this folder.
    pub node: SyncFolder,
}

/// The recursive body of a folder: its files, symlinks and sub-folders, in
/// the order the codec's recursion rule lays them out (files, then
/// symlinks, then sub-folders).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncFolder {
    /// Files directly in this folder.
    pub files: Vec<FileEntry>,
    /// Symlinks directly in this folder.
    pub symlinks: Vec<SymlinkEntry>,
    /// Sub-folders directly in this folder.
    pub folders: Vec<FolderEntry>,
}

impl SyncFolder {
    /// An empty tree, as used for a base folder pair with no prior sync.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_has_nothing() {
        let tree = SyncFolder::empty();
        assert!(tree.files.is_empty());
        assert!(tree.symlinks.is_empty());
        assert!(tree.folders.is_empty());
    }
}
