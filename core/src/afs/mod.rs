//! Abstract File System: the single polymorphic backend interface.
//!
//! Grounded in artid's `FileSystem`/`Route` split
//! (`examples/gabo01-artid/src/core/src/ops/core/filesystem/mod.rs`). That
//! split generalizes directly: `Route` becomes [`path::AbstractPath`], and
//! `FileSystem` becomes [`AbstractFs`] — widened from "things `std::fs` can
//! do" to the full capability set the specification names, including
//! recycle sessions and transactional copy.

mod local;
mod memory;

pub use local::Local;
pub use memory::MemoryFs;

use std::io::{Read, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::path::{AbstractPath, FileAttributes, ItemType};

/// Errors a backend can raise. Every `AbstractFs` method funnels its
/// failures through this type so the executor never needs to know which
/// backend it is talking to.
#[derive(Debug, Error)]
pub enum AfsError {
    /// The item did not exist where the caller expected it.
    #[error("not found: {0:?}")]
    NotFound(PathBuf),

    /// The item exists but is of the wrong type for the requested operation
    /// (e.g. `read-stream` on a folder).
    #[error("wrong item type at {0:?}")]
    WrongType(PathBuf),

    /// The target is locked by another process.
    #[error("locked: {0:?}")]
    Locked(PathBuf),

    /// Permission was denied by the backend or the underlying OS.
    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    /// The destination volume has no space left.
    #[error("disk full writing {0:?}")]
    DiskFull(PathBuf),

    /// `rename-item` is not supported by this backend between the two
    /// given paths (cross-device, or backend never supports rename at
    /// all — e.g. MTP). The executor treats this symmetrically with the
    /// cross-device case and falls back to copy+delete.
    #[error("rename not supported from {from:?} to {to:?}")]
    RenameUnsupported {
        /// Source of the attempted rename.
        from: PathBuf,
        /// Destination of the attempted rename.
        to: PathBuf,
    },

    /// The backend does not provide a recycle bin / trash.
    #[error("recycle bin not supported")]
    RecycleUnsupported,

    /// The caller's pre-delete hook, or a progress callback, requested
    /// cancellation mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other backend-specific I/O failure.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// Path the failing call was operating on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl AfsError {
    /// Wraps a raw I/O error with the path that produced it, classifying
    /// the common `io::ErrorKind`s into their dedicated variants so callers
    /// further up don't have to inspect `io::Error` themselves.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => AfsError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => AfsError::PermissionDenied(path),
            std::io::ErrorKind::AlreadyExists => AfsError::Io { path, source: err },
            _ => AfsError::Io { path, source: err },
        }
    }
}

/// A readable byte stream handed back by `read-stream`.
pub type ReadStream = Box<dyn Read + Send>;

/// A writable byte stream handed back by `write-stream`.
pub type WriteStream = Box<dyn Write + Send>;

/// One entry yielded while `traverse-folder` walks a directory. Symlinks
/// are reported as themselves, never silently followed.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Full path of the entry.
    pub path: AbstractPath,
    /// What kind of item this is.
    pub item_type: ItemType,
}

/// Byte-delta callback invoked periodically during an unbuffered copy, used
/// by the Binary Comparator and by `copy-file-transactional` alike to
/// report progress and to offer a cancellation point.
pub trait ByteProgress: Send {
    /// Called after each chunk with the number of bytes moved so far.
    fn on_bytes(&mut self, transferred: u64) -> Result<(), AfsError>;
}

impl<F> ByteProgress for F
where
    F: FnMut(u64) -> Result<(), AfsError> + Send,
{
    fn on_bytes(&mut self, transferred: u64) -> Result<(), AfsError> {
        self(transferred)
    }
}

/// Outcome of a `copy-file-transactional` call.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    /// Size actually written to the target.
    pub size: u64,
    /// Modification time actually recorded on the target.
    pub mod_time: i64,
    /// Fingerprint reported for the source at the time of copy.
    pub source_fingerprint: u64,
    /// Fingerprint reported for the new target.
    pub target_fingerprint: u64,
    /// Set when the backend could not faithfully replay the source's
    /// modification time. A warning, not a failure.
    pub set_mod_time_failed: bool,
}

/// A batched deletion context for backends that support a recycle bin.
/// Accumulates doomed items and finalizes them in one sweep, because
/// recycling many small items through a per-call API is pathologically
/// slow on some platforms.
pub trait RecycleSession: Send {
    /// Marks `path` for recycling when this session finalizes.
    fn recycle(&mut self, path: &AbstractPath) -> Result<(), AfsError>;

    /// Finalizes all accumulated deletions.
    fn finish(self: Box<Self>) -> Result<(), AfsError>;
}

/// The single polymorphic backend interface every engine in this crate is
/// written against. Implementations exist for the local filesystem
/// ([`Local`]) and, for tests, an in-memory backend ([`MemoryFs`]).
pub trait AbstractFs: Send + Sync {
    /// `get-item-type`: classifies `path` without following symlinks.
    fn get_item_type(&self, path: &AbstractPath) -> Result<ItemType, AfsError>;

    /// `item-exists`: true if anything (of any type) is at `path`.
    fn item_exists(&self, path: &AbstractPath) -> Result<bool, AfsError>;

    /// Attributes (mod-time, size, fingerprint) for an existing item.
    fn attributes(&self, path: &AbstractPath) -> Result<FileAttributes, AfsError>;

    /// `read-stream`: opens `path` for reading.
    fn read_stream(&self, path: &AbstractPath) -> Result<ReadStream, AfsError>;

    /// `write-stream`: opens `path` for writing, creating or truncating it.
    fn write_stream(&self, path: &AbstractPath) -> Result<WriteStream, AfsError>;

    /// `create-folder-plain`: creates a single directory level; the parent
    /// must already exist (callers create parents top-down themselves).
    fn create_folder_plain(&self, path: &AbstractPath) -> Result<(), AfsError>;

    /// `rename-item`: atomic rename within this backend.
    ///
    /// Returns [`AfsError::RenameUnsupported`] when the backend cannot
    /// honor the rename between these two paths (cross-device, or a
    /// backend that never supports rename, e.g. MTP); the executor treats
    /// both cases identically and falls back to copy+delete.
    fn rename_item(&self, from: &AbstractPath, to: &AbstractPath) -> Result<(), AfsError>;

    /// `remove-file-plain`: deletes a single file or symlink, permanently.
    fn remove_file_plain(&self, path: &AbstractPath) -> Result<(), AfsError>;

    /// `remove-folder-recursion`: deletes a directory and everything under
    /// it, permanently.
    fn remove_folder_recursion(&self, path: &AbstractPath) -> Result<(), AfsError>;

    /// `copy-symlink`: recreates the symlink at `from` pointing at the same
    /// target, at `to`.
    fn copy_symlink(&self, from: &AbstractPath, to: &AbstractPath) -> Result<(), AfsError>;

    /// `traverse-folder`: lists the direct children of `path`.
    fn traverse_folder(&self, path: &AbstractPath) -> Result<Vec<DirEntry>, AfsError>;

    /// `copy-file-transactional`: the hardest contract in the interface.
    ///
    /// When `transactional` is set, the backend writes to a temporary
    /// sibling of `target`, flushes it to durable storage, invokes
    /// `pre_delete_target` (which may remove an existing target and is
    /// free to fail), then renames the temporary onto `target` in a
    /// single operation — so the target is either absent, the old file,
    /// or the fully-written new file, and never a partial write.
    ///
    /// When `transactional` is false, bytes stream directly to `target`;
    /// behavior when `target` already exists is backend-defined.
    #[allow(clippy::too_many_arguments)]
    fn copy_file_transactional(
        &self,
        source: &AbstractPath,
        source_attrs: &FileAttributes,
        target: &AbstractPath,
        copy_permissions: bool,
        transactional: bool,
        pre_delete_target: &mut dyn FnMut() -> Result<(), AfsError>,
        on_bytes: &mut dyn ByteProgress,
    ) -> Result<CopyOutcome, AfsError>;

    /// `has-native-transactional-copy`: true if this backend's normal copy
    /// path is already rename-on-complete, letting callers (notably the
    /// LSSDB writer) skip their own temp-file choreography.
    fn has_native_transactional_copy(&self) -> bool;

    /// `supports-recycle-bin`: true if `create_recycle_session` can
    /// succeed on this backend.
    fn supports_recycle_bin(&self) -> bool;

    /// `create-recycle-session`: opens a batched deletion context.
    fn create_recycle_session(&self) -> Result<Box<dyn RecycleSession>, AfsError>;

    /// `free-disk-space`: bytes free on the volume backing `path`, if the
    /// backend can report it.
    fn free_disk_space(&self, path: &AbstractPath) -> Result<Option<u64>, AfsError>;

    /// `connect`: establishes whatever process-scoped context this backend
    /// needs (session pool, OAuth token, CA bundle) before first use.
    /// Backends with no such state (e.g. [`Local`]) implement this as a
    /// no-op.
    fn connect(&self) -> Result<(), AfsError> {
        Ok(())
    }
}
