//! CLI-level error type.
//!
//! Kept separate from [`duosync_core::errors::SyncError`], the same way
//! artid's CLI carried its own `errors::Error` wrapping the core crate's
//! error type (`examples/gabo01-artid/UI/cli/src/errors.rs`), so argument
//! parsing failures don't have to be shoehorned into the core's vocabulary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors the CLI itself can raise, before or around a call into
/// `duosync_core`.
#[derive(Debug, Error)]
pub enum CliError {
    /// A `-dirpair` or `-sendto` path did not exist.
    #[error("path does not exist: {0:?}")]
    PathNotFound(PathBuf),

    /// `-dirpair` requires exactly two paths.
    #[error("-dirpair requires exactly two paths, got {0}")]
    DirpairArity(usize),

    /// `-sendto` requires at least one path.
    #[error("-sendto requires at least one path")]
    SendtoEmpty,

    /// Positional config-file arguments were given; parsing them is out of
    /// scope for this build.
    #[error("config file synchronization is not supported in this build: {0:?}")]
    ConfigFileUnsupported(PathBuf),

    /// The underlying sync engine failed.
    #[error(transparent)]
    Sync(#[from] duosync_core::errors::SyncError),
}
