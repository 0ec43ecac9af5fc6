//! Progress, status and error callbacks.
//!
//! Per Design Note "Callbacks" in the specification: these cross thread
//! boundaries during scanning and synchronization, so they are modeled as
//! small trait objects passed by reference, with the contract that every
//! method is safe to call concurrently from multiple worker threads. The
//! shape mirrors artid's use of plain trait objects for its own `ops`
//! callbacks, generalized to the three distinct notification kinds the
//! specification's concurrency model calls for.

use std::path::Path;

use crate::afs::AfsError;
use crate::errors::ErrorResponse;

/// Receives progress notifications during a sync run. All methods must be
/// safe to call from any worker thread; implementations own their own
/// synchronization (the engine does not serialize calls for them).
pub trait ProgressSink: Send + Sync {
    /// Called when a new item begins processing.
    fn item_started(&self, _path: &Path) {}

    /// Called with the cumulative bytes transferred for the current item.
    fn item_bytes(&self, _path: &Path, _transferred: u64) {}

    /// Called when an item finishes, successfully or not.
    fn item_finished(&self, _path: &Path) {}

    /// Called with a one-line human-readable status update, analogous to
    /// a log line but intended for a UI status bar.
    fn status(&self, _message: &str) {}
}

/// A `ProgressSink` that discards everything, for tests and headless runs
/// that only care about the final statistics.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {}

/// Decides how to respond to a recoverable failure during scanning or
/// synchronization. Implements the interactive side of
/// [`crate::errors::try_reporting_error`]: the engine calls this, and the
/// wrapper loops on [`ErrorResponse::Retry`].
pub trait ErrorSink: Send + Sync {
    /// Asked once per failure; may be called again for the same item if it
    /// answers `Retry`.
    fn on_error(&self, path: &Path, error: &AfsError) -> ErrorResponse;
}

/// An `ErrorSink` that always ignores, useful for batch/unattended runs
/// where the caller would rather collect a failure count than prompt.
pub struct IgnoreAllErrors;

impl ErrorSink for IgnoreAllErrors {
    fn on_error(&self, _path: &Path, _error: &AfsError) -> ErrorResponse {
        ErrorResponse::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn ignore_all_errors_always_ignores() {
        let sink = IgnoreAllErrors;
        let err = AfsError::NotFound(PathBuf::from("x"));
        assert_eq!(sink.on_error(Path::new("x"), &err), ErrorResponse::Ignore);
    }

    #[test]
    fn null_progress_sink_accepts_all_calls() {
        let sink = NullProgressSink;
        sink.item_started(Path::new("a"));
        sink.item_bytes(Path::new("a"), 10);
        sink.item_finished(Path::new("a"));
        sink.status("ok");
    }
}
