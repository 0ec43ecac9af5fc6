//! Error types shared across the engines.
//!
//! Every module that touches a backend or a fallible codec defines its own
//! `Error`, the way artid's `ops::core::errors` used to hand-roll a
//! `kind` + boxed `cause` pair per module. Here the same shape comes out of
//! `thiserror` instead, and [`SyncError`] is the sum type Design Note (a) in
//! the specification asks for: every module's error converts into it with
//! `#[from]` so the executor can report one flat error enum to callbacks.

use std::path::PathBuf;

use crate::afs::AfsError;
use crate::lssdb::LssdbError;

/// Top level error produced by the engines in this crate.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A call into the abstract file system failed.
    #[error(transparent)]
    Afs(#[from] AfsError),

    /// The last-synchronous-state database could not be read or written.
    #[error(transparent)]
    Lssdb(#[from] LssdbError),

    /// The scanner could not enumerate a base folder at all (as opposed to a
    /// single item failing, which is reported through the error callback
    /// instead of aborting the scan).
    #[error("failed to scan base folder {path}")]
    Scan {
        /// Root of the scan that failed.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: AfsError,
    },

    /// The user's error callback requested that the whole run stop.
    #[error("synchronization cancelled")]
    Cancelled,

    /// An operation could not be completed after exhausting its retries and
    /// the error callback chose to ignore rather than abort.
    #[error("{count} item(s) failed during synchronization, see the per-item log")]
    PartialFailure {
        /// Number of leaves that ended up in [`crate::exec::Outcome::Failed`].
        count: usize,
    },
}

/// Decision returned by an error callback on a recoverable failure. Mirrors
/// the `try-reporting-error` combinator described in the specification: the
/// wrapper loops on `Retry` and returns on `Ignore`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorResponse {
    /// Try the operation again.
    Retry,
    /// Leave this item as failed and continue with the rest of the run.
    Ignore,
    /// Abort the whole run. [`SyncError::Cancelled`] is raised to the caller.
    Cancel,
}

/// Runs `op`, handing any error to `on_error` and looping while it answers
/// [`ErrorResponse::Retry`]. This is the `try-reporting-error` wrapper from
/// the specification's error-handling design.
pub fn try_reporting_error<T, E, F, H>(mut op: F, mut on_error: H) -> Result<Option<T>, SyncError>
where
    F: FnMut() -> Result<T, E>,
    H: FnMut(&E) -> ErrorResponse,
    SyncError: From<E>,
{
    loop {
        match op() {
            Ok(value) => return Ok(Some(value)),
            Err(err) => match on_error(&err) {
                ErrorResponse::Retry => continue,
                ErrorResponse::Ignore => return Ok(None),
                ErrorResponse::Cancel => return Err(SyncError::Cancelled),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    impl From<Boom> for SyncError {
        fn from(_: Boom) -> Self {
            SyncError::Cancelled
        }
    }

    #[test]
    fn retries_until_ok() {
        let attempts = Cell::new(0);
        let result = try_reporting_error(
            || {
                let n = attempts.get() + 1;
                attempts.set(n);
                if n < 3 {
                    Err(Boom)
                } else {
                    Ok(42)
                }
            },
            |_| ErrorResponse::Retry,
        );

        assert_eq!(result.unwrap(), Some(42));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn ignore_yields_none() {
        let result: Result<Option<()>, SyncError> =
            try_reporting_error(|| Err(Boom), |_| ErrorResponse::Ignore);
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn cancel_propagates() {
        let result: Result<Option<()>, SyncError> =
            try_reporting_error(|| Err(Boom), |_| ErrorResponse::Cancel);
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
