//! Error taxonomy for cursors and scans.

use std::{io, time::Duration};

use thiserror::Error;

use crate::executor::ExecutorError;

/// Errors surfaced by an individual cursor.
#[derive(Debug, Error)]
pub enum CursorError {
    /// Reading the backing source failed.
    #[error("cursor i/o failure: {0}")]
    Io(#[from] io::Error),
    /// The cursor was used after close.
    #[error("cursor is closed")]
    Closed,
}

/// Errors returned by a store scan.
///
/// Every variant aborts the current scan; callers close and, if appropriate,
/// restart with a fresh cursor set.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Failure originating in an underlying cursor, propagated verbatim.
    #[error(transparent)]
    Cursor(#[from] CursorError),
    /// The scan was constructed with a combination of options that cannot work.
    #[error("invalid scan: {0}")]
    InvalidScan(String),
    /// The merged stream went backwards.
    #[error("key {previous} followed by smaller key {next}")]
    OrderViolation {
        /// Cell observed first.
        previous: String,
        /// Smaller cell observed afterwards.
        next: String,
    },
    /// A column tracker observed a column smaller than the previous one.
    #[error("column {current} observed after column {previous}")]
    ColumnOrder {
        /// Column tracked before.
        previous: String,
        /// Column observed now.
        current: String,
    },
    /// A parallel seek task failed; the first failure is reported.
    #[error("parallel seek failed: {source}")]
    ParallelSeek {
        /// Error returned by the failing seek task.
        #[source]
        source: CursorError,
    },
    /// Waiting on the parallel seek barrier was interrupted.
    #[error("parallel seek interrupted")]
    Interrupted,
    /// Parallel seek tasks did not complete within the bounded wait.
    #[error("parallel seek timed out after {0:?}")]
    SeekTimeout(Duration),
    /// The scanner was used after close.
    #[error("scanner is closed")]
    Closed,
    /// A seek task could not be dispatched or its worker vanished.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl ScanError {
    /// Whether restarting the scan cannot help.
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidScan(_) | ScanError::OrderViolation { .. }
        )
    }
}
