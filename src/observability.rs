//! Scan engine log events.
//!
//! Every event is emitted under the `cellstore` target with a `component`
//! field ("scanner" or "store") and an `event` field naming
//! what happened. Installing a subscriber is left to the embedding
//! application.
//!
//! Levels in use:
//! - `debug`: scanner lifecycle (`scanner_opened`, `scanner_resync_pending`,
//!   `scanner_resynced`, `scanner_closed`)
//! - `info`: segment set changes in the store (`segment_swap`)
//! - `warn`: a parallel seek task that failed (`parallel_seek_failed`)
//! - `error`: a scan aborted on an out-of-order source (`scanner_order_violation`)
//!
//! Cell values are never logged. Keys appear only through their `Debug` form.

pub(crate) const CELLSTORE_TARGET: &str = "cellstore";

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::CELLSTORE_TARGET, $($field)*)
    };
}

macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::CELLSTORE_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::CELLSTORE_TARGET, $($field)*)
    };
}

macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::CELLSTORE_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
