#![deny(missing_docs)]
//! Merge-scan read path for a versioned, row-oriented cell store.
//!
//! A store holds one mutable memory buffer and any number of immutable flushed
//! segments. [`StoreScanner`] merges cursors over all of them into a single
//! ordered stream of cells and, row by row, applies version limits, delete
//! markers, time ranges, TTL expiry and caller filters.
//!
//! ```
//! use std::sync::Arc;
//!
//! use cellstore::{LocalStore, Scan, ScanInfo, ScannerOptions, Store, StoreScanner};
//!
//! let store = Arc::new(LocalStore::new());
//! store.put("row1", "cf", "q", 5, "a");
//! store.put("row1", "cf", "q", 3, "b");
//!
//! let info = ScanInfo::new("cf").max_versions(10);
//! let store: Arc<dyn Store> = store;
//! let scanner = StoreScanner::open(store, &info, Scan::new().max_versions(10), &ScannerOptions::default())?;
//! let mut row = Vec::new();
//! scanner.next_row(&mut row, None)?;
//! assert_eq!(row.len(), 2);
//! # Ok::<(), cellstore::ScanError>(())
//! ```

mod observability;

/// Versioned cells, their order and synthetic seek keys.
pub mod cell;

/// Row ranges.
pub mod scan;

/// Sorted cursors and the sources shipped with the crate.
pub mod cursor;

/// N-way merge over cursors.
pub mod heap;

/// Per-cell scan verdicts.
pub mod matcher;

/// Caller-supplied filters.
pub mod filter;

/// Scan descriptions and store settings.
pub mod query;

/// Storage collaborator and the in-process store.
pub mod store;

/// Scan orchestration.
pub mod scanner;

/// Worker pools for parallel seeks.
pub mod executor;

/// Scanner configuration.
pub mod option;

/// Error types.
pub mod error;

pub use crate::{
    cell::{Cell, CellComparator, CellKind},
    cursor::{Cursor, CursorError, MemStore, Segment},
    error::ScanError,
    filter::{Filter, FilterCode},
    option::ScannerOptions,
    query::{Scan, ScanInfo, ScanType, TimeRange},
    scan::RowRange,
    scanner::{ScannerState, StoreScanner},
    store::{ChangedSegmentsObserver, CursorQuery, LocalStore, Store},
};
