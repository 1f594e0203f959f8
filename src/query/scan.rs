use std::{collections::BTreeSet, fmt, ops::Bound};

use bytes::Bytes;

use super::TimeRange;
use crate::{filter::Filter, scan::RowRange};

/// Description of one store scan: rows, columns, versions and limits.
///
/// Built with consuming setters:
///
/// ```
/// use cellstore::query::Scan;
///
/// let scan = Scan::new()
///     .start_row("row2")
///     .stop_row("row4")
///     .column("q")
///     .max_versions(3);
/// assert_eq!(scan.get_max_versions(), 3);
/// ```
pub struct Scan {
    pub(crate) rows: RowRange,
    pub(crate) columns: BTreeSet<Bytes>,
    pub(crate) max_versions: usize,
    pub(crate) time_range: TimeRange,
    pub(crate) max_results_per_family: Option<usize>,
    pub(crate) row_offset_per_family: usize,
    pub(crate) batch: Option<usize>,
    pub(crate) raw: bool,
    pub(crate) cache_blocks: bool,
    pub(crate) memory_only: bool,
    pub(crate) segments_only: bool,
    pub(crate) filter: Option<Box<dyn Filter>>,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            rows: RowRange::all(),
            columns: BTreeSet::new(),
            max_versions: 1,
            time_range: TimeRange::ALL,
            max_results_per_family: None,
            row_offset_per_family: 0,
            batch: None,
            raw: false,
            cache_blocks: true,
            memory_only: false,
            segments_only: false,
            filter: None,
        }
    }
}

impl Scan {
    /// Scan every row, newest version only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point get of exactly `row`.
    pub fn get(row: impl Into<Bytes>) -> Self {
        Self {
            rows: RowRange::single(row),
            ..Self::default()
        }
    }

    /// Inclusive start row; empty means the first row.
    pub fn start_row(self, row: impl Into<Bytes>) -> Self {
        let row = row.into();
        let start = if row.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(row)
        };
        Scan {
            rows: RowRange::new(start, self.rows.end.clone()),
            ..self
        }
    }

    /// Exclusive stop row; empty means past the last row.
    pub fn stop_row(self, row: impl Into<Bytes>) -> Self {
        let row = row.into();
        let end = if row.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(row)
        };
        Scan {
            rows: RowRange::new(self.rows.start.clone(), end),
            ..self
        }
    }

    /// Replace the row range wholesale.
    pub fn rows(self, rows: RowRange) -> Self {
        Scan { rows, ..self }
    }

    /// Request one column; requesting none means every column.
    pub fn column(mut self, qualifier: impl Into<Bytes>) -> Self {
        self.columns.insert(qualifier.into());
        self
    }

    /// Request several columns.
    pub fn columns<I, Q>(mut self, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<Bytes>,
    {
        self.columns.extend(qualifiers.into_iter().map(Into::into));
        self
    }

    /// Versions returned per column, at least one.
    pub fn max_versions(self, max_versions: usize) -> Self {
        Scan {
            max_versions: max_versions.max(1),
            ..self
        }
    }

    /// Every version up to the store's own cap.
    pub fn all_versions(self) -> Self {
        Scan {
            max_versions: usize::MAX,
            ..self
        }
    }

    /// Only return cells whose timestamp lies in `time_range`.
    pub fn time_range(self, time_range: TimeRange) -> Self {
        Scan { time_range, ..self }
    }

    /// Cap on cells returned per row of the family, applied after the offset.
    pub fn max_results_per_family(self, limit: usize) -> Self {
        Scan {
            max_results_per_family: Some(limit),
            ..self
        }
    }

    /// Qualifying cells to skip at the start of every row.
    pub fn row_offset_per_family(self, offset: usize) -> Self {
        Scan {
            row_offset_per_family: offset,
            ..self
        }
    }

    /// Maximum cells returned by one `next_row` call when the caller passes no limit.
    pub fn batch(self, batch: usize) -> Self {
        Scan {
            batch: (batch > 0).then_some(batch),
            ..self
        }
    }

    /// Replay mode: delete markers are returned and shadow nothing.
    pub fn raw(self) -> Self {
        Scan { raw: true, ..self }
    }

    /// Hint forwarded to cursor enumeration.
    pub fn cache_blocks(self, cache_blocks: bool) -> Self {
        Scan {
            cache_blocks,
            ..self
        }
    }

    /// Read only the memory buffer.
    pub fn memory_only(self) -> Self {
        Scan {
            memory_only: true,
            segments_only: false,
            ..self
        }
    }

    /// Read only flushed segments.
    pub fn segments_only(self) -> Self {
        Scan {
            segments_only: true,
            memory_only: false,
            ..self
        }
    }

    /// Attach a caller-supplied filter.
    pub fn filter(self, filter: impl Filter + 'static) -> Self {
        Scan {
            filter: Some(Box::new(filter)),
            ..self
        }
    }

    /// Row range.
    pub fn get_rows(&self) -> &RowRange {
        &self.rows
    }

    /// Requested qualifiers; empty means all.
    pub fn get_columns(&self) -> &BTreeSet<Bytes> {
        &self.columns
    }

    /// Requested versions per column.
    pub fn get_max_versions(&self) -> usize {
        self.max_versions
    }

    /// Timestamp filter.
    pub fn get_time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Whether the scan is a single-row get.
    pub fn is_get(&self) -> bool {
        self.rows.is_single_row()
    }

    /// Whether the scan runs in replay mode.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Whether the scan names explicit columns.
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    pub(crate) fn take_filter(&mut self) -> Option<Box<dyn Filter>> {
        self.filter.take()
    }
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan")
            .field("rows", &self.rows)
            .field("columns", &self.columns.len())
            .field("max_versions", &self.max_versions)
            .field("time_range", &self.time_range)
            .field("max_results_per_family", &self.max_results_per_family)
            .field("row_offset_per_family", &self.row_offset_per_family)
            .field("batch", &self.batch)
            .field("raw", &self.raw)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Scan variant.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ScanType {
    /// Client read: delete markers suppress the cells they shadow and are not returned.
    #[default]
    UserScan,
    /// Minor compaction: delete markers and everything they shadow are kept.
    CompactionRetainDeletes,
    /// Major compaction: delete markers are applied and dropped for rows in
    /// `[from_row, to_row)`; an empty bound is unbounded on that side.
    CompactionDropDeletes {
        /// First row (inclusive) where deletes are dropped.
        from_row: Bytes,
        /// Row (exclusive) where dropping stops.
        to_row: Bytes,
    },
}

impl ScanType {
    /// Drop deletes across every row.
    pub fn drop_all_deletes() -> Self {
        ScanType::CompactionDropDeletes {
            from_row: Bytes::new(),
            to_row: Bytes::new(),
        }
    }

    /// Drop deletes only inside `[from_row, to_row)`.
    pub fn drop_deletes_in(from_row: impl Into<Bytes>, to_row: impl Into<Bytes>) -> Self {
        ScanType::CompactionDropDeletes {
            from_row: from_row.into(),
            to_row: to_row.into(),
        }
    }

    /// Whether this is a compaction variant.
    pub fn is_compaction(&self) -> bool {
        !matches!(self, ScanType::UserScan)
    }
}
