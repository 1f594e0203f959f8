//! Per-cell verdicts for one scan.
//!
//! [`QueryMatcher`] is fed every cell the merge surfaces for the current row
//! and answers with a [`MatchCode`]. It owns the column/version counters and
//! the delete markers seen so far in the row; all of it is reset at each row
//! boundary and nothing is ever looked at twice.

mod columns;
mod deletes;

use std::cmp::Ordering;

use bytes::Bytes;

use self::{
    columns::ColumnTracker,
    deletes::{DeleteResult, DeleteTracker},
};
use crate::{
    cell::{Cell, CellComparator, OLDEST_TIMESTAMP},
    error::ScanError,
    filter::{Filter, FilterCode},
    query::{Scan, ScanInfo, ScanType, TimeRange},
    scan::RowRange,
};

/// Verdict on one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchCode {
    /// Return the cell.
    Include,
    /// Return the cell, then seek to the next column.
    IncludeAndSeekNextColumn,
    /// Return the cell, then seek to the next row.
    IncludeAndSeekNextRow,
    /// Drop the cell and advance by one.
    Skip,
    /// Drop the cell and the rest of its column.
    SeekNextColumn,
    /// Drop the cell and the rest of its row.
    SeekNextRow,
    /// Seek to the filter's hint.
    SeekUsingHint,
    /// The current row is complete.
    Done,
    /// Nothing after this cell can match.
    DoneScan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DropDeletes {
    Before,
    In,
    After,
}

/// State machine deciding the fate of each cell of a scan.
pub struct QueryMatcher {
    comparator: CellComparator,
    rows: RowRange,
    is_get: bool,
    start_key: Cell,
    current_row: Option<Bytes>,
    time_range: TimeRange,
    columns: ColumnTracker,
    deletes: DeleteTracker,
    filter: Option<Box<dyn Filter>>,
    sticky_next_row: bool,

    is_user_scan: bool,
    track_deletes: bool,
    keep_deleted_cells: bool,
    retain_deletes_in_output: bool,
    see_past_delete_markers: bool,
    max_read_point: u64,
    earliest_put_ts: i64,
    time_to_purge_deletes_ms: i64,
    now_ms: i64,

    drop_from: Bytes,
    drop_to: Bytes,
    drop_state: Option<DropDeletes>,
}

impl QueryMatcher {
    /// Matcher for `scan` under `info`.
    ///
    /// Takes the filter out of `scan`. `max_read_point` is the newest write
    /// sequence delete markers may be applied from (and versions counted for);
    /// `earliest_put_ts` bounds how long kept delete markers are useful.
    pub fn new(
        scan: &mut Scan,
        info: &ScanInfo,
        scan_type: &ScanType,
        max_read_point: u64,
        earliest_put_ts: i64,
        now_ms: i64,
    ) -> Self {
        let is_user_scan = !scan_type.is_compaction();
        let raw = scan.is_raw();
        let max_versions = if raw {
            scan.get_max_versions()
        } else {
            scan.get_max_versions().min(info.max_versions)
        };
        let requested = if is_user_scan {
            scan.get_columns().iter().cloned().collect()
        } else {
            Vec::new()
        };
        let columns = ColumnTracker::new(
            requested,
            info.min_versions,
            max_versions,
            info.ttl_cutoff(now_ms),
        );

        let keep_deleted_cells = (info.keep_deleted_cells && !is_user_scan) || raw;
        let retain_all = *scan_type == ScanType::CompactionRetainDeletes;
        let (drop_from, drop_to, drop_state) = match scan_type {
            ScanType::CompactionDropDeletes { from_row, to_row } => {
                (from_row.clone(), to_row.clone(), Some(DropDeletes::Before))
            }
            _ => (Bytes::new(), Bytes::new(), None),
        };
        let time_to_purge_deletes_ms =
            i64::try_from(info.time_to_purge_deletes.as_millis()).unwrap_or(i64::MAX);

        Self {
            comparator: info.comparator,
            rows: scan.get_rows().clone(),
            is_get: scan.is_get(),
            start_key: Cell::first_delete_family_on_row(
                scan.get_rows().start_row(),
                info.family.clone(),
            ),
            current_row: None,
            time_range: scan.get_time_range(),
            columns,
            deletes: DeleteTracker::default(),
            filter: scan.take_filter(),
            sticky_next_row: false,
            is_user_scan,
            track_deletes: !keep_deleted_cells && !retain_all,
            keep_deleted_cells,
            retain_deletes_in_output: retain_all || raw || drop_state.is_some(),
            see_past_delete_markers: info.keep_deleted_cells && is_user_scan,
            max_read_point,
            earliest_put_ts,
            time_to_purge_deletes_ms,
            now_ms,
            drop_from,
            drop_to,
            drop_state,
        }
    }

    /// First key every cursor is positioned at.
    pub fn start_key(&self) -> &Cell {
        &self.start_key
    }

    /// Whether `row` lies beyond the scan's stop row.
    pub fn is_past_stop_row(&self, row: &[u8]) -> bool {
        self.rows.is_past_end(row)
    }

    /// Row currently being assembled.
    pub fn current_row(&self) -> Option<&Bytes> {
        self.current_row.as_ref()
    }

    /// Begin a new row; resets every per-row counter.
    pub fn set_row(&mut self, row: Bytes) {
        self.check_partial_drop_delete_range(&row);
        self.deletes.reset();
        self.columns.reset();
        self.sticky_next_row = false;
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
            if filter.filter_row_key(&row) {
                self.sticky_next_row = true;
            }
        }
        self.current_row = Some(row);
    }

    /// Decide what to do with `cell`.
    pub fn match_cell(&mut self, cell: &Cell) -> Result<MatchCode, ScanError> {
        if self
            .filter
            .as_ref()
            .is_some_and(|filter| filter.filter_all_remaining())
        {
            return Ok(MatchCode::DoneScan);
        }
        let Some(row) = self.current_row.as_ref() else {
            return Ok(MatchCode::Done);
        };
        match self.comparator.compare_rows(row, cell.row()) {
            Ordering::Less => {
                return Ok(if self.rows.is_past_end(cell.row()) {
                    MatchCode::DoneScan
                } else {
                    MatchCode::Done
                });
            }
            Ordering::Greater => return Ok(MatchCode::SeekNextRow),
            Ordering::Equal => {}
        }

        if self.sticky_next_row {
            return Ok(MatchCode::SeekNextRow);
        }
        if self.columns.done() {
            self.sticky_next_row = true;
            return Ok(MatchCode::SeekNextRow);
        }

        let timestamp = cell.timestamp();
        let qualifier = cell.qualifier();
        if timestamp == OLDEST_TIMESTAMP
            || cell.kind().is_synthetic()
            || self.columns.is_done(timestamp)
        {
            return Ok(self.columns.next_row_or_next_column(qualifier));
        }

        let invisible = cell.sequence() > self.max_read_point;
        if cell.is_delete() {
            if self.track_deletes {
                let in_range = if self.see_past_delete_markers {
                    self.time_range.within(timestamp)
                } else {
                    self.time_range.within_or_after(timestamp)
                };
                if in_range && !invisible {
                    self.deletes.add(cell);
                }
            }
            let too_young_to_purge = !self.is_user_scan
                && self.time_to_purge_deletes_ms > 0
                && self.now_ms.saturating_sub(timestamp) <= self.time_to_purge_deletes_ms;
            if self.retain_deletes_in_output || too_young_to_purge || invisible {
                if !self.is_user_scan {
                    return Ok(MatchCode::Include);
                }
                // Raw scans go on to the time range and version checks.
            } else if self.keep_deleted_cells {
                if timestamp < self.earliest_put_ts {
                    // Nothing older is left for the marker to shadow.
                    return Ok(self.columns.next_row_or_next_column(qualifier));
                }
            } else {
                return Ok(MatchCode::Skip);
            }
        } else if !self.deletes.is_empty() {
            match self.deletes.is_deleted(cell) {
                DeleteResult::FamilyDeleted | DeleteResult::ColumnDeleted => {
                    return Ok(self.columns.next_row_or_next_column(qualifier));
                }
                DeleteResult::VersionDeleted | DeleteResult::FamilyVersionDeleted => {
                    return Ok(MatchCode::Skip);
                }
                DeleteResult::NotDeleted => {}
            }
        }

        match self.time_range.compare(timestamp) {
            Ordering::Greater => return Ok(MatchCode::Skip),
            Ordering::Less => return Ok(self.columns.next_row_or_next_column(qualifier)),
            Ordering::Equal => {}
        }

        let column = self.columns.check_column(qualifier);
        if column != MatchCode::Include {
            if column == MatchCode::SeekNextRow {
                self.sticky_next_row = true;
            }
            return Ok(column);
        }

        let mut include_and_next_column = false;
        if let Some(filter) = self.filter.as_mut() {
            match filter.filter_cell(cell) {
                FilterCode::Skip => return Ok(MatchCode::Skip),
                FilterCode::NextColumn => {
                    return Ok(self.columns.next_row_or_next_column(qualifier));
                }
                FilterCode::NextRow => {
                    self.sticky_next_row = true;
                    return Ok(MatchCode::SeekNextRow);
                }
                FilterCode::SeekNextUsingHint => return Ok(MatchCode::SeekUsingHint),
                FilterCode::IncludeAndNextColumn => include_and_next_column = true,
                FilterCode::Include => {}
            }
        }

        let versions = self
            .columns
            .check_versions(qualifier, timestamp, cell.kind(), invisible)?;
        if versions == MatchCode::IncludeAndSeekNextRow {
            self.sticky_next_row = true;
        }
        Ok(
            if include_and_next_column && versions == MatchCode::Include {
                MatchCode::IncludeAndSeekNextColumn
            } else {
                versions
            },
        )
    }

    /// Whether rows after `cell`'s row can still be part of the scan.
    pub fn more_rows_may_exist_after(&self, cell: &Cell) -> bool {
        if self.is_get {
            return false;
        }
        match &self.rows.end {
            std::ops::Bound::Unbounded => true,
            std::ops::Bound::Included(stop) | std::ops::Bound::Excluded(stop) => {
                cell.row().as_ref() < stop.as_ref()
            }
        }
    }

    /// Seek key past the rest of `cell`'s column, or to the next requested one.
    pub fn key_for_next_column(&self, cell: &Cell) -> Cell {
        match self.columns.column_hint() {
            Some(column) => Cell::first_on_column(
                cell.row().clone(),
                cell.family().clone(),
                column.clone(),
            ),
            None => cell.last_on_column(),
        }
    }

    /// Seek key past the rest of `cell`'s row.
    pub fn key_for_next_row(&self, cell: &Cell) -> Cell {
        Cell::last_on_row(cell.row().clone())
    }

    /// Filter-supplied seek target after `cell`.
    pub fn next_key_hint(&self, cell: &Cell) -> Option<Cell> {
        self.filter.as_ref()?.next_key_hint(cell)
    }

    /// Apply the filter's transform to an included cell.
    pub fn transform(&mut self, cell: Cell) -> Cell {
        match self.filter.as_mut() {
            Some(filter) => filter.transform(cell),
            None => cell,
        }
    }

    /// Whether the filter vetoes the row that just completed.
    pub fn filter_row(&mut self) -> bool {
        self.filter
            .as_mut()
            .is_some_and(|filter| filter.has_filter_row() && filter.filter_row())
    }

    /// Whether a filter with a row-level veto is attached.
    pub fn has_filter_row(&self) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|filter| filter.has_filter_row())
    }

    // Rows before `drop_from` retain deletes, rows in `[drop_from, drop_to)`
    // drop them, rows from `drop_to` on retain them again.
    fn check_partial_drop_delete_range(&mut self, row: &[u8]) {
        let Some(state) = self.drop_state else {
            return;
        };
        let left = |to: &Bytes| !to.is_empty() && row >= to.as_ref();
        let next = match state {
            DropDeletes::Before if self.drop_from.is_empty() || row >= self.drop_from.as_ref() => {
                if left(&self.drop_to) {
                    DropDeletes::After
                } else {
                    DropDeletes::In
                }
            }
            DropDeletes::In if left(&self.drop_to) => DropDeletes::After,
            other => other,
        };
        self.drop_state = Some(next);
        self.retain_deletes_in_output = next != DropDeletes::In;
    }
}
