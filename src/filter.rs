//! Caller-supplied filtering contract.
//!
//! The engine only invokes filters; implementations live with the caller.

use crate::cell::Cell;

/// Verdict returned by [`Filter::filter_cell`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterCode {
    /// Include the cell.
    Include,
    /// Include the cell and move on to the next column.
    IncludeAndNextColumn,
    /// Skip this cell.
    Skip,
    /// Skip the rest of this column.
    NextColumn,
    /// Skip the rest of this row.
    NextRow,
    /// Seek to [`Filter::next_key_hint`].
    SeekNextUsingHint,
}

/// Stateful per-scan filter.
///
/// Methods are called from the scanning thread only, in this order per row:
/// [`reset`](Filter::reset), [`filter_row_key`](Filter::filter_row_key), then
/// [`filter_cell`](Filter::filter_cell) / [`transform`](Filter::transform) per
/// surviving cell, then [`filter_row`](Filter::filter_row) once the row is complete.
pub trait Filter: Send {
    /// Clear per-row state.
    fn reset(&mut self) {}

    /// True once nothing after the current position can pass; ends the scan.
    fn filter_all_remaining(&self) -> bool {
        false
    }

    /// True to drop the whole row before looking at any of its cells.
    fn filter_row_key(&mut self, _row: &[u8]) -> bool {
        false
    }

    /// Decide on a cell that passed version, delete, and time-range checks.
    fn filter_cell(&mut self, _cell: &Cell) -> FilterCode {
        FilterCode::Include
    }

    /// Rewrite an included cell before it is returned.
    fn transform(&mut self, cell: Cell) -> Cell {
        cell
    }

    /// Whether [`filter_row`](Filter::filter_row) does anything.
    fn has_filter_row(&self) -> bool {
        false
    }

    /// True to discard the cells gathered for the row that just completed.
    fn filter_row(&mut self) -> bool {
        false
    }

    /// Next key worth looking at after `cell`, when [`FilterCode::SeekNextUsingHint`] is used.
    fn next_key_hint(&self, _cell: &Cell) -> Option<Cell> {
        None
    }
}
