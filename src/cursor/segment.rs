use std::{cmp::Ordering, sync::Arc};

use bytes::Bytes;
use ulid::Ulid;

use super::{
    bloom::{row_col_key, SegmentBloom},
    Cursor, CursorError,
};
use crate::{
    cell::{Cell, CellComparator},
    store::CursorQuery,
};

/// Immutable, sorted container of flushed cells.
#[derive(Debug)]
pub struct Segment {
    id: Ulid,
    sequence_id: u64,
    cells: Vec<Cell>,
    min_ts: i64,
    max_ts: i64,
    row_bloom: SegmentBloom,
    row_col_bloom: SegmentBloom,
}

/// Collects cells for a [`Segment`]; order of insertion does not matter.
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    sequence_id: u64,
    cells: Vec<Cell>,
}

impl SegmentBuilder {
    /// Builder for a segment whose freshness rank is `sequence_id`.
    pub fn new(sequence_id: u64) -> Self {
        Self {
            sequence_id,
            cells: Vec::new(),
        }
    }

    /// Add one cell.
    pub fn push(&mut self, cell: Cell) -> &mut Self {
        self.cells.push(cell);
        self
    }

    /// Add many cells.
    pub fn extend(&mut self, cells: impl IntoIterator<Item = Cell>) -> &mut Self {
        self.cells.extend(cells);
        self
    }

    /// Sort the cells and compute the segment's statistics and blooms.
    pub fn build(self) -> Segment {
        let mut cells = self.cells;
        cells.sort_by(|a, b| CellComparator.compare_with_sequence(a, b));

        let (min_ts, max_ts) = cells
            .iter()
            .fold((i64::MAX, i64::MIN), |(lo, hi), cell| {
                (lo.min(cell.timestamp()), hi.max(cell.timestamp()))
            });
        let mut rows: Vec<&[u8]> = cells.iter().map(|c| c.row().as_ref()).collect();
        rows.dedup();
        let row_bloom = SegmentBloom::from_keys(rows);
        let row_col_bloom =
            SegmentBloom::from_keys(cells.iter().map(|c| row_col_key(c.row(), c.qualifier())));

        Segment {
            id: Ulid::new(),
            sequence_id: self.sequence_id,
            cells,
            min_ts,
            max_ts,
            row_bloom,
            row_col_bloom,
        }
    }
}

impl Segment {
    /// Build a segment from `cells` in any order.
    pub fn from_cells(sequence_id: u64, cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut builder = SegmentBuilder::new(sequence_id);
        builder.extend(cells);
        builder.build()
    }

    /// Unique id of the segment.
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Freshness rank; newer segments carry larger values.
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the segment holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Largest timestamp stored.
    pub fn max_timestamp(&self) -> i64 {
        self.max_ts
    }

    /// Smallest timestamp stored.
    pub fn min_timestamp(&self) -> i64 {
        self.min_ts
    }

    /// First row stored.
    pub fn first_row(&self) -> Option<&Bytes> {
        self.cells.first().map(Cell::row)
    }

    /// Last row stored.
    pub fn last_row(&self) -> Option<&Bytes> {
        self.cells.last().map(Cell::row)
    }

    /// Whether a scan described by `query` could find anything in this segment.
    pub fn should_use(&self, query: &CursorQuery) -> bool {
        let (Some(first), Some(last)) = (self.first_row(), self.last_row()) else {
            return false;
        };
        if !query.rows.overlaps(first, last) {
            return false;
        }
        if !query.time_range.overlaps(self.min_ts, self.max_ts) {
            return false;
        }
        if self.max_ts < query.expired_cutoff {
            return false;
        }
        if query.is_get {
            return self.row_bloom.may_contain(&query.rows.start_row());
        }
        true
    }

    /// Unpositioned cursor over the segment.
    pub fn cursor(self: &Arc<Self>) -> SegmentCursor {
        SegmentCursor {
            segment: Arc::clone(self),
            pos: 0,
            current: None,
            fake: false,
            delayed: None,
            closed: false,
        }
    }
}

/// Cursor over one [`Segment`], with lazy seek support.
#[derive(Debug)]
pub struct SegmentCursor {
    segment: Arc<Segment>,
    pos: usize,
    current: Option<Cell>,
    // `current` is a placeholder key, not a stored cell.
    fake: bool,
    // (key, forward) of a seek deferred by `request_seek`.
    delayed: Option<(Cell, bool)>,
    closed: bool,
}

impl SegmentCursor {
    fn lower_bound(&self, from: usize, key: &Cell) -> usize {
        from + self.segment.cells[from..]
            .partition_point(|cell| CellComparator.compare_with_sequence(cell, key) == Ordering::Less)
    }

    fn upper_bound(&self, from: usize, key: &Cell) -> usize {
        from + self.segment.cells[from..].partition_point(|cell| {
            CellComparator.compare_with_sequence(cell, key) != Ordering::Greater
        })
    }

    fn settle(&mut self, pos: usize) -> bool {
        self.pos = pos;
        self.fake = false;
        self.delayed = None;
        self.current = self.segment.cells.get(pos).cloned();
        self.current.is_some()
    }

    fn real_position(&self) -> Option<usize> {
        (!self.fake && self.current.is_some()).then_some(self.pos)
    }

    fn ensure_open(&self) -> Result<(), CursorError> {
        if self.closed {
            return Err(CursorError::Closed);
        }
        Ok(())
    }
}

impl Cursor for SegmentCursor {
    fn peek(&self) -> Option<&Cell> {
        self.current.as_ref()
    }

    fn next(&mut self) -> Result<Option<Cell>, CursorError> {
        self.ensure_open()?;
        self.enforce_seek()?;
        let Some(current) = self.current.take() else {
            return Ok(None);
        };
        let next = if self.fake {
            self.upper_bound(0, &current)
        } else {
            self.pos + 1
        };
        self.settle(next);
        Ok(Some(current))
    }

    fn seek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.ensure_open()?;
        let pos = self.lower_bound(0, key);
        Ok(self.settle(pos))
    }

    fn reseek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.ensure_open()?;
        let from = match self.real_position() {
            Some(pos) => {
                let current = &self.segment.cells[pos];
                if CellComparator.compare_with_sequence(current, key) != Ordering::Less {
                    self.delayed = None;
                    return Ok(true);
                }
                pos
            }
            None => 0,
        };
        let pos = self.lower_bound(from, key);
        Ok(self.settle(pos))
    }

    fn request_seek(
        &mut self,
        key: &Cell,
        forward: bool,
        use_bloom: bool,
    ) -> Result<bool, CursorError> {
        self.ensure_open()?;
        let use_bloom = use_bloom && !key.family().is_empty();
        let may_contain = !use_bloom
            || self
                .segment
                .row_col_bloom
                .may_contain(&row_col_key(key.row(), key.qualifier()));

        if !may_contain {
            // Nothing for this column here: park after it and let the merge
            // move on without touching the segment.
            self.current = Some(key.last_on_column());
            self.fake = true;
            self.delayed = None;
            return Ok(true);
        }
        // A placeholder at the segment's newest timestamp sorts at or after
        // the key, except for a key past the end of its row.
        if key.timestamp() > self.segment.max_ts && !key.is_last_on_row() {
            self.current = Some(key.first_on_column_at(self.segment.max_ts));
            self.fake = true;
            self.delayed = Some((key.clone(), forward));
            return Ok(true);
        }
        if forward {
            self.reseek(key)
        } else {
            self.seek(key)
        }
    }

    fn real_seek_done(&self) -> bool {
        self.delayed.is_none()
    }

    fn enforce_seek(&mut self) -> Result<(), CursorError> {
        let Some((key, forward)) = self.delayed.take() else {
            return Ok(());
        };
        if forward {
            self.reseek(&key)?;
        } else {
            self.seek(&key)?;
        }
        Ok(())
    }

    fn sequence_id(&self) -> u64 {
        self.segment.sequence_id
    }

    fn is_file_cursor(&self) -> bool {
        true
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
        self.delayed = None;
    }
}
