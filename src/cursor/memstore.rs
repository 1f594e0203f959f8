use std::{
    cmp::Ordering,
    ops::Bound,
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    },
};

use crossbeam_skiplist::SkipSet;

use super::{Cursor, CursorError};
use crate::cell::{Cell, CellComparator};

/// Skiplist entry ordered by the cell order with newest sequence first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemKey(Cell);

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        CellComparator.compare_with_sequence(&self.0, &other.0)
    }
}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Mutable in-memory buffer of not yet flushed cells.
#[derive(Debug)]
pub struct MemStore {
    cells: SkipSet<MemKey>,
    heap_size: AtomicUsize,
    min_ts: AtomicI64,
    max_ts: AtomicI64,
}

impl Default for MemStore {
    fn default() -> Self {
        Self {
            cells: SkipSet::new(),
            heap_size: AtomicUsize::new(0),
            min_ts: AtomicI64::new(i64::MAX),
            max_ts: AtomicI64::new(i64::MIN),
        }
    }
}

impl MemStore {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Cells with identical key and sequence replace each other.
    pub fn insert(&self, cell: Cell) {
        self.heap_size
            .fetch_add(cell.heap_size(), AtomicOrdering::Relaxed);
        self.min_ts
            .fetch_min(cell.timestamp(), AtomicOrdering::Relaxed);
        self.max_ts
            .fetch_max(cell.timestamp(), AtomicOrdering::Relaxed);
        self.cells.insert(MemKey(cell));
    }

    /// Number of cells buffered.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Approximate payload bytes buffered.
    pub fn heap_size(&self) -> usize {
        self.heap_size.load(AtomicOrdering::Relaxed)
    }

    /// `(min, max)` timestamp buffered, `None` when empty.
    pub fn time_span(&self) -> Option<(i64, i64)> {
        let min = self.min_ts.load(AtomicOrdering::Relaxed);
        let max = self.max_ts.load(AtomicOrdering::Relaxed);
        (min <= max).then_some((min, max))
    }

    /// Every buffered cell in order.
    pub fn cells(&self) -> Vec<Cell> {
        self.cells.iter().map(|entry| entry.value().0.clone()).collect()
    }

    /// Unpositioned cursor seeing cells with sequence `<= read_point`.
    pub fn cursor(self: &Arc<Self>, read_point: u64) -> MemStoreCursor {
        MemStoreCursor {
            store: Arc::clone(self),
            read_point,
            current: None,
            closed: false,
        }
    }
}

/// Cursor over a [`MemStore`] at a fixed read point.
#[derive(Debug)]
pub struct MemStoreCursor {
    store: Arc<MemStore>,
    read_point: u64,
    current: Option<Cell>,
    closed: bool,
}

impl MemStoreCursor {
    fn position(&mut self, lower: Bound<&MemKey>) -> bool {
        let read_point = self.read_point;
        self.current = self
            .store
            .cells
            .range((lower, Bound::Unbounded))
            .map(|entry| entry.value().0.clone())
            .find(|cell| cell.sequence() <= read_point);
        self.current.is_some()
    }

    fn ensure_open(&self) -> Result<(), CursorError> {
        if self.closed {
            return Err(CursorError::Closed);
        }
        Ok(())
    }
}

impl Cursor for MemStoreCursor {
    fn peek(&self) -> Option<&Cell> {
        self.current.as_ref()
    }

    fn next(&mut self) -> Result<Option<Cell>, CursorError> {
        self.ensure_open()?;
        let Some(current) = self.current.take() else {
            return Ok(None);
        };
        let key = MemKey(current);
        self.position(Bound::Excluded(&key));
        Ok(Some(key.0))
    }

    fn seek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.ensure_open()?;
        Ok(self.position(Bound::Included(&MemKey(key.clone()))))
    }

    fn reseek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.ensure_open()?;
        if let Some(current) = &self.current {
            if CellComparator.compare_with_sequence(current, key) != Ordering::Less {
                return Ok(true);
            }
        }
        Ok(self.position(Bound::Included(&MemKey(key.clone()))))
    }

    fn sequence_id(&self) -> u64 {
        u64::MAX
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}
