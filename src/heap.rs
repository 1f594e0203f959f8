//! N-way merge over sorted cursors.
//!
//! [`MergeHeap`] keeps its cursors in an arena and orders arena indices in a
//! hand-rolled binary heap. The cursor holding the globally smallest cell is
//! kept outside the heap as `current`; advancing it either keeps it there,
//! re-inserts it, or closes it for good once exhausted.

use std::cmp::Ordering;

use crate::{
    cell::{Cell, CellComparator},
    cursor::{Cursor, CursorError},
};

/// Merges cursors into one ordered stream.
///
/// Equal cells from different cursors are ordered by descending
/// [`Cursor::sequence_id`], so the freshest copy is seen first.
pub struct MergeHeap {
    slots: Vec<Option<Box<dyn Cursor>>>,
    heap: Vec<usize>,
    current: Option<usize>,
    comparator: CellComparator,
}

impl MergeHeap {
    /// Build a heap over already positioned cursors.
    ///
    /// Cursors with nothing to offer are closed right away.
    pub fn new(
        cursors: Vec<Box<dyn Cursor>>,
        comparator: CellComparator,
    ) -> Result<Self, CursorError> {
        let mut heap = Self {
            slots: cursors.into_iter().map(Some).collect(),
            heap: Vec::new(),
            current: None,
            comparator,
        };
        for slot in 0..heap.slots.len() {
            if heap.top_cell(slot).is_some() {
                heap.push(slot);
            } else {
                heap.close_slot(slot);
            }
        }
        heap.current = heap.poll_real()?;
        Ok(heap)
    }

    /// Smallest cell across every cursor.
    pub fn peek(&self) -> Option<&Cell> {
        self.current.and_then(|slot| self.top_cell(slot))
    }

    /// Consume the smallest cell.
    pub fn next(&mut self) -> Result<Option<Cell>, CursorError> {
        let Some(current) = self.current else {
            return Ok(None);
        };
        let Some(cursor) = self.cursor_mut(current) else {
            self.current = None;
            return Ok(None);
        };
        let cell = cursor.next()?;
        if cursor.peek().is_none() {
            self.close_slot(current);
            self.current = self.poll_real()?;
        } else if let Some(&top) = self.heap.first() {
            if self.order(current, top) != Ordering::Less {
                self.push(current);
                self.current = self.poll_real()?;
            }
        }
        Ok(cell)
    }

    /// Position every cursor at the first cell `>= key`.
    pub fn seek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.generalized_seek(false, key, false, false)
    }

    /// Forward-only [`seek`](MergeHeap::seek).
    pub fn reseek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.generalized_seek(false, key, true, false)
    }

    /// Lazy seek: cursors other than the last one only request their seek and
    /// are really positioned when they would become the top.
    pub fn request_seek(
        &mut self,
        key: &Cell,
        forward: bool,
        use_bloom: bool,
    ) -> Result<bool, CursorError> {
        self.generalized_seek(true, key, forward, use_bloom)
    }

    /// Close every cursor still held. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.heap.clear();
        self.current = None;
        for slot in 0..self.slots.len() {
            self.close_slot(slot);
        }
    }

    fn generalized_seek(
        &mut self,
        lazy: bool,
        key: &Cell,
        forward: bool,
        use_bloom: bool,
    ) -> Result<bool, CursorError> {
        let Some(current) = self.current.take() else {
            return Ok(false);
        };
        self.push(current);

        while let Some(slot) = self.pop() {
            let Some(top) = self.top_cell(slot) else {
                self.close_slot(slot);
                continue;
            };
            if self.comparator.compare(key, top) != Ordering::Greater {
                // Everything left is already at or past the key.
                self.push(slot);
                self.current = self.poll_real()?;
                return Ok(self.current.is_some());
            }

            let lazy_here = lazy && !self.heap.is_empty();
            let Some(cursor) = self.cursor_mut(slot) else {
                continue;
            };
            let found = if lazy_here {
                cursor.request_seek(key, forward, use_bloom)?
            } else if forward {
                cursor.reseek(key)?
            } else {
                cursor.seek(key)?
            };
            if found && cursor.peek().is_some() {
                self.push(slot);
            } else {
                self.close_slot(slot);
            }
        }
        Ok(false)
    }

    /// Pop cursors until one whose top is a real cell is found, enforcing
    /// deferred seeks on the way.
    fn poll_real(&mut self) -> Result<Option<usize>, CursorError> {
        while let Some(slot) = self.pop() {
            let Some(cursor) = self.cursor_mut(slot) else {
                continue;
            };
            if cursor.real_seek_done() {
                return Ok(Some(slot));
            }
            if cursor.peek().is_none() {
                self.close_slot(slot);
                continue;
            }
            cursor.enforce_seek()?;
            if cursor.peek().is_none() {
                self.close_slot(slot);
                continue;
            }
            match self.heap.first() {
                None => return Ok(Some(slot)),
                Some(&next) if self.order(slot, next) == Ordering::Less => {
                    return Ok(Some(slot));
                }
                Some(_) => self.push(slot),
            }
        }
        Ok(None)
    }

    fn top_cell(&self, slot: usize) -> Option<&Cell> {
        self.slots.get(slot)?.as_deref()?.peek()
    }

    fn cursor_mut(&mut self, slot: usize) -> Option<&mut (dyn Cursor + 'static)> {
        self.slots.get_mut(slot)?.as_deref_mut()
    }

    fn sequence_id(&self, slot: usize) -> u64 {
        self.slots
            .get(slot)
            .and_then(|cursor| cursor.as_deref())
            .map_or(0, |cursor| cursor.sequence_id())
    }

    fn close_slot(&mut self, slot: usize) {
        if let Some(mut cursor) = self.slots.get_mut(slot).and_then(Option::take) {
            cursor.close();
        }
    }

    /// Cell order, then freshest cursor first. Exhausted cursors sort last.
    fn order(&self, a: usize, b: usize) -> Ordering {
        match (self.top_cell(a), self.top_cell(b)) {
            (Some(left), Some(right)) => self
                .comparator
                .compare(left, right)
                .then_with(|| self.sequence_id(b).cmp(&self.sequence_id(a))),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn push(&mut self, slot: usize) {
        self.heap.push(slot);
        let mut child = self.heap.len() - 1;
        while child > 0 {
            let parent = (child - 1) / 2;
            if self.order(self.heap[child], self.heap[parent]) != Ordering::Less {
                break;
            }
            self.heap.swap(child, parent);
            child = parent;
        }
    }

    fn pop(&mut self) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        let len = self.heap.len();
        let mut parent = 0;
        loop {
            let left = 2 * parent + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smallest = if right < len
                && self.order(self.heap[right], self.heap[left]) == Ordering::Less
            {
                right
            } else {
                left
            };
            if self.order(self.heap[smallest], self.heap[parent]) != Ordering::Less {
                break;
            }
            self.heap.swap(parent, smallest);
            parent = smallest;
        }
        Some(top)
    }
}

impl Drop for MergeHeap {
    fn drop(&mut self) {
        self.close();
    }
}
