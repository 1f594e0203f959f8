//! Sorted cursors over one source of cells each.
//!
//! [`Cursor`] is the only capability the merge path depends on. Two concrete
//! sources ship with the crate: the mutable [`MemStore`] buffer and immutable
//! flushed [`Segment`]s.

pub(crate) mod bloom;
mod memstore;
mod segment;

pub use memstore::{MemStore, MemStoreCursor};
pub use segment::{Segment, SegmentBuilder, SegmentCursor};

pub use crate::error::CursorError;
use crate::cell::Cell;

/// Forward-only cursor over a strictly sorted stream of cells.
///
/// A freshly created cursor is unpositioned and [`peek`](Cursor::peek) returns
/// `None` until it is seeked.
pub trait Cursor: Send {
    /// Current cell without consuming it.
    fn peek(&self) -> Option<&Cell>;

    /// Consume and return the current cell, advancing to the next one.
    fn next(&mut self) -> Result<Option<Cell>, CursorError>;

    /// Position at the first cell `>= key`. Returns whether such a cell exists.
    fn seek(&mut self, key: &Cell) -> Result<bool, CursorError>;

    /// Like [`seek`](Cursor::seek), but `key` is known to be at or after the
    /// current position, so the cursor may move forward from where it is.
    fn reseek(&mut self, key: &Cell) -> Result<bool, CursorError>;

    /// Lazy seek: position on a key no greater than the real next cell and
    /// defer the actual work until [`enforce_seek`](Cursor::enforce_seek).
    ///
    /// `forward` selects reseek over seek; `use_bloom` lets the cursor consult
    /// a row-column bloom when the key is on a single qualifier.
    fn request_seek(
        &mut self,
        key: &Cell,
        forward: bool,
        _use_bloom: bool,
    ) -> Result<bool, CursorError> {
        if forward {
            self.reseek(key)
        } else {
            self.seek(key)
        }
    }

    /// Whether the peeked cell is real rather than a placeholder from
    /// [`request_seek`](Cursor::request_seek).
    fn real_seek_done(&self) -> bool {
        true
    }

    /// Perform a seek deferred by [`request_seek`](Cursor::request_seek).
    fn enforce_seek(&mut self) -> Result<(), CursorError> {
        Ok(())
    }

    /// Freshness of the source. Higher wins ties between equal cells; the
    /// memory buffer reports `u64::MAX`.
    fn sequence_id(&self) -> u64;

    /// Whether the cursor reads a flushed segment.
    fn is_file_cursor(&self) -> bool {
        false
    }

    /// Release the cursor. Called exactly once by its owner.
    fn close(&mut self) {}
}
