use std::cmp::Ordering;

use super::Cell;

/// Authoritative total order over cells.
///
/// Row ascending, then family, then qualifier, then timestamp descending
/// (newest first), then kind by descending code. A "last on row" key sorts
/// after every real cell of its row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellComparator;

impl CellComparator {
    /// Compare two cells by the total order.
    pub fn compare(&self, left: &Cell, right: &Cell) -> Ordering {
        let rows = self.compare_rows(left.row(), right.row());
        if rows != Ordering::Equal {
            return rows;
        }
        match (left.is_last_on_row(), right.is_last_on_row()) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        left.family()
            .cmp(right.family())
            .then_with(|| left.qualifier().cmp(right.qualifier()))
            .then_with(|| right.timestamp().cmp(&left.timestamp()))
            .then_with(|| right.kind().code().cmp(&left.kind().code()))
    }

    /// Compare by the total order, breaking key ties by newest write sequence first.
    pub fn compare_with_sequence(&self, left: &Cell, right: &Cell) -> Ordering {
        self.compare(left, right)
            .then_with(|| right.sequence().cmp(&left.sequence()))
    }

    /// Byte-wise row comparison.
    #[inline]
    pub fn compare_rows(&self, left: &[u8], right: &[u8]) -> Ordering {
        left.cmp(right)
    }

    /// Whether both cells belong to the same row.
    #[inline]
    pub fn matching_rows(&self, left: &Cell, right: &Cell) -> bool {
        left.row() == right.row()
    }
}
