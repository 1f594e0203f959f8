//! Row ranges shared by queries, stores, and segment eligibility checks.

use std::ops::Bound;

use bytes::Bytes;

/// A row range with owned bounds.
///
/// User scans use an inclusive start and exclusive stop; point gets use an
/// inclusive stop on the same row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowRange {
    /// Start bound (inclusive/exclusive/unbounded).
    pub start: Bound<Bytes>,
    /// End bound (inclusive/exclusive/unbounded).
    pub end: Bound<Bytes>,
}

impl RowRange {
    /// Create an unbounded range (all rows).
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Create a new range from explicit bounds.
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// `[start, stop)`, where an empty row means unbounded on that side.
    pub fn half_open(start: impl Into<Bytes>, stop: impl Into<Bytes>) -> Self {
        let start = start.into();
        let stop = stop.into();
        Self {
            start: if start.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Included(start)
            },
            end: if stop.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Excluded(stop)
            },
        }
    }

    /// Exactly one row.
    pub fn single(row: impl Into<Bytes>) -> Self {
        let row = row.into();
        Self {
            start: Bound::Included(row.clone()),
            end: Bound::Included(row),
        }
    }

    /// Smallest row the range may contain; empty when unbounded.
    pub fn start_row(&self) -> Bytes {
        match &self.start {
            Bound::Included(row) | Bound::Excluded(row) => row.clone(),
            Bound::Unbounded => Bytes::new(),
        }
    }

    /// Whether this range contains `row`.
    pub fn contains(&self, row: &[u8]) -> bool {
        let start_ok = match &self.start {
            Bound::Unbounded => true,
            Bound::Included(bound) => row >= bound.as_ref(),
            Bound::Excluded(bound) => row > bound.as_ref(),
        };
        start_ok && !self.is_past_end(row)
    }

    /// Whether `row` and every row after it fall beyond the end bound.
    pub fn is_past_end(&self, row: &[u8]) -> bool {
        match &self.end {
            Bound::Unbounded => false,
            Bound::Included(bound) => row > bound.as_ref(),
            Bound::Excluded(bound) => row >= bound.as_ref(),
        }
    }

    /// Whether the range shares at least one row with `[first, last]`.
    pub fn overlaps(&self, first: &[u8], last: &[u8]) -> bool {
        let before_start = match &self.start {
            Bound::Unbounded => false,
            Bound::Included(bound) => last < bound.as_ref(),
            Bound::Excluded(bound) => last <= bound.as_ref(),
        };
        !before_start && !self.is_past_end(first)
    }

    /// Whether the range addresses exactly one row.
    pub fn is_single_row(&self) -> bool {
        matches!(
            (&self.start, &self.end),
            (Bound::Included(start), Bound::Included(end)) if start == end
        )
    }
}

impl Default for RowRange {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_excludes_stop_row() {
        let range = RowRange::half_open("row2", "row4");
        assert!(!range.contains(b"row1"));
        assert!(range.contains(b"row2"));
        assert!(range.contains(b"row3"));
        assert!(!range.contains(b"row4"));
        assert!(range.is_past_end(b"row4"));
        assert!(!range.is_past_end(b"row3"));
    }

    #[test]
    fn empty_bounds_are_unbounded() {
        let range = RowRange::half_open("", "");
        assert_eq!(range, RowRange::all());
        assert!(range.contains(b""));
        assert!(range.contains(b"zzz"));
    }

    #[test]
    fn single_row_is_inclusive() {
        let range = RowRange::single("r");
        assert!(range.is_single_row());
        assert!(range.contains(b"r"));
        assert!(!range.is_past_end(b"r"));
        assert!(range.is_past_end(b"r\0"));
    }

    #[test]
    fn overlap_checks_segment_bounds() {
        let range = RowRange::half_open("m", "p");
        assert!(range.overlaps(b"a", b"m"));
        assert!(range.overlaps(b"n", b"z"));
        assert!(!range.overlaps(b"a", b"l"));
        assert!(!range.overlaps(b"p", b"z"));
    }
}
