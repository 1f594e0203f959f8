//! Versioned cells and the total order every cursor yields them in.
//!
//! A [`Cell`] is an immutable `(row, family, qualifier, timestamp, kind)` key
//! plus a value and the write sequence that produced it. Cursors hand cells
//! out by value; payloads live in [`Bytes`] so clones stay cheap while the
//! engine reorders and filters them.

mod comparator;

use std::fmt;

use bytes::Bytes;
pub use comparator::CellComparator;

/// Timestamp used for "newest possible" synthetic keys.
pub const LATEST_TIMESTAMP: i64 = i64::MAX;

/// Timestamp used for "oldest possible" synthetic keys.
pub const OLDEST_TIMESTAMP: i64 = i64::MIN;

/// Cell kind. At equal timestamps kinds sort by descending [`CellKind::code`],
/// so family deletes are seen before column deletes, which are seen before puts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellKind {
    /// Synthetic kind sorting after every real kind; only used in seek keys.
    Minimum = 0,
    /// A value write.
    Put = 4,
    /// Deletes exactly one version of one column.
    Delete = 8,
    /// Deletes one version (timestamp) of every column in the family.
    DeleteFamilyVersion = 10,
    /// Deletes every version of one column at or below its timestamp.
    DeleteColumn = 12,
    /// Deletes every column of the family at or below its timestamp.
    DeleteFamily = 14,
    /// Synthetic kind sorting before every real kind; only used in seek keys.
    Maximum = 255,
}

impl CellKind {
    /// Ordering code of the kind.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether the kind is any delete marker.
    #[inline]
    pub const fn is_delete(self) -> bool {
        matches!(
            self,
            CellKind::Delete
                | CellKind::DeleteFamilyVersion
                | CellKind::DeleteColumn
                | CellKind::DeleteFamily
        )
    }

    /// Whether the kind only appears in synthetic seek keys.
    #[inline]
    pub const fn is_synthetic(self) -> bool {
        matches!(self, CellKind::Minimum | CellKind::Maximum)
    }
}

/// Immutable versioned cell.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    row: Bytes,
    family: Bytes,
    qualifier: Bytes,
    timestamp: i64,
    kind: CellKind,
    sequence: u64,
    value: Bytes,
}

impl Cell {
    /// Build a cell from its parts with sequence zero.
    pub fn new(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        kind: CellKind,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            kind,
            sequence: 0,
            value: value.into(),
        }
    }

    /// A put of `value` into `family:qualifier` at `timestamp`.
    pub fn put(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        value: impl Into<Bytes>,
    ) -> Self {
        Self::new(row, family, qualifier, timestamp, CellKind::Put, value)
    }

    /// A version delete of `family:qualifier` at exactly `timestamp`.
    pub fn delete(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
    ) -> Self {
        Self::new(
            row,
            family,
            qualifier,
            timestamp,
            CellKind::Delete,
            Bytes::new(),
        )
    }

    /// A column delete of every version of `family:qualifier` at or below `timestamp`.
    pub fn delete_column(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
    ) -> Self {
        Self::new(
            row,
            family,
            qualifier,
            timestamp,
            CellKind::DeleteColumn,
            Bytes::new(),
        )
    }

    /// A family delete covering every column at or below `timestamp`.
    pub fn delete_family(row: impl Into<Bytes>, family: impl Into<Bytes>, timestamp: i64) -> Self {
        Self::new(
            row,
            family,
            Bytes::new(),
            timestamp,
            CellKind::DeleteFamily,
            Bytes::new(),
        )
    }

    /// A family version delete covering every column at exactly `timestamp`.
    pub fn delete_family_version(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        timestamp: i64,
    ) -> Self {
        Self::new(
            row,
            family,
            Bytes::new(),
            timestamp,
            CellKind::DeleteFamilyVersion,
            Bytes::new(),
        )
    }

    /// Return the cell stamped with write sequence `sequence`.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Row key.
    #[inline]
    pub fn row(&self) -> &Bytes {
        &self.row
    }

    /// Column family.
    #[inline]
    pub fn family(&self) -> &Bytes {
        &self.family
    }

    /// Column qualifier.
    #[inline]
    pub fn qualifier(&self) -> &Bytes {
        &self.qualifier
    }

    /// Version timestamp.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Cell kind.
    #[inline]
    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Write sequence that produced the cell.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Value payload (empty for delete markers).
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Replace the value, keeping the key.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    /// Whether the cell is a delete marker of any granularity.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.kind.is_delete()
    }

    /// Whether the cell is the "last on row" synthetic key.
    #[inline]
    pub fn is_last_on_row(&self) -> bool {
        self.kind == CellKind::Minimum && self.family.is_empty() && self.qualifier.is_empty()
    }

    fn synthetic(
        row: Bytes,
        family: Bytes,
        qualifier: Bytes,
        timestamp: i64,
        kind: CellKind,
    ) -> Self {
        Self {
            row,
            family,
            qualifier,
            timestamp,
            kind,
            sequence: u64::MAX,
            value: Bytes::new(),
        }
    }

    /// Smallest possible key of `row`.
    pub fn first_on_row(row: impl Into<Bytes>) -> Self {
        Self::synthetic(
            row.into(),
            Bytes::new(),
            Bytes::new(),
            LATEST_TIMESTAMP,
            CellKind::Maximum,
        )
    }

    /// Key sorting after every real cell of `row`.
    pub fn last_on_row(row: impl Into<Bytes>) -> Self {
        Self::synthetic(
            row.into(),
            Bytes::new(),
            Bytes::new(),
            LATEST_TIMESTAMP,
            CellKind::Minimum,
        )
    }

    /// Smallest possible key of `row/family:qualifier`.
    pub fn first_on_column(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
    ) -> Self {
        Self::synthetic(
            row.into(),
            family.into(),
            qualifier.into(),
            LATEST_TIMESTAMP,
            CellKind::Maximum,
        )
    }

    /// Key that sorts first in a row: a family delete at the latest timestamp.
    pub fn first_delete_family_on_row(row: impl Into<Bytes>, family: impl Into<Bytes>) -> Self {
        Self::synthetic(
            row.into(),
            family.into(),
            Bytes::new(),
            LATEST_TIMESTAMP,
            CellKind::DeleteFamily,
        )
    }

    /// Largest possible key of this cell's column.
    pub fn last_on_column(&self) -> Self {
        Self::synthetic(
            self.row.clone(),
            self.family.clone(),
            self.qualifier.clone(),
            OLDEST_TIMESTAMP,
            CellKind::Minimum,
        )
    }

    /// Smallest key of this cell's column at `timestamp`.
    pub fn first_on_column_at(&self, timestamp: i64) -> Self {
        Self::synthetic(
            self.row.clone(),
            self.family.clone(),
            self.qualifier.clone(),
            timestamp,
            CellKind::Maximum,
        )
    }

    /// Approximate heap footprint of the payloads.
    pub fn heap_size(&self) -> usize {
        self.row.len() + self.family.len() + self.qualifier.len() + self.value.len()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}/{}/{:?}/seq={}",
            self.row.escape_ascii(),
            self.family.escape_ascii(),
            self.qualifier.escape_ascii(),
            self.timestamp,
            self.kind,
            self.sequence
        )
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
