use std::cmp::Ordering;

use bytes::Bytes;

use super::MatchCode;
use crate::{cell::CellKind, error::ScanError};

/// Per-row column and version bookkeeping.
#[derive(Debug)]
pub(crate) enum ColumnTracker {
    Explicit(ExplicitColumnTracker),
    Wildcard(WildcardColumnTracker),
}

impl ColumnTracker {
    pub(crate) fn new(
        columns: impl IntoIterator<Item = Bytes>,
        min_versions: usize,
        max_versions: usize,
        oldest_stamp: i64,
    ) -> Self {
        let columns: Vec<Bytes> = columns.into_iter().collect();
        if columns.is_empty() {
            ColumnTracker::Wildcard(WildcardColumnTracker {
                column: None,
                count: 0,
                previous: None,
                min_versions,
                max_versions,
                oldest_stamp,
            })
        } else {
            ColumnTracker::Explicit(ExplicitColumnTracker {
                columns,
                index: 0,
                count: 0,
                previous_ts: None,
                min_versions,
                max_versions,
                oldest_stamp,
            })
        }
    }

    /// Whether `qualifier` is wanted at all.
    pub(crate) fn check_column(&mut self, qualifier: &[u8]) -> MatchCode {
        match self {
            ColumnTracker::Explicit(tracker) => tracker.check_column(qualifier),
            ColumnTracker::Wildcard(_) => MatchCode::Include,
        }
    }

    /// Count one more version of `qualifier`. `ignore_count` admits the cell
    /// without counting it.
    pub(crate) fn check_versions(
        &mut self,
        qualifier: &Bytes,
        timestamp: i64,
        kind: CellKind,
        ignore_count: bool,
    ) -> Result<MatchCode, ScanError> {
        match self {
            ColumnTracker::Explicit(tracker) => {
                Ok(tracker.check_versions(timestamp, ignore_count))
            }
            ColumnTracker::Wildcard(tracker) => {
                tracker.check_versions(qualifier, timestamp, kind, ignore_count)
            }
        }
    }

    /// The rest of `qualifier` is of no interest.
    pub(crate) fn next_row_or_next_column(&mut self, qualifier: &[u8]) -> MatchCode {
        match self {
            ColumnTracker::Explicit(tracker) => {
                tracker.done_with_column(qualifier);
                if tracker.column_hint().is_some() {
                    MatchCode::SeekNextColumn
                } else {
                    MatchCode::SeekNextRow
                }
            }
            ColumnTracker::Wildcard(_) => MatchCode::SeekNextColumn,
        }
    }

    /// Next requested column, if any.
    pub(crate) fn column_hint(&self) -> Option<&Bytes> {
        match self {
            ColumnTracker::Explicit(tracker) => tracker.column_hint(),
            ColumnTracker::Wildcard(_) => None,
        }
    }

    /// Nothing else in this row can match.
    pub(crate) fn done(&self) -> bool {
        match self {
            ColumnTracker::Explicit(tracker) => tracker.column_hint().is_none(),
            ColumnTracker::Wildcard(_) => false,
        }
    }

    /// Early out by timestamp alone: expired and no minimum to keep.
    pub(crate) fn is_done(&self, timestamp: i64) -> bool {
        let (min_versions, oldest_stamp) = match self {
            ColumnTracker::Explicit(t) => (t.min_versions, t.oldest_stamp),
            ColumnTracker::Wildcard(t) => (t.min_versions, t.oldest_stamp),
        };
        min_versions == 0 && timestamp < oldest_stamp
    }

    pub(crate) fn reset(&mut self) {
        match self {
            ColumnTracker::Explicit(tracker) => {
                tracker.index = 0;
                tracker.count = 0;
                tracker.previous_ts = None;
            }
            ColumnTracker::Wildcard(tracker) => {
                tracker.column = None;
                tracker.count = 0;
                tracker.previous = None;
            }
        }
    }
}

/// Tracks a sorted set of requested qualifiers.
#[derive(Debug)]
pub(crate) struct ExplicitColumnTracker {
    columns: Vec<Bytes>,
    index: usize,
    count: usize,
    previous_ts: Option<i64>,
    min_versions: usize,
    max_versions: usize,
    oldest_stamp: i64,
}

impl ExplicitColumnTracker {
    fn column_hint(&self) -> Option<&Bytes> {
        self.columns.get(self.index)
    }

    fn advance(&mut self) {
        self.index += 1;
        self.count = 0;
        self.previous_ts = None;
    }

    fn check_column(&mut self, qualifier: &[u8]) -> MatchCode {
        loop {
            let Some(column) = self.columns.get(self.index) else {
                return MatchCode::SeekNextRow;
            };
            match column.as_ref().cmp(qualifier) {
                Ordering::Equal => return MatchCode::Include,
                // Not requested; seek to the requested column ahead.
                Ordering::Greater => {
                    self.previous_ts = None;
                    return MatchCode::SeekNextColumn;
                }
                // The requested column has no (more) data in this row.
                Ordering::Less => self.advance(),
            }
        }
    }

    fn check_versions(&mut self, timestamp: i64, ignore_count: bool) -> MatchCode {
        if ignore_count {
            return MatchCode::Include;
        }
        if self.previous_ts == Some(timestamp) {
            return MatchCode::Skip;
        }
        self.count += 1;
        let expired = timestamp < self.oldest_stamp;
        if self.count >= self.max_versions || (self.count >= self.min_versions && expired) {
            self.advance();
            return if self.column_hint().is_none() {
                MatchCode::IncludeAndSeekNextRow
            } else {
                MatchCode::IncludeAndSeekNextColumn
            };
        }
        self.previous_ts = Some(timestamp);
        MatchCode::Include
    }

    fn done_with_column(&mut self, qualifier: &[u8]) {
        while let Some(column) = self.columns.get(self.index) {
            match column.as_ref().cmp(qualifier) {
                Ordering::Equal => {
                    self.advance();
                    return;
                }
                Ordering::Less => self.advance(),
                Ordering::Greater => {
                    self.previous_ts = None;
                    return;
                }
            }
        }
    }
}

/// Tracks every column of the family in the order cells arrive.
#[derive(Debug)]
pub(crate) struct WildcardColumnTracker {
    column: Option<Bytes>,
    count: usize,
    previous: Option<(i64, CellKind)>,
    min_versions: usize,
    max_versions: usize,
    oldest_stamp: i64,
}

impl WildcardColumnTracker {
    fn check_versions(
        &mut self,
        qualifier: &Bytes,
        timestamp: i64,
        kind: CellKind,
        ignore_count: bool,
    ) -> Result<MatchCode, ScanError> {
        let order = self
            .column
            .as_ref()
            .map(|column| qualifier.as_ref().cmp(column.as_ref()));
        match order {
            Some(Ordering::Equal) => {
                if ignore_count {
                    return Ok(MatchCode::Include);
                }
                if self.previous == Some((timestamp, kind)) {
                    return Ok(MatchCode::Skip);
                }
            }
            None | Some(Ordering::Greater) => {
                self.column = Some(qualifier.clone());
                self.count = 0;
                self.previous = None;
                if ignore_count {
                    return Ok(MatchCode::Include);
                }
            }
            Some(Ordering::Less) => {
                return Err(ScanError::ColumnOrder {
                    previous: self
                        .column
                        .as_ref()
                        .map(|c| c.escape_ascii().to_string())
                        .unwrap_or_default(),
                    current: qualifier.escape_ascii().to_string(),
                });
            }
        }
        Ok(self.check_version(timestamp, kind))
    }

    fn check_version(&mut self, timestamp: i64, kind: CellKind) -> MatchCode {
        if !kind.is_delete() {
            self.count += 1;
        }
        if self.count > self.max_versions {
            return MatchCode::SeekNextColumn;
        }
        if self.count <= self.min_versions || timestamp >= self.oldest_stamp {
            self.previous = Some((timestamp, kind));
            MatchCode::Include
        } else {
            MatchCode::SeekNextColumn
        }
    }
}
