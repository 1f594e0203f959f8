use std::collections::BTreeSet;

use bytes::Bytes;

use crate::cell::{Cell, CellKind};

/// How a put is shadowed by the delete markers seen so far in its row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeleteResult {
    FamilyDeleted,
    FamilyVersionDeleted,
    ColumnDeleted,
    VersionDeleted,
    NotDeleted,
}

/// Delete markers of the current row.
///
/// Markers arrive before the cells they shadow: family markers lead the row
/// and, within a column, newer timestamps and more specific kinds come first.
#[derive(Debug, Default)]
pub(crate) struct DeleteTracker {
    family_stamp: Option<i64>,
    family_version_stamps: BTreeSet<i64>,
    // Column-level marker of the column currently being walked.
    column_delete: Option<(Bytes, i64, CellKind)>,
}

impl DeleteTracker {
    pub(crate) fn add(&mut self, cell: &Cell) {
        let timestamp = cell.timestamp();
        match cell.kind() {
            CellKind::DeleteFamily => {
                self.family_stamp = Some(self.family_stamp.map_or(timestamp, |s| s.max(timestamp)));
            }
            CellKind::DeleteFamilyVersion => {
                self.family_version_stamps.insert(timestamp);
            }
            kind @ (CellKind::DeleteColumn | CellKind::Delete) => {
                if let Some((qualifier, _, tracked)) = &self.column_delete {
                    // A broader marker for the same column already covers this one.
                    if kind.code() < tracked.code() && qualifier == cell.qualifier() {
                        return;
                    }
                }
                self.column_delete = Some((cell.qualifier().clone(), timestamp, kind));
            }
            _ => {}
        }
    }

    pub(crate) fn is_deleted(&mut self, cell: &Cell) -> DeleteResult {
        let timestamp = cell.timestamp();
        if self.family_stamp.is_some_and(|stamp| timestamp <= stamp) {
            return DeleteResult::FamilyDeleted;
        }
        if self.family_version_stamps.contains(&timestamp) {
            return DeleteResult::FamilyVersionDeleted;
        }
        if let Some((qualifier, stamp, kind)) = &self.column_delete {
            if qualifier == cell.qualifier() {
                if *kind == CellKind::DeleteColumn {
                    return DeleteResult::ColumnDeleted;
                }
                if *stamp == timestamp {
                    return DeleteResult::VersionDeleted;
                }
                // Older than a version delete: nothing more to shadow.
                self.column_delete = None;
            } else if qualifier.as_ref() < cell.qualifier().as_ref() {
                self.column_delete = None;
            }
        }
        DeleteResult::NotDeleted
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.family_stamp.is_none()
            && self.family_version_stamps.is_empty()
            && self.column_delete.is_none()
    }

    pub(crate) fn reset(&mut self) {
        self.family_stamp = None;
        self.family_version_stamps.clear();
        self.column_delete = None;
    }
}
