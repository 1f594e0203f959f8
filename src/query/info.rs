use std::time::Duration;

use bytes::Bytes;

use crate::cell::{CellComparator, OLDEST_TIMESTAMP};

/// Per-family store settings a scan runs under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanInfo {
    pub(crate) family: Bytes,
    pub(crate) min_versions: usize,
    pub(crate) max_versions: usize,
    pub(crate) ttl: Option<Duration>,
    pub(crate) keep_deleted_cells: bool,
    pub(crate) time_to_purge_deletes: Duration,
    pub(crate) comparator: CellComparator,
}

impl ScanInfo {
    /// Settings for `family`: one version, no TTL, deletes applied immediately.
    pub fn new(family: impl Into<Bytes>) -> Self {
        Self {
            family: family.into(),
            min_versions: 0,
            max_versions: 1,
            ttl: None,
            keep_deleted_cells: false,
            time_to_purge_deletes: Duration::ZERO,
            comparator: CellComparator,
        }
    }

    /// Versions kept regardless of TTL.
    pub fn min_versions(self, min_versions: usize) -> Self {
        ScanInfo {
            min_versions,
            ..self
        }
    }

    /// Versions the family retains per column.
    pub fn max_versions(self, max_versions: usize) -> Self {
        ScanInfo {
            max_versions: max_versions.max(1),
            ..self
        }
    }

    /// Retention horizon; cells older than `now - ttl` expire.
    pub fn ttl(self, ttl: Duration) -> Self {
        ScanInfo {
            ttl: Some(ttl),
            ..self
        }
    }

    /// Keep delete-shadowed cells visible to time-ranged reads and compactions.
    pub fn keep_deleted_cells(self, keep_deleted_cells: bool) -> Self {
        ScanInfo {
            keep_deleted_cells,
            ..self
        }
    }

    /// Minimum age before a major compaction may purge a delete marker.
    pub fn time_to_purge_deletes(self, time_to_purge_deletes: Duration) -> Self {
        ScanInfo {
            time_to_purge_deletes,
            ..self
        }
    }

    /// Family the store serves.
    pub fn family(&self) -> &Bytes {
        &self.family
    }

    /// Cell order of the store.
    pub fn comparator(&self) -> CellComparator {
        self.comparator
    }

    /// Oldest timestamp still inside the TTL at `now_ms`.
    ///
    /// Returns [`OLDEST_TIMESTAMP`] when nothing can expire, either because no
    /// TTL is set or because `min_versions` keeps versions alive past it.
    pub fn oldest_unexpired_ts(&self, now_ms: i64) -> i64 {
        if self.min_versions == 0 {
            self.ttl_cutoff(now_ms)
        } else {
            OLDEST_TIMESTAMP
        }
    }

    /// TTL cut-off ignoring `min_versions`; column trackers apply it past the
    /// retained minimum.
    pub(crate) fn ttl_cutoff(&self, now_ms: i64) -> i64 {
        match self.ttl {
            Some(ttl) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                now_ms.saturating_sub(ttl_ms)
            }
            None => OLDEST_TIMESTAMP,
        }
    }
}
