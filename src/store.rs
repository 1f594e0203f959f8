//! The storage layer a scan reads from.
//!
//! [`Store`] is the collaborator a [`StoreScanner`] consults for its cursors
//! and registers with for segment-set change notifications. [`LocalStore`] is
//! the in-process implementation: one memory buffer plus a list of flushed
//! segments, swapped wholesale by flush and compaction.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::{
    cell::{Cell, CellComparator, OLDEST_TIMESTAMP},
    cursor::{Cursor, CursorError, MemStore, Segment},
    error::ScanError,
    observability::log_info,
    option::ScannerOptions,
    query::{Scan, ScanInfo, ScanType, TimeRange},
    scan::RowRange,
    scanner::StoreScanner,
};

/// What a scan needs from the store's cursor enumeration.
#[derive(Clone, Debug)]
pub struct CursorQuery {
    /// Whether blocks read by the scan should be cached.
    pub cache_blocks: bool,
    /// Single-row read.
    pub is_get: bool,
    /// Compaction rather than client read.
    pub is_compaction: bool,
    /// Key every cursor is first positioned at.
    pub start_key: Cell,
    /// Rows of interest.
    pub rows: RowRange,
    /// Timestamps of interest.
    pub time_range: TimeRange,
    /// Sources whose newest cell is older than this hold only expired data.
    pub expired_cutoff: i64,
    /// Newest write sequence visible in the memory buffer.
    pub read_point: u64,
    /// Skip flushed segments.
    pub memory_only: bool,
    /// Skip the memory buffer.
    pub segments_only: bool,
}

impl CursorQuery {
    /// Query over `rows` with every other knob wide open.
    pub fn for_rows(rows: RowRange) -> Self {
        Self {
            cache_blocks: true,
            is_get: false,
            is_compaction: false,
            start_key: Cell::first_on_row(rows.start_row()),
            rows,
            time_range: TimeRange::ALL,
            expired_cutoff: OLDEST_TIMESTAMP,
            read_point: u64::MAX,
            memory_only: false,
            segments_only: false,
        }
    }
}

/// Handle returned by [`Store::register_observer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Callback fired after the store swaps its segment set.
///
/// Called from the flushing or compacting thread; implementations must only
/// record the fact and return.
pub trait ChangedSegmentsObserver: Send + Sync {
    /// The set of segments backing the store changed.
    fn segments_changed(&self);
}

/// Source of cursors for scans.
pub trait Store: Send + Sync {
    /// Cursors over every source that may hold cells for `query`.
    fn list_cursors(&self, query: &CursorQuery) -> Result<Vec<Box<dyn Cursor>>, CursorError>;

    /// The order every cursor yields cells in.
    fn comparator(&self) -> CellComparator;

    /// Number of flushed segments currently backing the store.
    fn segment_count(&self) -> usize;

    /// Newest write sequence readers may observe.
    fn read_point(&self) -> u64;

    /// Subscribe `observer` to segment-set changes. Dead observers are pruned.
    fn register_observer(&self, observer: Weak<dyn ChangedSegmentsObserver>) -> ObserverId;

    /// Stop notifying the observer registered under `id`.
    fn unregister_observer(&self, id: ObserverId);
}

#[derive(Debug)]
struct StoreState {
    memstore: Arc<MemStore>,
    // Newest first.
    segments: Vec<Arc<Segment>>,
}

/// In-process store: a memory buffer and a set of flushed segments.
pub struct LocalStore {
    state: RwLock<StoreState>,
    sequence: AtomicU64,
    next_segment_sequence: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Weak<dyn ChangedSegmentsObserver>)>>,
    next_observer: AtomicU64,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self {
            state: RwLock::new(StoreState {
                memstore: Arc::new(MemStore::new()),
                segments: Vec::new(),
            }),
            sequence: AtomicU64::new(0),
            next_segment_sequence: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
        }
    }
}

impl LocalStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `cell` to the memory buffer under a fresh sequence number.
    pub fn insert(&self, cell: Cell) -> u64 {
        let state = self.state.read();
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        state.memstore.insert(cell.with_sequence(sequence));
        sequence
    }

    /// Write a put.
    pub fn put(
        &self,
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        value: impl Into<Bytes>,
    ) -> u64 {
        self.insert(Cell::put(row, family, qualifier, timestamp, value))
    }

    /// Current memory buffer.
    pub fn memstore(&self) -> Arc<MemStore> {
        Arc::clone(&self.state.read().memstore)
    }

    /// Flushed segments, newest first.
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.state.read().segments.clone()
    }

    /// Seal the memory buffer into a new segment. Returns `None` when the
    /// buffer was empty.
    pub fn flush(&self) -> Option<Arc<Segment>> {
        let segment = {
            let mut state = self.state.write();
            if state.memstore.is_empty() {
                return None;
            }
            let sealed = std::mem::replace(&mut state.memstore, Arc::new(MemStore::new()));
            let segment = Arc::new(Segment::from_cells(
                self.next_segment_sequence.fetch_add(1, Ordering::AcqRel),
                sealed.cells(),
            ));
            state.segments.insert(0, Arc::clone(&segment));
            log_info!(
                component = "store",
                event = "segment_swap",
                reason = "flush",
                segment = %segment.id(),
                cells = segment.len(),
                segments = state.segments.len(),
            );
            segment
        };
        self.notify_observers();
        Some(segment)
    }

    /// Add an externally built segment as the freshest one.
    pub fn ingest_segment(&self, cells: impl IntoIterator<Item = Cell>) -> Arc<Segment> {
        let segment = Arc::new(Segment::from_cells(
            self.next_segment_sequence.fetch_add(1, Ordering::AcqRel),
            cells,
        ));
        self.replace_segments(&[], Some(Arc::clone(&segment)));
        segment
    }

    /// Swap the segments named by `removed` for `added` in one step.
    pub fn replace_segments(&self, removed: &[Ulid], added: Option<Arc<Segment>>) {
        {
            let mut state = self.state.write();
            state
                .segments
                .retain(|segment| !removed.contains(&segment.id()));
            if let Some(segment) = added {
                state.segments.push(segment);
            }
            state
                .segments
                .sort_by(|a, b| b.sequence_id().cmp(&a.sequence_id()));
            log_info!(
                component = "store",
                event = "segment_swap",
                reason = "replace",
                removed = removed.len(),
                segments = state.segments.len(),
            );
        }
        self.notify_observers();
    }

    /// Merge the segments named by `ids` into one under `scan_type` and swap
    /// it in. Returns the merged segment, or `None` when nothing survived.
    pub fn compact(
        &self,
        info: &ScanInfo,
        ids: &[Ulid],
        scan_type: ScanType,
        options: &ScannerOptions,
    ) -> Result<Option<Arc<Segment>>, ScanError> {
        let inputs: Vec<Arc<Segment>> = self
            .segments()
            .into_iter()
            .filter(|segment| ids.contains(&segment.id()))
            .collect();
        if inputs.is_empty() {
            return Ok(None);
        }
        let sequence_id = inputs.iter().map(|s| s.sequence_id()).max().unwrap_or(0);
        let earliest_put_ts = inputs
            .iter()
            .map(|s| s.min_timestamp())
            .min()
            .unwrap_or(OLDEST_TIMESTAMP);
        let cursors = inputs
            .iter()
            .map(|segment| Box::new(segment.cursor()) as Box<dyn Cursor>)
            .collect();

        let scanner = StoreScanner::with_cursors(
            info,
            Scan::new().all_versions(),
            scan_type,
            cursors,
            self.read_point(),
            earliest_put_ts,
            options,
        )?;
        let mut merged = Vec::new();
        let mut row = Vec::new();
        loop {
            let more = scanner.next_row(&mut row, None)?;
            merged.append(&mut row);
            if !more {
                break;
            }
        }
        scanner.close();

        let removed: Vec<Ulid> = inputs.iter().map(|s| s.id()).collect();
        let output = (!merged.is_empty()).then(|| Arc::new(Segment::from_cells(sequence_id, merged)));
        self.replace_segments(&removed, output.clone());
        Ok(output)
    }

    fn notify_observers(&self) {
        let live: Vec<Arc<dyn ChangedSegmentsObserver>> = {
            let mut observers = self.observers.lock();
            observers.retain(|(_, observer)| observer.strong_count() > 0);
            observers
                .iter()
                .filter_map(|(_, observer)| observer.upgrade())
                .collect()
        };
        for observer in live {
            observer.segments_changed();
        }
    }

    fn memstore_should_use(memstore: &MemStore, query: &CursorQuery) -> bool {
        match memstore.time_span() {
            Some((min_ts, max_ts)) => {
                query.time_range.overlaps(min_ts, max_ts) && max_ts >= query.expired_cutoff
            }
            None => false,
        }
    }
}

impl Store for LocalStore {
    fn list_cursors(&self, query: &CursorQuery) -> Result<Vec<Box<dyn Cursor>>, CursorError> {
        let state = self.state.read();
        let mut cursors: Vec<Box<dyn Cursor>> = Vec::with_capacity(state.segments.len() + 1);
        if !query.segments_only && Self::memstore_should_use(&state.memstore, query) {
            cursors.push(Box::new(state.memstore.cursor(query.read_point)));
        }
        if !query.memory_only {
            for segment in state.segments.iter().filter(|s| s.should_use(query)) {
                cursors.push(Box::new(segment.cursor()));
            }
        }
        Ok(cursors)
    }

    fn comparator(&self) -> CellComparator {
        CellComparator
    }

    fn segment_count(&self) -> usize {
        self.state.read().segments.len()
    }

    fn read_point(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    fn register_observer(&self, observer: Weak<dyn ChangedSegmentsObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    fn unregister_observer(&self, id: ObserverId) {
        self.observers.lock().retain(|(observer, _)| *observer != id);
    }
}
