//! Row-at-a-time scans over a store.
//!
//! A [`StoreScanner`] seeks every eligible cursor to the scan's start key,
//! merges them through a [`MergeHeap`](crate::heap::MergeHeap) and feeds each
//! cell to a [`QueryMatcher`](crate::matcher::QueryMatcher), acting on its
//! verdict until a row is complete. When the store swaps its segments the
//! scanner only marks itself; the next call rebuilds the cursor set at the
//! last peeked key.

mod parallel;

use std::{
    cmp::Ordering,
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use self::parallel::ParallelSeeker;
use crate::{
    cell::{Cell, CellComparator, LATEST_TIMESTAMP},
    cursor::Cursor,
    error::ScanError,
    executor::{ExecutorError, SeekExecutor, ThreadPoolExecutor},
    heap::MergeHeap,
    matcher::{MatchCode, QueryMatcher},
    observability::{log_debug, log_error},
    option::ScannerOptions,
    query::{Scan, ScanInfo, ScanType},
    store::{ChangedSegmentsObserver, CursorQuery, ObserverId, Store},
};

/// Lifecycle state of a [`StoreScanner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    /// Cursors are positioned and the heap is live.
    Active,
    /// The segment set changed; the next call rebuilds the cursors.
    PendingResync,
    /// Closed explicitly or by exhaustion.
    Closed,
}

#[derive(Default)]
struct ResyncSlot {
    pending: AtomicBool,
}

impl ChangedSegmentsObserver for ResyncSlot {
    fn segments_changed(&self) {
        self.pending.store(true, AtomicOrdering::Release);
    }
}

/// Merge scan over the memory buffer and segments of one store.
///
/// All methods take `&self` and serialize on an internal lock, so a scanner
/// may be shared with the thread that delivers change notifications.
pub struct StoreScanner {
    inner: Mutex<ScannerInner>,
    resync: Arc<ResyncSlot>,
    cancel: CancellationToken,
}

impl StoreScanner {
    /// Open a client scan of `store`.
    ///
    /// Rejects explicit columns on a raw scan, and a batch size combined with
    /// a filter that vetoes whole rows.
    pub fn open(
        store: Arc<dyn Store>,
        info: &ScanInfo,
        mut scan: Scan,
        options: &ScannerOptions,
    ) -> Result<Self, ScanError> {
        validate(&scan)?;
        let now_ms = options.current_time_ms();
        let column_count = scan.get_columns().len();
        let explicit_columns = column_count > 0;
        let is_get = scan.is_get();
        let matcher = QueryMatcher::new(
            &mut scan,
            info,
            &ScanType::UserScan,
            u64::MAX,
            LATEST_TIMESTAMP,
            now_ms,
        );
        let query = CursorQuery {
            cache_blocks: scan.cache_blocks,
            is_get,
            is_compaction: false,
            start_key: matcher.start_key().clone(),
            rows: scan.get_rows().clone(),
            time_range: scan.get_time_range(),
            expired_cutoff: info.oldest_unexpired_ts(now_ms),
            read_point: store.read_point(),
            memory_only: scan.memory_only,
            segments_only: scan.segments_only,
        };
        let parallel = if options.parallel_seek && store.segment_count() > 1 {
            Some(parallel_seeker(options)?)
        } else {
            None
        };
        let lazy_seek = explicit_columns && options.lazy_seek;

        let mut cursors = store.list_cursors(&query)?;
        let start_key = matcher.start_key().clone();
        if lazy_seek {
            // Bloom checked even for the first seek: it is often on a
            // family delete of the start row.
            let requested = cursors
                .iter_mut()
                .try_for_each(|cursor| cursor.request_seek(&start_key, false, true).map(drop));
            if let Err(err) = requested {
                close_all(cursors);
                return Err(err.into());
            }
        } else {
            cursors = seek_cursors(parallel.as_ref(), cursors, &start_key)?;
        }
        let cursor_count = cursors.len();
        let heap = MergeHeap::new(cursors, store.comparator())?;

        let resync = Arc::new(ResyncSlot::default());
        let weak = Arc::downgrade(&resync);
        let weak: Weak<dyn ChangedSegmentsObserver> = weak;
        let observer = store.register_observer(weak);

        log_debug!(
            component = "scanner",
            event = "scanner_opened",
            cursors = cursor_count,
            columns = column_count,
            lazy = lazy_seek,
            parallel = parallel.is_some(),
        );

        let inner = ScannerInner {
            comparator: store.comparator(),
            store: Some(store),
            observer: Some(observer),
            query,
            heap: Some(heap),
            last_top: None,
            matcher,
            parallel,
            lazy_seek,
            use_row_col_bloom: column_count > 1 || (!is_get && column_count == 1),
            store_limit: scan.max_results_per_family,
            store_offset: scan.row_offset_per_family,
            batch: scan.batch,
            count_per_row: 0,
            cells_scanned: 0,
            closing: false,
        };
        Ok(Self {
            inner: Mutex::new(inner),
            resync,
            cancel: options.cancellation.clone(),
        })
    }

    /// Open a scan over an explicit cursor set, as compactions do.
    ///
    /// Cells with a sequence above `smallest_read_point` are kept uncounted
    /// and the delete markers among them are not applied. Delete markers
    /// older than `earliest_put_ts` shadow nothing and may be dropped when the
    /// store keeps deleted cells.
    pub fn with_cursors(
        info: &ScanInfo,
        mut scan: Scan,
        scan_type: ScanType,
        cursors: Vec<Box<dyn Cursor>>,
        smallest_read_point: u64,
        earliest_put_ts: i64,
        options: &ScannerOptions,
    ) -> Result<Self, ScanError> {
        if let Err(err) = validate(&scan) {
            close_all(cursors);
            return Err(err);
        }
        let now_ms = options.current_time_ms();
        let matcher = QueryMatcher::new(
            &mut scan,
            info,
            &scan_type,
            smallest_read_point,
            earliest_put_ts,
            now_ms,
        );

        let (cursors, skipped): (Vec<_>, Vec<_>) = cursors.into_iter().partition(|cursor| {
            let file = cursor.is_file_cursor();
            !((file && scan.memory_only) || (!file && scan.segments_only))
        });
        close_all(skipped);

        let file_cursors = cursors.iter().filter(|c| c.is_file_cursor()).count();
        let parallel = if options.parallel_seek && file_cursors > 1 {
            match parallel_seeker(options) {
                Ok(seeker) => Some(seeker),
                Err(err) => {
                    close_all(cursors);
                    return Err(err);
                }
            }
        } else {
            None
        };
        let start_key = matcher.start_key().clone();
        let cursors = seek_cursors(parallel.as_ref(), cursors, &start_key)?;
        let heap = MergeHeap::new(cursors, info.comparator())?;

        let mut query = CursorQuery::for_rows(scan.get_rows().clone());
        query.is_compaction = scan_type.is_compaction();
        query.start_key = start_key;
        let inner = ScannerInner {
            comparator: info.comparator(),
            store: None,
            observer: None,
            query,
            heap: Some(heap),
            last_top: None,
            matcher,
            parallel,
            lazy_seek: false,
            use_row_col_bloom: false,
            store_limit: scan.max_results_per_family,
            store_offset: scan.row_offset_per_family,
            batch: scan.batch,
            count_per_row: 0,
            cells_scanned: 0,
            closing: false,
        };
        Ok(Self {
            inner: Mutex::new(inner),
            resync: Arc::new(ResyncSlot::default()),
            cancel: options.cancellation.clone(),
        })
    }

    /// Append the next row's cells to `out`, at most `limit` of them.
    ///
    /// `None` or `Some(0)` means no limit beyond the scan's batch size. A row
    /// cut short by the limit continues on the next call. Returns `false`
    /// once nothing more can follow; the scanner has then closed itself.
    pub fn next_row(&self, out: &mut Vec<Cell>, limit: Option<usize>) -> Result<bool, ScanError> {
        let mut inner = self.inner.lock();
        inner.absorb_resync(&self.resync);
        inner.next_row(out, limit)
    }

    /// Smallest cell not yet consumed.
    pub fn peek(&self) -> Option<Cell> {
        let mut inner = self.inner.lock();
        inner.absorb_resync(&self.resync);
        match inner.heap.as_ref() {
            Some(heap) => heap.peek().cloned(),
            None => inner.last_top.clone(),
        }
    }

    /// Position at the first cell `>= key`.
    pub fn seek(&self, key: &Cell) -> Result<bool, ScanError> {
        let mut inner = self.inner.lock();
        inner.absorb_resync(&self.resync);
        inner.check_reseek()?;
        let heap = inner.heap.as_mut().ok_or(ScanError::Closed)?;
        Ok(heap.seek(key)?)
    }

    /// Move forward to the first cell `>= key`.
    pub fn reseek(&self, key: &Cell) -> Result<bool, ScanError> {
        let mut inner = self.inner.lock();
        inner.absorb_resync(&self.resync);
        inner.check_reseek()?;
        inner.reseek_heap(key)
    }

    /// Close every cursor and unsubscribe from the store. Idempotent.
    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// Drop the current cursors now and rebuild them at the last peeked key on
    /// the next call.
    pub fn update_readers(&self) {
        let mut inner = self.inner.lock();
        inner.invalidate_heap();
    }

    /// Cells handed to the matcher so far, skipped ones included.
    pub fn cells_scanned(&self) -> u64 {
        self.inner.lock().cells_scanned
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScannerState {
        let inner = self.inner.lock();
        if inner.closing {
            ScannerState::Closed
        } else if self.resync.pending.load(AtomicOrdering::Acquire)
            || (inner.heap.is_none() && inner.last_top.is_some())
        {
            ScannerState::PendingResync
        } else {
            ScannerState::Active
        }
    }

    /// Token that interrupts a parallel seek in progress.
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for StoreScanner {
    fn drop(&mut self) {
        self.inner.get_mut().close();
    }
}

struct ScannerInner {
    comparator: CellComparator,
    store: Option<Arc<dyn Store>>,
    observer: Option<ObserverId>,
    query: CursorQuery,
    heap: Option<MergeHeap>,
    // Heap top remembered across a segment swap.
    last_top: Option<Cell>,
    matcher: QueryMatcher,
    parallel: Option<ParallelSeeker>,
    lazy_seek: bool,
    use_row_col_bloom: bool,
    store_limit: Option<usize>,
    store_offset: usize,
    batch: Option<usize>,
    count_per_row: usize,
    cells_scanned: u64,
    closing: bool,
}

impl ScannerInner {
    fn next_row(&mut self, out: &mut Vec<Cell>, limit: Option<usize>) -> Result<bool, ScanError> {
        if self.closing {
            return Ok(false);
        }
        if self.check_reseek()? {
            return Ok(true);
        }
        let Some(peeked) = self.top() else {
            self.close();
            return Ok(false);
        };
        // The matcher only checks the stop row on a row change.
        if self.matcher.is_past_stop_row(peeked.row()) {
            self.close();
            return Ok(false);
        }

        let explicit_limit = limit.filter(|limit| *limit > 0);
        if explicit_limit.is_some() && self.matcher.has_filter_row() {
            return Err(ScanError::InvalidScan(
                "a row limit cannot be combined with a row filter".into(),
            ));
        }
        let limit = explicit_limit.or(self.batch);
        if limit.is_none() || self.matcher.current_row() != Some(peeked.row()) {
            self.count_per_row = 0;
            self.matcher.set_row(peeked.row().clone());
        }

        let row_start = out.len();
        let mut previous: Option<Cell> = None;
        let mut count = 0usize;
        while let Some(cell) = self.top() {
            self.cells_scanned += 1;
            if let Some(previous) = &previous {
                if self.comparator.compare(previous, &cell) == Ordering::Greater {
                    log_error!(
                        component = "scanner",
                        event = "scanner_order_violation",
                        previous = ?previous,
                        next = ?cell,
                    );
                    self.close();
                    return Err(ScanError::OrderViolation {
                        previous: format!("{previous:?}"),
                        next: format!("{cell:?}"),
                    });
                }
            }
            previous = Some(cell.clone());

            let code = self.matcher.match_cell(&cell)?;
            match code {
                MatchCode::Include
                | MatchCode::IncludeAndSeekNextRow
                | MatchCode::IncludeAndSeekNextColumn => {
                    let cell = self.matcher.transform(cell);
                    self.count_per_row += 1;
                    if self
                        .store_limit
                        .is_some_and(|store_limit| self.count_per_row > store_limit + self.store_offset)
                    {
                        // Per-family quota for the row is used up.
                        if !self.matcher.more_rows_may_exist_after(&cell) {
                            self.close();
                            return Ok(self.finish_row(out, row_start, false));
                        }
                        let key = self.matcher.key_for_next_row(&cell);
                        self.reseek_heap(&key)?;
                        return Ok(self.finish_row(out, row_start, true));
                    }

                    let next_row_key = (code == MatchCode::IncludeAndSeekNextRow)
                        .then(|| self.matcher.key_for_next_row(&cell));
                    let next_column_key = (code == MatchCode::IncludeAndSeekNextColumn)
                        .then(|| self.matcher.key_for_next_column(&cell));
                    let more_rows = self.matcher.more_rows_may_exist_after(&cell);
                    if self.count_per_row > self.store_offset {
                        out.push(cell);
                        count += 1;
                    }

                    if let Some(key) = next_row_key {
                        if !more_rows {
                            self.close();
                            return Ok(self.finish_row(out, row_start, false));
                        }
                        self.reseek_heap(&key)?;
                    } else if let Some(key) = next_column_key {
                        self.reseek_heap(&key)?;
                    } else {
                        self.advance()?;
                    }

                    if limit.is_some_and(|limit| count == limit) {
                        return Ok(true);
                    }
                }
                MatchCode::Done => return Ok(self.finish_row(out, row_start, true)),
                MatchCode::DoneScan => {
                    let result = self.finish_row(out, row_start, false);
                    self.close();
                    return Ok(result);
                }
                MatchCode::SeekNextRow => {
                    if !self.matcher.more_rows_may_exist_after(&cell) {
                        let result = self.finish_row(out, row_start, false);
                        self.close();
                        return Ok(result);
                    }
                    let key = self.matcher.key_for_next_row(&cell);
                    self.reseek_heap(&key)?;
                }
                MatchCode::SeekNextColumn => {
                    let key = self.matcher.key_for_next_column(&cell);
                    self.reseek_heap(&key)?;
                }
                MatchCode::Skip => self.advance()?,
                MatchCode::SeekUsingHint => match self.matcher.next_key_hint(&cell) {
                    Some(hint) => {
                        self.reseek_heap(&hint)?;
                    }
                    None => self.advance()?,
                },
            }
        }

        if count > 0 {
            return Ok(self.finish_row(out, row_start, true));
        }
        self.close();
        Ok(self.finish_row(out, row_start, false))
    }

    // Applies the filter's row veto to the cells gathered since `row_start`.
    fn finish_row(&mut self, out: &mut Vec<Cell>, row_start: usize, more: bool) -> bool {
        if out.len() > row_start && self.matcher.filter_row() {
            out.truncate(row_start);
        }
        more
    }

    fn top(&self) -> Option<Cell> {
        self.heap.as_ref()?.peek().cloned()
    }

    fn advance(&mut self) -> Result<(), ScanError> {
        if let Some(heap) = self.heap.as_mut() {
            heap.next()?;
        }
        Ok(())
    }

    fn reseek_heap(&mut self, key: &Cell) -> Result<bool, ScanError> {
        let heap = self.heap.as_mut().ok_or(ScanError::Closed)?;
        let found = if self.lazy_seek {
            heap.request_seek(key, true, self.use_row_col_bloom)?
        } else {
            heap.reseek(key)?
        };
        Ok(found)
    }

    fn absorb_resync(&mut self, slot: &ResyncSlot) {
        if slot.pending.swap(false, AtomicOrdering::AcqRel) {
            log_debug!(component = "scanner", event = "scanner_resync_pending");
            self.invalidate_heap();
        }
    }

    fn invalidate_heap(&mut self) {
        // A second notification before the rebuild must not lose the top.
        if self.closing || self.store.is_none() {
            return;
        }
        let Some(mut heap) = self.heap.take() else {
            return;
        };
        self.last_top = heap.peek().cloned();
        heap.close();
    }

    /// Rebuild the cursor set if a swap left it torn down. Returns whether
    /// the new top is on a different row than before.
    fn check_reseek(&mut self) -> Result<bool, ScanError> {
        if self.heap.is_some() {
            return Ok(false);
        }
        let Some(last_top) = self.last_top.take() else {
            return Ok(false);
        };
        self.reset_cursor_stack(&last_top)?;
        let moved = match self.top() {
            Some(top) => !self.comparator.matching_rows(&last_top, &top),
            None => true,
        };
        log_debug!(
            component = "scanner",
            event = "scanner_resynced",
            moved_row = moved,
        );
        Ok(moved)
    }

    fn reset_cursor_stack(&mut self, last_top: &Cell) -> Result<(), ScanError> {
        let Some(store) = self.store.as_ref() else {
            return Err(ScanError::Closed);
        };
        let cursors = store.list_cursors(&self.query)?;
        let cursors = seek_cursors(self.parallel.as_ref(), cursors, last_top)?;
        let heap = MergeHeap::new(cursors, self.comparator)?;
        let row = heap.peek().unwrap_or(last_top).row().clone();
        self.heap = Some(heap);
        if self.matcher.current_row() != Some(&row) {
            self.count_per_row = 0;
            self.matcher.set_row(row);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        if let (Some(store), Some(observer)) = (self.store.as_ref(), self.observer.take()) {
            store.unregister_observer(observer);
        }
        if let Some(mut heap) = self.heap.take() {
            heap.close();
        }
        self.last_top = None;
        log_debug!(
            component = "scanner",
            event = "scanner_closed",
            cells_scanned = self.cells_scanned,
        );
    }
}

fn validate(scan: &Scan) -> Result<(), ScanError> {
    if scan.is_raw() && scan.has_columns() {
        return Err(ScanError::InvalidScan(
            "cannot specify any column for a raw scan".into(),
        ));
    }
    if scan.batch.is_some() && scan.filter.as_ref().is_some_and(|f| f.has_filter_row()) {
        return Err(ScanError::InvalidScan(
            "a batch size cannot be combined with a row filter".into(),
        ));
    }
    Ok(())
}

fn parallel_seeker(options: &ScannerOptions) -> Result<ParallelSeeker, ScanError> {
    let executor: Arc<dyn SeekExecutor> = match options.executor.as_ref() {
        Some(executor) => Arc::clone(executor),
        None => Arc::new(
            ThreadPoolExecutor::new(options.seek_workers).map_err(ExecutorError::Start)?,
        ),
    };
    Ok(ParallelSeeker::new(
        executor,
        options.parallel_seek_timeout,
        options.cancellation.clone(),
    ))
}

fn seek_cursors(
    parallel: Option<&ParallelSeeker>,
    mut cursors: Vec<Box<dyn Cursor>>,
    key: &Cell,
) -> Result<Vec<Box<dyn Cursor>>, ScanError> {
    if let Some(parallel) = parallel {
        return parallel.seek_all(cursors, key);
    }
    let seeked = cursors
        .iter_mut()
        .try_for_each(|cursor| cursor.seek(key).map(drop));
    match seeked {
        Ok(()) => Ok(cursors),
        Err(err) => {
            close_all(cursors);
            Err(err.into())
        }
    }
}

fn close_all(cursors: Vec<Box<dyn Cursor>>) {
    for mut cursor in cursors {
        cursor.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{heap::tests::CountingCursor, store::LocalStore};

    fn rows(scanner: &StoreScanner) -> Vec<Vec<Cell>> {
        let mut rows = Vec::new();
        loop {
            let mut row = Vec::new();
            let more = scanner.next_row(&mut row, None).expect("next_row");
            if !row.is_empty() {
                rows.push(row);
            }
            if !more {
                return rows;
            }
        }
    }

    #[test]
    fn raw_scan_with_columns_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(LocalStore::new());
        let err = StoreScanner::open(
            store,
            &ScanInfo::new("cf"),
            Scan::new().raw().column("q"),
            &ScannerOptions::default(),
        )
        .err()
        .expect("rejected");
        assert!(err.is_non_retryable());
    }

    #[test]
    fn store_offset_and_limit_window_each_row() {
        let closes = Arc::new(AtomicUsize::new(0));
        let cells = ["a", "b", "c", "d", "e"]
            .into_iter()
            .flat_map(|q| {
                [
                    Cell::put("r1", "cf", q, 1, "v"),
                    Cell::put("r2", "cf", q, 1, "v"),
                ]
            })
            .collect();
        let scanner = StoreScanner::with_cursors(
            &ScanInfo::new("cf"),
            Scan::new().row_offset_per_family(1).max_results_per_family(2),
            ScanType::UserScan,
            vec![CountingCursor::boxed(cells, 1, &closes)],
            u64::MAX,
            LATEST_TIMESTAMP,
            &ScannerOptions::default(),
        )
        .expect("open");
        let got: Vec<Vec<String>> = rows(&scanner)
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|c| format!("{}{}", c.row().escape_ascii(), c.qualifier().escape_ascii()))
                    .collect()
            })
            .collect();
        assert_eq!(got, vec![vec!["r1b", "r1c"], vec!["r2b", "r2c"]]);
        assert_eq!(scanner.state(), ScannerState::Closed);
        assert_eq!(closes.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn batch_splits_wide_rows() {
        let closes = Arc::new(AtomicUsize::new(0));
        let cells = (0..5)
            .map(|i| Cell::put("r", "cf", format!("q{i}"), 1, "v"))
            .collect();
        let scanner = StoreScanner::with_cursors(
            &ScanInfo::new("cf"),
            Scan::new().batch(2),
            ScanType::UserScan,
            vec![CountingCursor::boxed(cells, 1, &closes)],
            u64::MAX,
            LATEST_TIMESTAMP,
            &ScannerOptions::default(),
        )
        .expect("open");
        let sizes: Vec<usize> = rows(&scanner).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn close_is_idempotent_and_closes_cursors_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let scanner = StoreScanner::with_cursors(
            &ScanInfo::new("cf"),
            Scan::new(),
            ScanType::UserScan,
            vec![
                CountingCursor::boxed(vec![Cell::put("a", "cf", "q", 1, "")], 1, &closes),
                CountingCursor::boxed(vec![Cell::put("b", "cf", "q", 1, "")], 2, &closes),
            ],
            u64::MAX,
            LATEST_TIMESTAMP,
            &ScannerOptions::default(),
        )
        .expect("open");
        scanner.close();
        scanner.close();
        drop(scanner);
        assert_eq!(closes.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn seek_after_close_is_an_error() {
        let scanner = StoreScanner::with_cursors(
            &ScanInfo::new("cf"),
            Scan::new(),
            ScanType::UserScan,
            Vec::new(),
            u64::MAX,
            LATEST_TIMESTAMP,
            &ScannerOptions::default(),
        )
        .expect("open");
        let mut out = Vec::new();
        assert!(!scanner.next_row(&mut out, None).expect("next_row"));
        assert!(matches!(
            scanner.seek(&Cell::first_on_row("a")),
            Err(ScanError::Closed)
        ));
        assert!(!scanner.next_row(&mut out, None).expect("still done"));
    }
}
