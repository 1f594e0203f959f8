//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::{
    cmp::Ordering,
    sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Arc,
    },
};

use cellstore::{
    Cell, CellComparator, CursorError, Cursor, LocalStore, Scan, ScanInfo, ScannerOptions, Store,
    StoreScanner,
};

/// Clock every test scan runs at, in epoch milliseconds.
pub const NOW: i64 = 1_000_000;

pub fn options() -> ScannerOptions {
    ScannerOptions::default().now_ms(NOW)
}

pub fn open(store: &Arc<LocalStore>, info: &ScanInfo, scan: Scan, options: &ScannerOptions) -> StoreScanner {
    let store = Arc::clone(store) as Arc<dyn Store>;
    StoreScanner::open(store, info, scan, options).expect("open scanner")
}

/// Every non-empty row the scanner yields until exhaustion.
pub fn drain_rows(scanner: &StoreScanner) -> Vec<Vec<Cell>> {
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

pub fn drain(scanner: &StoreScanner) -> Vec<Cell> {
    drain_rows(scanner).into_iter().flatten().collect()
}

pub fn assert_ordered(cells: &[Cell]) {
    for pair in cells.windows(2) {
        assert_ne!(
            CellComparator.compare(&pair[0], &pair[1]),
            Ordering::Greater,
            "{:?} emitted before {:?}",
            pair[0],
            pair[1]
        );
    }
}

/// `row/qualifier@ts=value` per cell, delete markers shown by kind.
pub fn describe(cells: &[Cell]) -> Vec<String> {
    cells
        .iter()
        .map(|cell| {
            let key = format!(
                "{}/{}@{}",
                String::from_utf8_lossy(cell.row()),
                String::from_utf8_lossy(cell.qualifier()),
                cell.timestamp()
            );
            if cell.is_delete() {
                format!("{key}={:?}", cell.kind())
            } else {
                format!("{key}={}", String::from_utf8_lossy(cell.value()))
            }
        })
        .collect()
}

/// Sorted in-memory cursor that counts closes and can be told to fail seeks.
pub struct VecCursor {
    cells: Vec<Cell>,
    pos: Option<usize>,
    sequence_id: u64,
    file: bool,
    fail_seeks: bool,
    closes: Arc<AtomicUsize>,
}

impl VecCursor {
    pub fn new(mut cells: Vec<Cell>, sequence_id: u64, closes: &Arc<AtomicUsize>) -> Self {
        cells.sort_by(|a, b| CellComparator.compare_with_sequence(a, b));
        Self {
            cells,
            pos: None,
            sequence_id,
            file: true,
            fail_seeks: false,
            closes: Arc::clone(closes),
        }
    }

    /// Keep the cells in the given order, sorted or not.
    pub fn unsorted(cells: Vec<Cell>, closes: &Arc<AtomicUsize>) -> Self {
        Self {
            cells,
            pos: None,
            sequence_id: 1,
            file: true,
            fail_seeks: false,
            closes: Arc::clone(closes),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_seeks = true;
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.file = false;
        self
    }

    pub fn boxed(self) -> Box<dyn Cursor> {
        Box::new(self)
    }
}

impl Cursor for VecCursor {
    fn peek(&self) -> Option<&Cell> {
        self.cells.get(self.pos?)
    }

    fn next(&mut self) -> Result<Option<Cell>, CursorError> {
        let Some(pos) = self.pos else {
            return Ok(None);
        };
        self.pos = Some(pos + 1);
        Ok(self.cells.get(pos).cloned())
    }

    fn seek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        if self.fail_seeks {
            return Err(CursorError::Io(std::io::Error::other("injected seek failure")));
        }
        // Linear so that unsorted fixtures still produce a position.
        let pos = self
            .cells
            .iter()
            .position(|cell| CellComparator.compare(cell, key) != Ordering::Less)
            .unwrap_or(self.cells.len());
        self.pos = Some(pos);
        Ok(pos < self.cells.len())
    }

    fn reseek(&mut self, key: &Cell) -> Result<bool, CursorError> {
        self.seek(key)
    }

    fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    fn is_file_cursor(&self) -> bool {
        self.file
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

pub fn closes() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(closes: &Arc<AtomicUsize>) -> usize {
    closes.load(AtomicOrdering::SeqCst)
}

/// Random puts and delete markers over a few rows and columns. Timestamps are
/// unique per column except for version deletes, half of which reuse the
/// timestamp of an earlier put so that they shadow it.
pub fn random_cells(rng: &mut fastrand::Rng, count: usize) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::with_capacity(count);
    let mut used = std::collections::HashSet::new();
    let mut shadowed = std::collections::HashSet::new();
    while cells.len() < count {
        let kind = rng.u8(0..20);
        if kind == 1 && rng.bool() {
            let puts: Vec<&Cell> = cells.iter().filter(|cell| !cell.is_delete()).collect();
            if !puts.is_empty() {
                let put = puts[rng.usize(..puts.len())];
                let key = (put.row().clone(), put.qualifier().clone(), put.timestamp());
                if shadowed.insert(key) {
                    let marker =
                        Cell::delete(put.row().clone(), "cf", put.qualifier().clone(), put.timestamp());
                    cells.push(marker);
                }
                continue;
            }
        }
        let row = format!("row{:02}", rng.u8(0..12));
        let qualifier = format!("q{}", rng.u8(0..5));
        let timestamp = rng.i64(1..200);
        if !used.insert((row.clone(), qualifier.clone(), timestamp)) {
            continue;
        }
        let cell = match kind {
            0 => Cell::delete_column(row, "cf", qualifier, timestamp),
            1 => Cell::delete(row, "cf", qualifier, timestamp),
            2 => Cell::delete_family(row, "cf", timestamp),
            3 => Cell::delete_family_version(row, "cf", timestamp),
            _ => Cell::put(row, "cf", qualifier, timestamp, format!("v{timestamp}")),
        };
        cells.push(cell);
    }
    cells
}

/// The cells a client scan returns for `cells` when at most `max_versions`
/// versions per column are wanted, computed without the engine.
pub fn expected_user_view(cells: &[Cell], max_versions: usize) -> Vec<String> {
    use std::collections::BTreeMap;

    let mut family_deletes: BTreeMap<Vec<u8>, i64> = BTreeMap::new();
    let mut column_deletes: BTreeMap<(Vec<u8>, Vec<u8>), i64> = BTreeMap::new();
    let mut version_deletes = std::collections::HashSet::new();
    let mut family_version_deletes = std::collections::HashSet::new();
    for cell in cells {
        let row = cell.row().to_vec();
        let qualifier = cell.qualifier().to_vec();
        match cell.kind() {
            cellstore::CellKind::DeleteFamily => {
                let stamp = family_deletes.entry(row).or_insert(i64::MIN);
                *stamp = (*stamp).max(cell.timestamp());
            }
            cellstore::CellKind::DeleteFamilyVersion => {
                family_version_deletes.insert((row, cell.timestamp()));
            }
            cellstore::CellKind::DeleteColumn => {
                let stamp = column_deletes.entry((row, qualifier)).or_insert(i64::MIN);
                *stamp = (*stamp).max(cell.timestamp());
            }
            cellstore::CellKind::Delete => {
                version_deletes.insert((row, qualifier, cell.timestamp()));
            }
            _ => {}
        }
    }

    let mut puts: Vec<&Cell> = cells
        .iter()
        .filter(|cell| !cell.is_delete())
        .filter(|cell| {
            let row = cell.row().to_vec();
            let qualifier = cell.qualifier().to_vec();
            let ts = cell.timestamp();
            family_deletes.get(&row).map_or(true, |stamp| ts > *stamp)
                && !family_version_deletes.contains(&(row.clone(), ts))
                && column_deletes
                    .get(&(row.clone(), qualifier.clone()))
                    .map_or(true, |stamp| ts > *stamp)
                && !version_deletes.contains(&(row, qualifier, ts))
        })
        .collect();
    puts.sort_by(|a, b| CellComparator.compare(a, b));

    let mut kept = Vec::new();
    let mut column: Option<(Vec<u8>, Vec<u8>)> = None;
    let mut versions = 0;
    for cell in puts {
        let key = (cell.row().to_vec(), cell.qualifier().to_vec());
        if column.as_ref() != Some(&key) {
            column = Some(key);
            versions = 0;
        }
        versions += 1;
        if versions <= max_versions {
            kept.push(cell.clone());
        }
    }
    describe(&kept)
}
