mod common;

use std::{collections::HashSet, sync::Arc, thread};

use cellstore::{Cell, LocalStore, Scan, ScanInfo, ScanType, ScannerState};
use common::{assert_ordered, describe, drain, drain_rows, open, options};
use ulid::Ulid;

fn info() -> ScanInfo {
    ScanInfo::new("cf").max_versions(10)
}

fn populated() -> Arc<LocalStore> {
    let store = Arc::new(LocalStore::new());
    for row in 0..8 {
        for q in ["a", "b"] {
            store.put(format!("row{row}"), "cf", q, 1, format!("{row}{q}"));
        }
        if row % 3 == 2 {
            store.flush();
        }
    }
    store.insert(Cell::delete_column("row4", "cf", "b", 5));
    store
}

fn segment_ids(store: &LocalStore) -> Vec<Ulid> {
    store.segments().iter().map(|segment| segment.id()).collect()
}

fn next(scanner: &cellstore::StoreScanner) -> (bool, Vec<Cell>) {
    let mut row = Vec::new();
    let more = scanner.next_row(&mut row, None).expect("next_row");
    (more, row)
}

fn assert_no_duplicates(cells: &[Cell]) {
    let mut seen = HashSet::new();
    for cell in cells {
        assert!(
            seen.insert((cell.row().clone(), cell.qualifier().clone(), cell.timestamp())),
            "{cell:?} returned twice"
        );
    }
}

#[test]
fn flush_mid_scan_neither_repeats_nor_loses_cells() {
    let store = populated();
    let expected = describe(&drain(&open(&store, &info(), Scan::new(), &options())));

    let scanner = open(&store, &info(), Scan::new(), &options());
    let mut got = Vec::new();
    for _ in 0..3 {
        got.extend(next(&scanner).1);
    }
    assert!(store.flush().is_some());
    assert_eq!(scanner.state(), ScannerState::PendingResync);
    got.extend(drain(&scanner));

    assert_ordered(&got);
    assert_no_duplicates(&got);
    assert_eq!(describe(&got), expected);
}

#[test]
fn compaction_mid_scan_keeps_the_user_view() {
    let store = populated();
    store.flush();
    let expected = describe(&drain(&open(&store, &info(), Scan::new(), &options())));

    let scanner = open(&store, &info(), Scan::new(), &options());
    let mut got = next(&scanner).1;
    got.extend(next(&scanner).1);
    let merged = store
        .compact(&info(), &segment_ids(&store), ScanType::drop_all_deletes(), &options())
        .expect("compact")
        .expect("segment");
    assert_eq!(store.segments().len(), 1);
    assert_eq!(store.segments()[0].id(), merged.id());
    got.extend(drain(&scanner));

    assert_no_duplicates(&got);
    assert_eq!(describe(&got), expected);
}

#[test]
fn back_to_back_notifications_resync_once() {
    let store = populated();
    let expected = describe(&drain(&open(&store, &info(), Scan::new(), &options())));

    let scanner = open(&store, &info(), Scan::new(), &options());
    let mut got = next(&scanner).1;
    store.replace_segments(&[], None);
    store.flush();
    store.replace_segments(&[], None);
    got.extend(next(&scanner).1);
    // A notification absorbed without a rebuild in between keeps the top.
    store.flush();
    scanner.update_readers();
    store.replace_segments(&[], None);
    got.extend(drain(&scanner));

    assert_no_duplicates(&got);
    assert_eq!(describe(&got), expected);
}

#[test]
fn resync_inside_a_batched_row_resumes_at_the_next_cell() {
    let store = Arc::new(LocalStore::new());
    for i in 0..5 {
        store.put("wide", "cf", format!("q{i}"), 1, format!("{i}"));
    }
    store.put("zz", "cf", "q", 1, "tail");
    let scanner = open(&store, &info(), Scan::new().batch(2), &options());

    let (more, first) = next(&scanner);
    assert!(more);
    assert_eq!(describe(&first), vec!["wide/q0@1=0", "wide/q1@1=1"]);
    store.flush();

    let rest = drain_rows(&scanner);
    let sizes: Vec<usize> = rest.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 1, 1]);
    let rest: Vec<Cell> = rest.into_iter().flatten().collect();
    assert_eq!(
        describe(&rest),
        vec!["wide/q2@1=2", "wide/q3@1=3", "wide/q4@1=4", "zz/q@1=tail"]
    );
}

#[test]
fn update_readers_rebuilds_on_the_next_call() {
    let store = populated();
    let expected = describe(&drain(&open(&store, &info(), Scan::new(), &options())));

    let scanner = open(&store, &info(), Scan::new(), &options());
    let mut got = next(&scanner).1;
    scanner.update_readers();
    assert_eq!(scanner.state(), ScannerState::PendingResync);
    assert_eq!(
        scanner.peek().map(|cell| cell.row().clone()),
        Some(bytes::Bytes::from_static(b"row1"))
    );
    got.extend(drain(&scanner));
    assert_eq!(describe(&got), expected);
}

#[test]
fn explicit_columns_survive_a_resync() {
    let store = populated();
    let scan = || Scan::new().column("b");
    let expected = describe(&drain(&open(&store, &info(), scan(), &options())));
    assert!(!expected.iter().any(|cell| cell.starts_with("row4/")));

    let scanner = open(&store, &info(), scan(), &options());
    let mut got = next(&scanner).1;
    store.flush();
    got.extend(drain(&scanner));
    assert_eq!(describe(&got), expected);
}

#[test]
fn closed_scanners_ignore_notifications() {
    let store = populated();
    let scanner = open(&store, &info(), Scan::new().stop_row("row1"), &options());
    let cells = drain(&scanner);
    assert_eq!(cells.len(), 2);
    assert_eq!(scanner.state(), ScannerState::Closed);

    store.flush();
    assert_eq!(scanner.state(), ScannerState::Closed);
    let (more, row) = next(&scanner);
    assert!(!more);
    assert!(row.is_empty());
    assert!(scanner.peek().is_none());
}

#[test]
fn concurrent_swaps_during_a_scan() {
    let store = Arc::new(LocalStore::new());
    for row in 0..200 {
        for ts in [3, 2, 1] {
            store.put(format!("row{row:03}"), "cf", "q", ts, format!("{row}@{ts}"));
        }
        if row % 40 == 39 {
            store.flush();
        }
    }
    let scan = || Scan::new().max_versions(2);
    let expected = describe(&drain(&open(&store, &info(), scan(), &options())));

    let scanner = open(&store, &info(), scan(), &options());
    let got = thread::scope(|scope| {
        let writer = Arc::clone(&store);
        scope.spawn(move || {
            writer.flush();
            for _ in 0..5 {
                let ids = segment_ids(&writer);
                writer
                    .compact(&info(), &ids, ScanType::CompactionRetainDeletes, &options())
                    .expect("compact");
            }
        });
        let mut got = Vec::new();
        loop {
            let (more, row) = next(&scanner);
            got.extend(row);
            if !more {
                return got;
            }
        }
    });

    assert_ordered(&got);
    assert_no_duplicates(&got);
    assert_eq!(describe(&got), expected);
}
