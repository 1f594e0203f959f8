mod common;

use std::{sync::Arc, time::Duration};

use cellstore::{
    cell::OLDEST_TIMESTAMP, Cell, Cursor, LocalStore, Scan, ScanInfo, ScanType, Segment,
    StoreScanner,
};
use common::{describe, drain, expected_user_view, open, options, random_cells, NOW};

fn compact(
    info: &ScanInfo,
    scan_type: ScanType,
    segments: Vec<Vec<Cell>>,
    smallest_read_point: u64,
    earliest_put_ts: i64,
) -> Vec<String> {
    let cursors = segments
        .into_iter()
        .enumerate()
        .map(|(i, cells)| {
            let segment = Arc::new(Segment::from_cells(i as u64 + 1, cells));
            Box::new(segment.cursor()) as Box<dyn Cursor>
        })
        .collect();
    let scanner = StoreScanner::with_cursors(
        info,
        Scan::new().all_versions(),
        scan_type,
        cursors,
        smallest_read_point,
        earliest_put_ts,
        &options(),
    )
    .expect("open");
    describe(&drain(&scanner))
}

fn info() -> ScanInfo {
    ScanInfo::new("cf").max_versions(10)
}

fn shadowed_column(row: &'static str) -> Vec<Cell> {
    vec![
        Cell::put(row, "cf", "q", 7, "v7"),
        Cell::delete_column(row, "cf", "q", 6),
        Cell::put(row, "cf", "q", 5, "v5"),
    ]
}

#[test]
fn minor_compaction_keeps_markers_and_shadowed_cells() {
    let out = compact(
        &info(),
        ScanType::CompactionRetainDeletes,
        vec![shadowed_column("a")],
        u64::MAX,
        OLDEST_TIMESTAMP,
    );
    assert_eq!(out, vec!["a/q@7=v7", "a/q@6=DeleteColumn", "a/q@5=v5"]);
}

#[test]
fn major_compaction_applies_and_drops_markers() {
    let mut older = shadowed_column("a");
    let newer = older.split_off(1);
    let out = compact(
        &info(),
        ScanType::drop_all_deletes(),
        vec![older, newer],
        u64::MAX,
        OLDEST_TIMESTAMP,
    );
    assert_eq!(out, vec!["a/q@7=v7"]);
}

#[test]
fn partial_drop_range_retains_markers_outside_it() {
    let cells = ["a", "m", "q", "z"]
        .into_iter()
        .flat_map(|row| {
            [
                Cell::delete_column(row, "cf", "q", 6),
                Cell::put(row, "cf", "q", 5, "v5"),
            ]
        })
        .collect();
    let out = compact(
        &info(),
        ScanType::drop_deletes_in("m", "z"),
        vec![cells],
        u64::MAX,
        OLDEST_TIMESTAMP,
    );
    assert_eq!(out, vec!["a/q@6=DeleteColumn", "z/q@6=DeleteColumn"]);
}

#[test]
fn cells_above_the_read_point_are_kept_uncounted() {
    let info = ScanInfo::new("cf").max_versions(1);
    let cells = vec![
        Cell::put("a", "cf", "q", 9, "unseen").with_sequence(20),
        Cell::put("a", "cf", "q", 8, "counted").with_sequence(5),
        Cell::put("a", "cf", "q", 7, "capped").with_sequence(4),
        Cell::delete_column("b", "cf", "q", 10).with_sequence(30),
        Cell::put("b", "cf", "q", 6, "survives").with_sequence(3),
    ];
    let out = compact(&info, ScanType::drop_all_deletes(), vec![cells], 10, OLDEST_TIMESTAMP);
    assert_eq!(
        out,
        vec![
            "a/q@9=unseen",
            "a/q@8=counted",
            "b/q@10=DeleteColumn",
            "b/q@6=survives"
        ]
    );
}

#[test]
fn kept_deleted_cells_drop_markers_older_than_every_put() {
    let info = info().keep_deleted_cells(true);
    let cells = vec![
        Cell::delete_column("a", "cf", "q", 5),
        Cell::put("a", "cf", "q", 4, "v4"),
        Cell::delete_column("z", "cf", "q", 2),
    ];
    let out = compact(&info, ScanType::drop_all_deletes(), vec![cells], u64::MAX, 4);
    assert_eq!(out, vec!["a/q@5=DeleteColumn", "a/q@4=v4"]);
}

#[test]
fn young_markers_outlive_a_major_compaction() {
    let info = info().time_to_purge_deletes(Duration::from_millis(100));
    let cells = vec![
        Cell::delete_column("a", "cf", "q", NOW - 50),
        Cell::put("a", "cf", "q", NOW - 60, "shadowed"),
        Cell::delete_column("b", "cf", "q", NOW - 500),
        Cell::put("b", "cf", "q", NOW - 600, "shadowed"),
    ];
    let out = compact(&info, ScanType::drop_all_deletes(), vec![cells], u64::MAX, OLDEST_TIMESTAMP);
    assert_eq!(out, vec![format!("a/q@{}=DeleteColumn", NOW - 50)]);
}

#[test]
fn compaction_caps_versions_per_column() {
    let info = ScanInfo::new("cf").max_versions(2);
    let cells = (1..=5)
        .map(|ts| Cell::put("a", "cf", "q", ts, format!("v{ts}")))
        .collect();
    let out = compact(&info, ScanType::CompactionRetainDeletes, vec![cells], u64::MAX, OLDEST_TIMESTAMP);
    assert_eq!(out, vec!["a/q@5=v5", "a/q@4=v4"]);
}

#[test]
fn store_compaction_preserves_what_users_see() {
    let mut rng = fastrand::Rng::with_seed(42);
    let store = Arc::new(LocalStore::new());
    let cells = random_cells(&mut rng, 240);
    for (i, cell) in cells.iter().enumerate() {
        store.insert(cell.clone());
        if i % 60 == 59 {
            store.flush();
        }
    }
    assert_eq!(store.segments().len(), 4);
    let scan = || Scan::new().max_versions(3);
    let before = describe(&drain(&open(&store, &info(), scan(), &options())));
    assert_eq!(before, expected_user_view(&cells, 3));

    let ids: Vec<_> = store.segments().iter().map(|s| s.id()).collect();
    let merged = store
        .compact(&info(), &ids, ScanType::drop_all_deletes(), &options())
        .expect("compact")
        .expect("merged segment");
    assert_eq!(store.segments().len(), 1);
    assert!(merged.len() < cells.len());

    let after = describe(&drain(&open(&store, &info(), scan(), &options())));
    assert_eq!(after, before);
    let raw = drain(&open(&store, &info(), Scan::new().raw().all_versions(), &options()));
    assert!(raw.iter().all(|cell| !cell.is_delete()));
}

#[test]
fn compacting_unknown_segments_is_a_no_op() {
    let store = Arc::new(LocalStore::new());
    store.put("a", "cf", "q", 1, "v");
    store.flush();
    let out = store
        .compact(&info(), &[ulid::Ulid::new()], ScanType::drop_all_deletes(), &options())
        .expect("compact");
    assert!(out.is_none());
    assert_eq!(store.segments().len(), 1);
}
