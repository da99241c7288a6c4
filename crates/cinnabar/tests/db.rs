//! End-to-end tests over the full write → index → read lifecycle.

use std::path::{Path, PathBuf};

use cinnabar::{CinnabarError, Db, LogWriter, write_index};
use proptest::prelude::*;

/// Writes `size` keys, each with `i / 111 + 1` values:
/// `key.0042` → `val.0042.00`, `val.0042.01`, ...
fn write_test_log(dir: &Path, size: usize) -> PathBuf {
    let path = dir.join("test.ccl");
    let writer = LogWriter::create(&path).unwrap();
    for i in 0..size {
        let key = format!("key.{i:04}");
        for j in 0..=i / 111 {
            writer
                .put(key.as_bytes(), format!("val.{i:04}.{j:02}").as_bytes())
                .unwrap();
        }
    }
    writer.close().unwrap();
    path
}

fn write_test_log_and_index(dir: &Path, size: usize) -> (PathBuf, PathBuf) {
    let log_path = write_test_log(dir, size);
    let index_path = dir.join("test.cci");
    write_index(&index_path, &log_path).unwrap();
    (log_path, index_path)
}

fn get_strings(db: &Db, key: &str) -> Vec<String> {
    db.get(key.as_bytes())
        .unwrap()
        .all()
        .unwrap()
        .into_iter()
        .map(|v| String::from_utf8(v.to_vec()).unwrap())
        .collect()
}

#[test]
fn returns_every_value_in_write_order() {
    let tests: &[(&str, &[&str])] = &[
        ("", &[]),
        ("NOT FOUND", &[]),
        ("key.0000", &["val.0000.00"]),
        ("key.0001", &["val.0001.00"]),
        ("key.0011", &["val.0011.00"]),
        ("key.0110", &["val.0110.00"]),
        ("key.0111", &["val.0111.00", "val.0111.01"]),
        ("key.0200", &["val.0200.00", "val.0200.01"]),
        ("key.0300", &["val.0300.00", "val.0300.01", "val.0300.02"]),
        ("key.0306", &["val.0306.00", "val.0306.01", "val.0306.02"]),
        (
            "key.0400",
            &["val.0400.00", "val.0400.01", "val.0400.02", "val.0400.03"],
        ),
        (
            "key.0460",
            &[
                "val.0460.00",
                "val.0460.01",
                "val.0460.02",
                "val.0460.03",
                "val.0460.04",
            ],
        ),
    ];

    let dir = tempfile::tempdir().unwrap();
    let (log_path, index_path) = write_test_log_and_index(dir.path(), 500);
    let db = Db::open(&index_path, &log_path).unwrap();

    for (key, expected) in tests {
        assert_eq!(&get_strings(&db, key), expected, "for {key}");
    }
}

#[test]
fn resolves_checksum_collisions_by_full_key() {
    // Both keys hash to 1954791040; the probe alone cannot tell them apart.
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("coll.ccl");
    let index_path = dir.path().join("coll.cci");

    let writer = LogWriter::create(&log_path).unwrap();
    for i in 0..20 {
        writer
            .put(b"key.4985194", format!("va4.{i:04}").as_bytes())
            .unwrap();
        writer
            .put(b"key.5405800", format!("va5.{i:04}").as_bytes())
            .unwrap();
    }
    writer.write_index(&index_path).unwrap();
    writer.close().unwrap();

    let db = Db::open(&index_path, &log_path).unwrap();
    for (key, prefix) in [("key.4985194", "va4"), ("key.5405800", "va5")] {
        let values = get_strings(&db, key);
        assert_eq!(values.len(), 20, "for {key}");
        for (i, value) in values.iter().enumerate() {
            assert_eq!(value, &format!("{prefix}.{i:04}"));
        }
    }
}

#[test]
fn full_lifecycle_create_flush_append_index() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("db.ccl");
    let index_path = dir.path().join("db.cci");

    let writer = LogWriter::create(&log_path).unwrap();
    writer.put(b"key", b"value1").unwrap();
    writer.put(b"key", b"value2").unwrap();
    writer.flush().unwrap();
    writer.put(b"bar", b"other").unwrap();
    writer.write_index(&index_path).unwrap();
    writer.close().unwrap();

    let db = Db::open(&index_path, &log_path).unwrap();
    assert_eq!(get_strings(&db, "key"), ["value1", "value2"]);
    assert_eq!(get_strings(&db, "bar"), ["other"]);
    assert!(get_strings(&db, "missing").is_empty());
}

#[test]
fn reopened_logs_keep_accepting_appends() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("db.ccl");
    let index_path = dir.path().join("db.cci");

    let writer = LogWriter::create(&log_path).unwrap();
    writer.put(b"foo", b"value1").unwrap();
    writer.put(b"foo", b"value2").unwrap();
    writer.close().unwrap();

    let writer = LogWriter::append(&log_path).unwrap();
    writer.put(b"bar", b"othervalue").unwrap();
    writer.write_index(&index_path).unwrap();
    writer.close().unwrap();

    let db = Db::open(&index_path, &log_path).unwrap();
    assert_eq!(get_strings(&db, "foo"), ["value1", "value2"]);
    assert_eq!(get_strings(&db, "bar"), ["othervalue"]);
}

#[test]
fn unflushed_records_do_not_survive_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("db.ccl");
    let index_path = dir.path().join("db.cci");

    let writer = LogWriter::create(&log_path).unwrap();
    writer.put(b"durable", b"yes").unwrap();
    writer.flush().unwrap();
    writer.put(b"volatile", b"no").unwrap();
    // Crash: the buffered record and the advanced tail are lost.
    std::mem::forget(writer);

    let writer = LogWriter::append(&log_path).unwrap();
    writer.put(b"late", b"arrival").unwrap();
    writer.write_index(&index_path).unwrap();
    writer.close().unwrap();

    let db = Db::open(&index_path, &log_path).unwrap();
    assert_eq!(get_strings(&db, "durable"), ["yes"]);
    assert_eq!(get_strings(&db, "late"), ["arrival"]);
    assert!(get_strings(&db, "volatile").is_empty());
}

#[test]
fn index_and_log_from_different_runs_refuse_to_pair() {
    let dir = tempfile::tempdir().unwrap();
    let (_, index_path) = write_test_log_and_index(dir.path(), 5);

    let other_log = dir.path().join("other.ccl");
    let writer = LogWriter::create(&other_log).unwrap();
    writer.put(b"key", b"value").unwrap();
    writer.close().unwrap();

    let err = Db::open(&index_path, &other_log).unwrap_err();
    assert!(matches!(err, CinnabarError::HeadersDiffer { .. }));
}

#[test]
fn concurrent_gets_share_one_db() {
    let dir = tempfile::tempdir().unwrap();
    let (log_path, index_path) = write_test_log_and_index(dir.path(), 200);
    let db = Db::open(&index_path, &log_path).unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let db = &db;
            scope.spawn(move || {
                for i in (t..200).step_by(4) {
                    let key = format!("key.{i:04}");
                    let values = db.get(key.as_bytes()).unwrap().all().unwrap();
                    assert_eq!(values.len(), i / 111 + 1, "for {key}");
                }
            });
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every written record is reachable through a rebuilt index, and keys
    /// never written stay absent.
    #[test]
    fn every_record_survives_the_round_trip(
        entries in proptest::collection::vec(
            (
                proptest::collection::vec(any::<u8>(), 1..24),
                proptest::collection::vec(any::<u8>(), 1..48),
            ),
            1..64,
        ),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("gen.ccl");
        let index_path = dir.path().join("gen.cci");

        let writer = LogWriter::create(&log_path).unwrap();
        for (key, value) in &entries {
            writer.put(key, value).unwrap();
        }
        writer.write_index(&index_path).unwrap();
        writer.close().unwrap();

        let db = Db::open(&index_path, &log_path).unwrap();

        for (key, _) in &entries {
            let expected: Vec<&[u8]> = entries
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.as_slice())
                .collect();
            let got = db.get(key).unwrap().all().unwrap();
            prop_assert_eq!(got.len(), expected.len());
            for (got, expected) in got.iter().zip(expected) {
                prop_assert_eq!(&got[..], expected);
            }
        }

        let absent = db.get(b"never written, cannot collide by length").unwrap();
        prop_assert!(absent.all().unwrap().is_empty());
    }
}
