use std::sync::{Arc, Barrier};
use std::thread;

use stdnet_rust::{Cursor, InMemoryRecordStore, RecordStore, StoreError, TransactionError};

use crate::support::{fields, users};

fn store() -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    store.register(users()).unwrap();
    store
}

#[test]
fn disjoint_cursors_commit_from_many_threads() {
    let store = store();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut cursor = Cursor::new(store);
                for i in 0..10 {
                    let name = format!("user-{n}-{i}");
                    cursor
                        .stage_put(
                            "users",
                            None,
                            fields(&[("name", &name)]),
                            vec![("name".into(), Some(name.clone()))],
                        )
                        .unwrap();
                }
                barrier.wait();
                cursor.commit()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 10);
    }
    assert_eq!(store.len("users").unwrap(), 80);
    assert_eq!(store.index_entries("users").unwrap(), 80);
}

#[test]
fn exactly_one_of_racing_writers_wins() {
    let store = store();
    let id = store.put("users", None, fields(&[("name", "seed")])).unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut cursor = Cursor::new(store);
                let name = format!("writer-{n}");
                cursor
                    .stage_put(
                        "users",
                        Some(id),
                        fields(&[("name", &name)]),
                        vec![("name".into(), Some(name.clone()))],
                    )
                    .unwrap();
                barrier.wait();
                cursor.commit()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            StoreError::Transaction(TransactionError::Conflict { .. })
        ));
    }

    let winner = store.get("users", id).unwrap();
    assert!(winner.get("name").unwrap().starts_with("writer-"));
    assert!(store.lookup("users", "name", "seed").unwrap().is_empty());
}

#[test]
fn retry_after_conflict_succeeds() {
    let store = store();
    let id = store.put("users", None, fields(&[("name", "a")])).unwrap();

    let mut stale = Cursor::new(store.clone());
    stale.stage_delete("users", id).unwrap();
    store.put("users", Some(id), fields(&[("name", "b")])).unwrap();
    assert!(stale.commit().unwrap_err().is_retryable());

    let mut fresh = Cursor::new(store.clone());
    fresh.stage_delete("users", id).unwrap();
    assert_eq!(fresh.commit().unwrap(), 1);
}
