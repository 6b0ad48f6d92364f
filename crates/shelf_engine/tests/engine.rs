//! End-to-end tests for the engine through its public API.

use shelf_engine::{
    Config, Connection, CursorDirection, EngineError, EngineResult, Factory, IndexOptions, Key,
    KeyRange, Request, TransactionMode, Value,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn done<T>(request: Request<T>) -> EngineResult<T> {
    request.into_result().expect("request completed")
}

fn person(name: &str, email: &str, tags: &[&str]) -> Value {
    Value::object([
        ("name", Value::from(name)),
        ("email", Value::from(email)),
        (
            "tags",
            Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
        ),
    ])
}

fn open_people(factory: &Factory) -> Connection {
    done(factory.open("people", Some(1), |_, txn| {
        let mut store = txn.create_object_store("people")?;
        store.create_index("by_email", "email", IndexOptions::new().unique(true))?;
        store.create_index("by_tag", "tags", IndexOptions::new().multi_entry(true))?;
        store.create_index("by_name", "name", IndexOptions::new())
    }))
    .unwrap()
}

fn seed(conn: &Connection) {
    let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    let store = txn.object_store();
    done(store.put(1, person("ada", "ada@example.com", &["math", "code"]))).unwrap();
    done(store.put(2, person("bob", "bob@example.com", &["code"]))).unwrap();
    done(store.put(3, person("cy", "cy@example.com", &[]))).unwrap();
    done(store.put(4, person("ada", "ada2@example.com", &["art"]))).unwrap();
    done(txn.commit()).unwrap();
}

fn journal_file(dir: &Path) -> std::path::PathBuf {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.extension().is_some_and(|ext| ext == "jnl"))
        .expect("journal file")
}

#[test]
fn unique_index_violation_aborts_transaction() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    let store = txn.object_store();
    done(store.put(10, person("eve", "eve@example.com", &[]))).unwrap();
    let clash = done(store.put(11, person("mal", "ada@example.com", &[])));
    assert!(matches!(clash, Err(EngineError::Constraint { .. })));

    assert!(!txn.is_active());
    assert!(matches!(
        done(store.get(10)),
        Err(EngineError::TransactionInactive)
    ));
    assert!(matches!(done(txn.commit()), Err(EngineError::Aborted)));

    let read = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(read.object_store().count(None)).unwrap(), 4);
    assert_eq!(done(read.object_store().get(10)).unwrap(), None);
}

#[test]
fn add_refuses_existing_key() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    let result = done(txn.object_store().add(1, person("x", "x@example.com", &[])));
    assert!(matches!(result, Err(EngineError::Constraint { .. })));
}

#[test]
fn index_lookups() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let store = txn.object_store();
    assert_eq!(
        store.index_names().unwrap(),
        vec!["by_email", "by_name", "by_tag"]
    );

    let by_email = store.index("by_email").unwrap();
    let bob = done(by_email.get(Key::from("bob@example.com"))).unwrap().unwrap();
    assert_eq!(bob.get("name"), Some(&Value::from("bob")));
    assert_eq!(
        done(by_email.get_key(Key::from("cy@example.com"))).unwrap(),
        Some(Key::from(3))
    );

    let by_name = store.index("by_name").unwrap();
    assert_eq!(
        done(by_name.get_all_keys(Some(KeyRange::only("ada")))).unwrap(),
        vec![Key::from(1), Key::from(4)]
    );
    assert_eq!(done(by_name.count(None)).unwrap(), 4);

    let by_tag = store.index("by_tag").unwrap();
    assert!(by_tag.meta().unwrap().options.multi_entry);
    assert_eq!(
        done(by_tag.get_all_keys(Some(KeyRange::only("code")))).unwrap(),
        vec![Key::from(1), Key::from(2)]
    );
    // Four tag entries over three records; the empty array adds none
    assert_eq!(done(by_tag.count(None)).unwrap(), 4);

    assert!(matches!(
        store.index("missing"),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn index_cursor_directions() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let by_name = txn.object_store().index("by_name").unwrap();

    let collect = |direction| {
        let mut seen = Vec::new();
        let mut cursor = done(by_name.open_cursor(None, direction)).unwrap();
        while let Some(c) = cursor {
            seen.push(c.primary_key().as_number().unwrap() as i64);
            cursor = done(c.step()).unwrap();
        }
        seen
    };

    assert_eq!(collect(CursorDirection::Next), vec![1, 4, 2, 3]);
    assert_eq!(collect(CursorDirection::Prev), vec![3, 2, 4, 1]);
    assert_eq!(collect(CursorDirection::NextUnique), vec![1, 2, 3]);
    assert_eq!(collect(CursorDirection::PrevUnique), vec![3, 2, 1]);
}

#[test]
fn store_cursor_update_and_delete() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    let mut cursor = done(
        txn.object_store()
            .open_cursor(Some(KeyRange::lower_bound(2, false)), CursorDirection::Next),
    )
    .unwrap();
    while let Some(mut c) = cursor {
        if c.primary_key() == &Key::from(3) {
            done(c.delete()).unwrap();
        } else {
            let mut value = c.value().clone();
            value.set("name", Value::from("renamed"));
            assert_eq!(done(c.update(value)).unwrap(), c.primary_key().clone());
        }
        cursor = done(c.step()).unwrap();
    }
    done(txn.commit()).unwrap();

    let read = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let store = read.object_store();
    assert_eq!(
        done(store.get_all_keys(None)).unwrap(),
        vec![Key::from(1), Key::from(2), Key::from(4)]
    );
    let names: Vec<Value> = done(store.get_all(None))
        .unwrap()
        .into_iter()
        .filter_map(|v| v.get("name").cloned())
        .collect();
    assert_eq!(
        names,
        vec![Value::from("ada"), Value::from("renamed"), Value::from("renamed")]
    );
}

#[test]
fn exhausted_write_cursor_commits_when_it_owns_the_transaction() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let mut cursor = done(
        conn.transaction("people", TransactionMode::ReadWrite)
            .unwrap()
            .object_store()
            .open_cursor(None, CursorDirection::Next),
    )
    .unwrap();
    while let Some(c) = cursor {
        done(c.delete()).unwrap();
        cursor = done(c.step()).unwrap();
    }

    let read = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(read.object_store().count(None)).unwrap(), 0);
}

#[test]
fn exhausted_write_cursor_leaves_a_shared_transaction_open() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    let mut cursor = done(txn.object_store().open_cursor(None, CursorDirection::Next)).unwrap();
    while let Some(c) = cursor {
        done(c.delete()).unwrap();
        cursor = done(c.step()).unwrap();
    }
    assert!(txn.is_active());
    txn.abort();

    let read = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(read.object_store().count(None)).unwrap(), 4);
}

#[test]
fn advance_skips_and_rejects_zero() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let cursor = done(txn.object_store().open_cursor(None, CursorDirection::Prev))
        .unwrap()
        .unwrap();
    assert_eq!(cursor.key(), &Key::from(4));
    let cursor = done(cursor.advance(2)).unwrap().unwrap();
    assert_eq!(cursor.key(), &Key::from(2));
    assert!(matches!(
        done(cursor.advance(0)),
        Err(EngineError::Data { .. })
    ));
}

#[test]
fn read_only_transactions_see_a_snapshot() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let reader = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let writer = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    done(writer.object_store().clear()).unwrap();
    done(writer.commit()).unwrap();

    assert_eq!(done(reader.object_store().count(None)).unwrap(), 4);
    assert!(matches!(
        done(reader.object_store().put(9, Value::Null)),
        Err(EngineError::ReadOnly)
    ));

    let fresh = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(fresh.object_store().count(None)).unwrap(), 0);
}

#[test]
fn dropped_transaction_discards_writes() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    {
        let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
        done(txn.object_store().put(1, person("a", "a@example.com", &[]))).unwrap();
    }
    let aborted = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    done(aborted.object_store().put(2, person("b", "b@example.com", &[]))).unwrap();
    aborted.abort();
    assert!(matches!(done(aborted.commit()), Err(EngineError::Aborted)));

    let read = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(read.object_store().count(None)).unwrap(), 0);
}

#[test]
fn concurrent_writers_both_commit() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);

    let first = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    let second = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
    done(first.object_store().put(1, person("a", "a@example.com", &[]))).unwrap();
    done(second.object_store().put(2, person("b", "b@example.com", &[]))).unwrap();
    done(first.commit()).unwrap();
    done(second.commit()).unwrap();

    let read = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(read.object_store().count(None)).unwrap(), 2);
}

#[test]
fn ranges_and_deletes() {
    let factory = Factory::in_memory();
    let conn = done(factory.open("nums", Some(1), |_, txn| {
        txn.create_object_store("n").map(|_| ())
    }))
    .unwrap();

    let txn = conn.transaction("n", TransactionMode::ReadWrite).unwrap();
    let store = txn.object_store();
    for i in 0..10 {
        done(store.put(i, Value::from(i * i))).unwrap();
    }
    let range = KeyRange::bound(3, 6, false, true).unwrap();
    assert_eq!(done(store.count(Some(range.clone()))).unwrap(), 3);
    assert_eq!(
        done(store.get_all(Some(range.clone()))).unwrap(),
        vec![Value::from(9), Value::from(16), Value::from(25)]
    );
    done(store.delete(range)).unwrap();
    assert_eq!(done(store.count(None)).unwrap(), 7);
    done(store.delete(Key::from(0))).unwrap();
    assert_eq!(done(store.get(0)).unwrap(), None);
    done(txn.commit()).unwrap();

    assert!(matches!(
        KeyRange::bound(5, 1, false, false),
        Err(EngineError::Data { .. })
    ));
    assert!(matches!(
        KeyRange::bound(5, 5, true, false),
        Err(EngineError::Data { .. })
    ));
}

#[test]
fn handlers_receive_outcomes() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);

    let hits = Arc::new(AtomicUsize::new(0));
    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();

    let request = txn.object_store().count(None);
    let sink = Arc::clone(&hits);
    request.on_success(move |n| {
        sink.fetch_add(n as usize, Ordering::SeqCst);
    });

    let request = txn.object_store().put(7, Value::Null);
    let sink = Arc::clone(&hits);
    request.on_error(move |err| {
        assert!(matches!(err, EngineError::ReadOnly));
        sink.fetch_add(100, Ordering::SeqCst);
    });

    assert_eq!(hits.load(Ordering::SeqCst), 104);
}

#[test]
fn upgrade_migrates_existing_data() {
    let factory = Factory::in_memory();
    let conn = open_people(&factory);
    seed(&conn);
    conn.close();

    let conn = done(factory.open("people", Some(2), |event, txn| {
        assert_eq!(event.old_version, 1);
        let mut store = txn.object_store("people")?;
        store.delete_index("by_name")?;
        store.create_index("by_name", "name", IndexOptions::new().unique(true))
    }));
    // Two records are named "ada"
    assert!(matches!(conn, Err(EngineError::UpgradeAborted { .. })));

    let conn = factory.open_existing("people").into_result().unwrap().unwrap();
    assert_eq!(conn.version(), 1);
    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let meta = txn.object_store().index("by_name").unwrap().meta().unwrap();
    assert!(!meta.options.unique);
}

#[test]
fn file_backend_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let factory = Factory::open_dir(dir.path(), Config::default()).unwrap();
        let conn = open_people(&factory);
        seed(&conn);
    }

    let factory = Factory::open_dir(dir.path(), Config::default()).unwrap();
    let infos = done(factory.databases().unwrap()).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].name, "people");
    assert_eq!(infos[0].version, 1);

    let conn = done(factory.open_existing("people")).unwrap();
    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    let by_tag = txn.object_store().index("by_tag").unwrap();
    assert_eq!(
        done(by_tag.get_all_keys(Some(KeyRange::only("code")))).unwrap(),
        vec![Key::from(1), Key::from(2)]
    );
}

#[test]
fn torn_tail_is_dropped_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let factory = Factory::open_dir(dir.path(), Config::default()).unwrap();
        let conn = open_people(&factory);
        seed(&conn);
    }

    let path = journal_file(dir.path());
    let good_len = std::fs::metadata(&path).unwrap().len();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"SHJ1\x02\xff\xff").unwrap();
    drop(file);

    {
        let factory = Factory::open_dir(dir.path(), Config::default()).unwrap();
        let conn = done(factory.open_existing("people")).unwrap();
        let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
        assert_eq!(done(txn.object_store().count(None)).unwrap(), 4);
    }
    assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
}

#[test]
fn compaction_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().compaction_threshold(4).sync_on_commit(false);
    {
        let factory = Factory::open_dir(dir.path(), config.clone()).unwrap();
        let conn = open_people(&factory);
        for i in 0..10 {
            let txn = conn.transaction("people", TransactionMode::ReadWrite).unwrap();
            let email = format!("user{i}@example.com");
            done(txn.object_store().put(i, person("u", &email, &["t"]))).unwrap();
            done(txn.commit()).unwrap();
        }
    }

    let factory = Factory::open_dir(dir.path(), config).unwrap();
    let conn = done(factory.open_existing("people")).unwrap();
    let txn = conn.transaction("people", TransactionMode::ReadOnly).unwrap();
    assert_eq!(done(txn.object_store().count(None)).unwrap(), 10);
    let by_email = txn.object_store().index("by_email").unwrap();
    assert_eq!(
        done(by_email.get_key(Key::from("user7@example.com"))).unwrap(),
        Some(Key::from(7))
    );
}
