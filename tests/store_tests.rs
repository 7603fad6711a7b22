//! Store-level integration tests: CRUD, listing, migration, bulk, import,
//! and batch semantics against real databases.

mod common;

use serde_json::json;

use todo_api::ingest::{ImportMode, ImportRecord};
use todo_api::model::{BulkItem, TaskCreate, TaskPatch};
use todo_api::query::TaskFilters;
use todo_api::storage::{BatchOp, TaskStore};
use todo_api::TodoError;

fn store() -> TaskStore {
    common::init_test_logging();
    TaskStore::open_memory().unwrap()
}

fn create(store: &mut TaskStore, title: &str) -> i64 {
    store
        .create(&TaskCreate {
            title: title.to_string(),
            ..TaskCreate::default()
        })
        .unwrap()
        .id
}

#[test]
fn create_and_get_roundtrip() {
    let mut store = store();
    let task = store
        .create(&TaskCreate {
            title: "  Buy milk ".to_string(),
            notes: "2 liters".to_string(),
            tags: json!(["Home", "home", "errand"]),
            due: Some("2025-09-01".to_string()),
            ..TaskCreate::default()
        })
        .unwrap();

    assert_eq!(task.title, "Buy milk");
    assert!(!task.done);
    assert_eq!(task.tags, vec!["Home", "errand"]);
    assert_eq!(task.due.as_deref(), Some("2025-09-01"));
    assert!(!task.created_at.is_empty());

    let fetched = store.get(task.id).unwrap().unwrap();
    assert_eq!(fetched, task);
}

#[test]
fn create_rejects_blank_title_and_bad_due() {
    let mut store = store();
    let blank = store.create(&TaskCreate {
        title: "   ".to_string(),
        ..TaskCreate::default()
    });
    assert!(matches!(blank, Err(TodoError::Validation(_))));

    let bad_due = store.create(&TaskCreate {
        title: "x".to_string(),
        due: Some("tomorrow".to_string()),
        ..TaskCreate::default()
    });
    assert!(matches!(bad_due, Err(TodoError::Validation(_))));
}

#[test]
fn patch_updates_fields_and_accepts_legacy_done() {
    let mut store = store();
    let id = create(&mut store, "task");

    let task = store
        .patch(
            id,
            &TaskPatch {
                title: Some("renamed".to_string()),
                done: Some(json!("yes")),
                tags: Some(json!("home, urgent")),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    assert_eq!(task.title, "renamed");
    assert!(task.done);
    assert_eq!(task.tags, vec!["home", "urgent"]);
}

#[test]
fn patch_missing_task_is_not_found() {
    let mut store = store();
    let result = store.patch(
        999,
        &TaskPatch {
            title: Some("x".to_string()),
            ..TaskPatch::default()
        },
    );
    assert!(matches!(result, Err(TodoError::NotFound { id: 999 })));
}

#[test]
fn delete_is_idempotent() {
    let mut store = store();
    let id = create(&mut store, "ephemeral");
    assert!(store.delete(id).unwrap());
    assert!(!store.delete(id).unwrap());
    assert!(store.get(id).unwrap().is_none());
}

#[test]
fn list_defaults_to_newest_first() {
    let mut store = store();
    let a = create(&mut store, "a");
    let b = create(&mut store, "b");
    let c = create(&mut store, "c");

    let ids: Vec<i64> = store
        .list(&TaskFilters::default())
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec![c, b, a]);
}

#[test]
fn list_prefilters_done_and_due_range() {
    let mut store = store();
    for (title, due) in [
        ("jan", Some("2025-01-15")),
        ("mar", Some("2025-03-15")),
        ("none", None),
    ] {
        store
            .create(&TaskCreate {
                title: title.to_string(),
                due: due.map(str::to_string),
                ..TaskCreate::default()
            })
            .unwrap();
    }

    let filters = TaskFilters::from_query("due_before=2025-02-01").unwrap();
    let out = store.list(&filters).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "jan");

    let filters = TaskFilters::from_query("due_after=2025-02-01").unwrap();
    let out = store.list(&filters).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "mar");
}

#[test]
fn legacy_database_gains_columns_on_open() {
    common::init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("legacy.db");

    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE tasks (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 title TEXT NOT NULL,
                 completed INTEGER NOT NULL DEFAULT 0
             );
             INSERT INTO tasks (title, completed) VALUES ('old done', 1);
             INSERT INTO tasks (title, completed) VALUES ('old open', 0);",
        )
        .unwrap();
    }

    let store = TaskStore::open(&db).unwrap();
    let tasks = store.list(&TaskFilters::default()).unwrap();
    assert_eq!(tasks.len(), 2);
    let done: Vec<&str> = tasks
        .iter()
        .filter(|t| t.done)
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(done, vec!["old done"]);
    // New columns readable and defaulted.
    assert!(tasks.iter().all(|t| t.tags.is_empty()));
}

#[test]
fn bulk_patch_skips_missing_ids() {
    let mut store = store();
    let id = create(&mut store, "real");

    let report = store
        .bulk_patch(&[
            BulkItem {
                id,
                done: Some(json!(true)),
                notes: None,
                description: None,
                tags: None,
                due: None,
            },
            BulkItem {
                id: 12345,
                done: Some(json!(true)),
                notes: None,
                description: None,
                tags: None,
                due: None,
            },
        ])
        .unwrap();

    assert!(report.ok);
    assert_eq!(report.updated, 1);
    assert_eq!(report.missing, 1);
    assert!(store.get(id).unwrap().unwrap().done);
}

#[test]
fn bulk_patch_rejects_empty_list() {
    let mut store = store();
    assert!(matches!(
        store.bulk_patch(&[]),
        Err(TodoError::BadRequest(_))
    ));
}

fn record(value: serde_json::Value) -> ImportRecord {
    serde_json::from_value(value).unwrap()
}

#[test]
fn import_insert_ignores_id_collisions() {
    let mut store = store();
    let id = create(&mut store, "existing");

    let records = vec![
        (1, record(json!({ "id": id, "title": "clash" }))),
        (2, record(json!({ "title": "fresh" }))),
    ];
    let report = store
        .import_records(&records, Vec::new(), ImportMode::Insert)
        .unwrap();

    assert!(report.ok);
    assert_eq!(report.processed, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.ignored, 1);
    // Collision left the existing row untouched.
    assert_eq!(store.get(id).unwrap().unwrap().title, "existing");
}

#[test]
fn import_update_ignores_unknown_ids() {
    let mut store = store();
    let id = create(&mut store, "existing");

    let records = vec![
        (1, record(json!({ "id": id, "done": 1 }))),
        (2, record(json!({ "id": 999, "title": "ghost" }))),
    ];
    let report = store
        .import_records(&records, Vec::new(), ImportMode::Update)
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.ignored, 1);
    assert!(store.get(id).unwrap().unwrap().done);
}

#[test]
fn import_upsert_updates_or_inserts() {
    let mut store = store();
    let id = create(&mut store, "existing");

    let records = vec![
        (1, record(json!({ "id": id, "title": "renamed" }))),
        (2, record(json!({ "title": "brand new", "tags": "a b" }))),
    ];
    let report = store
        .import_records(&records, Vec::new(), ImportMode::Upsert)
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(store.get(id).unwrap().unwrap().title, "renamed");
}

#[test]
fn import_replace_overwrites_whole_row() {
    let mut store = store();
    let task = store
        .create(&TaskCreate {
            title: "with notes".to_string(),
            notes: "keep?".to_string(),
            ..TaskCreate::default()
        })
        .unwrap();

    let records = vec![(1, record(json!({ "id": task.id, "title": "replaced" })))];
    let report = store
        .import_records(&records, Vec::new(), ImportMode::Replace)
        .unwrap();

    assert_eq!(report.replaced, 1);
    let replaced = store.get(task.id).unwrap().unwrap();
    assert_eq!(replaced.title, "replaced");
    assert_eq!(replaced.notes, "");
}

#[test]
fn import_report_counts_balance() {
    let mut store = store();
    let records = vec![
        (1, record(json!({ "title": "a" }))),
        (2, record(json!({ "done": 1 }))), // no title, no id: row error
        (3, record(json!({ "title": "b", "due": "not-a-date" }))), // row error
    ];
    let report = store
        .import_records(&records, Vec::new(), ImportMode::Upsert)
        .unwrap();

    assert!(!report.ok);
    assert_eq!(report.processed, 3);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(
        report.inserted + report.updated + report.replaced + report.ignored,
        report.processed - report.errors.len() as u64
    );
}

#[test]
fn import_honors_supplied_timestamps() {
    let mut store = store();
    let records = vec![(
        1,
        record(json!({
            "title": "restored",
            "created_at": "2020-01-01 00:00:00",
            "updated_at": "2020-06-01 00:00:00"
        })),
    )];
    store
        .import_records(&records, Vec::new(), ImportMode::Upsert)
        .unwrap();

    let tasks = store.list(&TaskFilters::default()).unwrap();
    assert_eq!(tasks[0].created_at, "2020-01-01 00:00:00");
    assert_eq!(tasks[0].updated_at, "2020-06-01 00:00:00");
}

fn op(value: serde_json::Value) -> BatchOp {
    serde_json::from_value(value).unwrap()
}

#[test]
fn atomic_batch_rolls_back_on_first_failure() {
    let mut store = store();
    let id = create(&mut store, "victim");

    let report = store
        .batch(
            &[
                op(json!({ "op": "patch", "id": id, "set": { "title": "changed" } })),
                op(json!({ "op": "delete", "id": 999 })),
            ],
            true,
        )
        .unwrap();

    assert!(!report.ok);
    assert!(report.rolled_back);
    assert!(report.results.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].idx, 1);
    // First op undone.
    assert_eq!(store.get(id).unwrap().unwrap().title, "victim");
}

#[test]
fn non_atomic_batch_keeps_successes() {
    let mut store = store();
    let id = create(&mut store, "victim");

    let report = store
        .batch(
            &[
                op(json!({ "op": "patch", "id": id, "set": { "done": true } })),
                op(json!({ "op": "delete", "id": 999 })),
                op(json!({ "op": "explode", "id": id })),
            ],
            false,
        )
        .unwrap();

    assert!(!report.ok);
    assert!(!report.rolled_back);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.errors.len(), 2);
    assert!(store.get(id).unwrap().unwrap().done);
}

#[test]
fn aggregate_counts_and_tags() {
    let mut store = store();
    store
        .create(&TaskCreate {
            title: "overdue".to_string(),
            tags: json!(["home"]),
            due: Some("2020-01-01".to_string()),
            ..TaskCreate::default()
        })
        .unwrap();
    store
        .create(&TaskCreate {
            title: "future".to_string(),
            tags: json!(["home", "errand"]),
            due: Some("2099-01-01".to_string()),
            ..TaskCreate::default()
        })
        .unwrap();
    let done_id = create(&mut store, "finished");
    store
        .patch(
            done_id,
            &TaskPatch {
                done: Some(json!(true)),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let counts = store.count_aggregate().unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.done, 1);
    assert_eq!(counts.open, 2);
    assert_eq!(counts.overdue, 1);

    let by_tag = store.tag_counts(false).unwrap();
    assert_eq!(by_tag.get("home"), Some(&2));
    assert_eq!(by_tag.get("errand"), Some(&1));

    assert_eq!(store.recent_done_24h().unwrap(), 1);
}

#[test]
fn text_search_is_accent_insensitive() {
    let mut store = store();
    create(&mut store, "Çay demle");
    create(&mut store, "Buy milk");

    let filters = TaskFilters::from_query("q=cay").unwrap();
    let out = store.list(&filters).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Çay demle");
}

#[test]
fn text_search_matches_mid_word_substrings() {
    let mut store = store();
    create(&mut store, "Buy milk");
    create(&mut store, "Çay demle");

    let filters = TaskFilters::from_query("q=ilk").unwrap();
    let out = store.list(&filters).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Buy milk");
}

#[test]
fn listing_skips_rows_with_null_title() {
    common::init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("corrupt.db");

    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE tasks (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 title TEXT
             );
             INSERT INTO tasks (title) VALUES (NULL);
             INSERT INTO tasks (title) VALUES ('healthy');",
        )
        .unwrap();
    }

    let store = TaskStore::open(&db).unwrap();
    let tasks = store.list(&TaskFilters::default()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "healthy");
}
