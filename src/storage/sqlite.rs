//! `SQLite` task store.
//!
//! Owns the single `tasks` table and everything transactional: row-level
//! CRUD, bulk patching, import application, and the ordered batch engine.
//! Mutations run through [`TaskStore::mutate`], which wraps the closure in an
//! immediate transaction and commits on success.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use rusqlite::{Connection, Row, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, TodoError};
use crate::ingest::{ImportMode, ImportRecord, ImportReport, NumberedRecord, RowError, RowOutcome};
use crate::model::{self, Task, TaskCreate, TaskPatch};
use crate::query::{self, TaskFilters};
use crate::storage::{fts, schema::apply_schema};
use crate::tags;

/// SQLite-backed task store. One instance wraps one connection; the service
/// opens a fresh instance per request (WAL plus the `user_version` fast path
/// make reopening cheap).
#[derive(Debug)]
pub struct TaskStore {
    conn: Connection,
}

/// Aggregate counters for `/metrics`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AggregateCounts {
    pub total: u64,
    pub done: u64,
    pub open: u64,
    pub overdue: u64,
}

/// Result of a bulk partial update.
#[derive(Debug, Serialize)]
pub struct BulkReport {
    pub ok: bool,
    /// Rows actually updated.
    pub updated: u64,
    /// Referenced ids that did not exist (skipped, not errors).
    pub missing: u64,
}

/// One operation of a `POST /batch` request.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchOp {
    pub op: String,
    pub id: Option<i64>,
    #[serde(default)]
    pub set: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct BatchOpResult {
    pub idx: usize,
    pub op: String,
    pub id: i64,
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchOpError {
    pub idx: usize,
    pub op: Option<String>,
    pub id: Option<i64>,
    pub error: String,
}

/// Outcome of a batch call. In atomic mode a failure means nothing
/// persisted (`rolled_back` is set); in non-atomic mode `results` and
/// `errors` partition the ops.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub ok: bool,
    pub atomic: bool,
    pub rolled_back: bool,
    pub results: Vec<BatchOpResult>,
    pub errors: Vec<BatchOpError>,
}

impl TaskStore {
    /// Open (or create) the database at the given path and ensure the schema
    /// and full-text index are in place.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        fts::ensure(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        fts::ensure(&conn)?;
        Ok(Self { conn })
    }

    /// Whether the full-text index is live on this connection's database.
    #[must_use]
    pub fn fts_available(&self) -> bool {
        fts::available(&self.conn)
    }

    /// Rebuild the full-text index from the tasks table. Returns `false`
    /// when the FTS5 extension is unavailable (graceful degradation, not an
    /// error).
    pub fn fts_rebuild(&mut self) -> Result<bool> {
        fts::rebuild(&self.conn)
    }

    /// Run a mutation inside one immediate transaction.
    pub fn mutate<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Create a new task. Blank titles and malformed due dates are
    /// validation errors; tags are normalized to the canonical form.
    pub fn create(&mut self, input: &TaskCreate) -> Result<Task> {
        let title = model::validate_title(&input.title)?;
        if let Some(ref due) = input.due {
            model::validate_due(due)?;
        }
        let tag_list = tags::decode(&input.tags);
        let now = model::now_stamp();

        let id = self.mutate(|tx| {
            tx.execute(
                "INSERT INTO tasks (title, notes, description, tags, done, due, created_at, updated_at)
                 VALUES (?, ?, ?, ?, 0, ?, ?, ?)",
                rusqlite::params![
                    title,
                    input.notes,
                    input.description,
                    tags::encode(&tag_list),
                    normalize_due(input.due.as_deref()),
                    now,
                    now,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        self.get(id)?.ok_or(TodoError::NotFound { id })
    }

    /// Get a task by id.
    pub fn get(&self, id: i64) -> Result<Option<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, notes, description, tags, done, due, created_at, updated_at
             FROM tasks WHERE id = ?",
        )?;
        let result = stmt.query_row([id], task_from_row);
        match result {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List tasks under the full filter/sort/pagination contract.
    pub fn list(&self, filters: &TaskFilters) -> Result<Vec<Task>> {
        let rows = self.fetch_filtered(filters)?;
        Ok(query::apply(rows, filters))
    }

    /// SQL prefilter: done flag and due range go to the store; text and tag
    /// filtering stay application-side. Corrupt rows are logged and skipped,
    /// never fatal.
    fn fetch_filtered(&self, filters: &TaskFilters) -> Result<Vec<Task>> {
        let mut sql = String::from(
            "SELECT id, title, notes, description, tags, done, due, created_at, updated_at
             FROM tasks WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(done) = filters.done {
            sql.push_str(" AND done = ?");
            params.push(Box::new(i64::from(done)));
        }
        if let Some(ref bound) = filters.due_before {
            sql.push_str(" AND due IS NOT NULL AND due <> '' AND due < ?");
            params.push(Box::new(bound.clone()));
        }
        if let Some(ref bound) = filters.due_after {
            sql.push_str(" AND due IS NOT NULL AND due <> '' AND due > ?");
            params.push(Box::new(bound.clone()));
        }
        let _ = write!(sql, " ORDER BY id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            let id: Option<i64> = row.get("id").ok();
            match task_from_row(row) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(id = ?id, error = %e, "skipping task row with invalid data");
                }
            }
        }
        Ok(tasks)
    }

    /// Apply a partial update. Omitted fields keep their prior value;
    /// `updated_at` always refreshes.
    pub fn patch(&mut self, id: i64, patch: &TaskPatch) -> Result<Task> {
        self.mutate(|tx| patch_in_tx(tx, id, patch))?;
        self.get(id)?.ok_or(TodoError::NotFound { id })
    }

    /// Idempotent delete. Returns whether a row existed.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        self.mutate(|tx| {
            let rows = tx.execute("DELETE FROM tasks WHERE id = ?", [id])?;
            Ok(rows > 0)
        })
    }

    /// Aggregate counters: total, done, open, and overdue (not done with a
    /// due date in the past).
    pub fn count_aggregate(&self) -> Result<AggregateCounts> {
        // SQLite integers come back as i64; counts are never negative.
        let (total, done): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN done = 1 THEN 1 ELSE 0 END), 0) FROM tasks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let overdue: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE done = 0 AND due IS NOT NULL AND due <> '' AND due < ?",
            [model::now_stamp()],
            |row| row.get(0),
        )?;
        let total = u64::try_from(total).unwrap_or_default();
        let done = u64::try_from(done).unwrap_or_default();
        Ok(AggregateCounts {
            total,
            done,
            open: total.saturating_sub(done),
            overdue: u64::try_from(overdue).unwrap_or_default(),
        })
    }

    /// Per-tag task counts, optionally restricted to open tasks. Sorted by
    /// tag for deterministic rendering.
    pub fn tag_counts(&self, only_open: bool) -> Result<BTreeMap<String, u64>> {
        let sql = if only_open {
            "SELECT tags FROM tasks WHERE done = 0"
        } else {
            "SELECT tags FROM tasks"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let raw: Option<String> = row.get(0)?;
            for tag in tags::decode_text(raw.as_deref().unwrap_or_default()) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Tasks marked done within the last 24 hours (by `updated_at`).
    pub fn recent_done_24h(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE done = 1 AND updated_at >= datetime('now', '-1 day')",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Bulk partial update: existing rows are patched, missing ids are
    /// skipped and counted. One transaction for the whole list.
    pub fn bulk_patch(&mut self, items: &[crate::model::BulkItem]) -> Result<BulkReport> {
        if items.is_empty() {
            return Err(TodoError::bad_request("Empty list"));
        }
        self.mutate(|tx| {
            let mut updated = 0;
            let mut missing = 0;
            for item in items {
                let exists: bool = tx
                    .prepare("SELECT 1 FROM tasks WHERE id = ?")?
                    .exists([item.id])?;
                if !exists {
                    missing += 1;
                    continue;
                }
                let patch = TaskPatch {
                    title: None,
                    notes: item.notes.clone(),
                    description: item.description.clone(),
                    tags: item.tags.clone(),
                    done: item.done.clone(),
                    due: item.due.clone(),
                };
                if patch.is_empty() {
                    continue;
                }
                patch_in_tx(tx, item.id, &patch)?;
                updated += 1;
            }
            Ok(BulkReport {
                ok: true,
                updated,
                missing,
            })
        })
    }

    /// Apply import records under the given mode, all in one transaction.
    /// Row-level failures land in the report; only storage faults abort.
    pub fn import_records(
        &mut self,
        records: &[NumberedRecord],
        parse_errors: Vec<RowError>,
        mode: ImportMode,
    ) -> Result<ImportReport> {
        let mut report = ImportReport {
            ok: true,
            processed: (records.len() + parse_errors.len()) as u64,
            errors: parse_errors,
            ..ImportReport::default()
        };

        self.mutate(|tx| {
            for (line, record) in records {
                match apply_import_record(tx, record, mode) {
                    Ok(outcome) => report.record(outcome),
                    Err(TodoError::Validation(msg) | TodoError::BadRequest(msg)) => {
                        report.errors.push(RowError {
                            line: *line,
                            error: msg,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })?;

        report.ok = report.errors.is_empty();
        Ok(report)
    }

    /// Execute an ordered batch of patch/delete operations.
    ///
    /// Atomic mode runs everything in one transaction and rolls the whole
    /// batch back on the first failure. Non-atomic mode gives each op its
    /// own transaction and collects failures as it goes.
    pub fn batch(&mut self, ops: &[BatchOp], atomic: bool) -> Result<BatchReport> {
        let mut results = Vec::new();
        let mut errors = Vec::new();

        if atomic {
            let outcome = self.mutate(|tx| {
                for (idx, op) in ops.iter().enumerate() {
                    match apply_batch_op(tx, op) {
                        Ok(()) => results.push(BatchOpResult {
                            idx,
                            op: op.op.clone(),
                            id: op.id.unwrap_or_default(),
                            ok: true,
                        }),
                        Err(e) => {
                            errors.push(BatchOpError {
                                idx,
                                op: Some(op.op.clone()),
                                id: op.id,
                                error: e.to_string(),
                            });
                            // Abort the transaction; mutate rolls back.
                            return Err(e);
                        }
                    }
                }
                Ok(())
            });
            return match outcome {
                Ok(()) => Ok(BatchReport {
                    ok: true,
                    atomic: true,
                    rolled_back: false,
                    results,
                    errors,
                }),
                Err(TodoError::Storage(e)) => Err(TodoError::Storage(e)),
                Err(_) => Ok(BatchReport {
                    ok: false,
                    atomic: true,
                    rolled_back: true,
                    results: Vec::new(),
                    errors,
                }),
            };
        }

        for (idx, op) in ops.iter().enumerate() {
            let applied = self.mutate(|tx| apply_batch_op(tx, op));
            match applied {
                Ok(()) => results.push(BatchOpResult {
                    idx,
                    op: op.op.clone(),
                    id: op.id.unwrap_or_default(),
                    ok: true,
                }),
                Err(TodoError::Storage(e)) => return Err(TodoError::Storage(e)),
                Err(e) => errors.push(BatchOpError {
                    idx,
                    op: Some(op.op.clone()),
                    id: op.id,
                    error: e.to_string(),
                }),
            }
        }
        Ok(BatchReport {
            ok: errors.is_empty(),
            atomic: false,
            rolled_back: false,
            results,
            errors,
        })
    }
}

fn normalize_due(due: Option<&str>) -> Option<String> {
    due.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let raw_tags: Option<String> = row.get("tags")?;
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        notes: row.get::<_, Option<String>>("notes")?.unwrap_or_default(),
        description: row
            .get::<_, Option<String>>("description")?
            .unwrap_or_default(),
        tags: tags::decode_text(raw_tags.as_deref().unwrap_or_default()),
        done: row.get::<_, i64>("done")? != 0,
        due: row
            .get::<_, Option<String>>("due")?
            .filter(|d| !d.is_empty()),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Build and run the dynamic `UPDATE ... SET` for a partial update.
/// Validates supplied fields; unknown fields never reach here (the patch
/// types only carry the known ones).
fn patch_in_tx(tx: &Transaction, id: i64, patch: &TaskPatch) -> Result<()> {
    let exists: bool = tx.prepare("SELECT 1 FROM tasks WHERE id = ?")?.exists([id])?;
    if !exists {
        return Err(TodoError::NotFound { id });
    }

    let mut set_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let mut add = |clause: &'static str, value: Box<dyn rusqlite::ToSql>| {
        set_clauses.push(clause);
        params.push(value);
    };

    if let Some(ref title) = patch.title {
        let title = model::validate_title(title)?;
        add("title = ?", Box::new(title));
    }
    if let Some(ref notes) = patch.notes {
        add("notes = ?", Box::new(notes.clone()));
    }
    if let Some(ref description) = patch.description {
        add("description = ?", Box::new(description.clone()));
    }
    if let Some(ref raw) = patch.tags {
        let tag_list = tags::decode(raw);
        add("tags = ?", Box::new(tags::encode(&tag_list)));
    }
    if let Some(ref raw) = patch.done {
        if let Some(done) = model::parse_done(raw)? {
            add("done = ?", Box::new(i64::from(done)));
        }
    }
    if let Some(ref due) = patch.due {
        model::validate_due(due)?;
        add("due = ?", Box::new(normalize_due(Some(due))));
    }

    if set_clauses.is_empty() {
        return Ok(());
    }

    set_clauses.push("updated_at = ?");
    params.push(Box::new(model::now_stamp()));
    params.push(Box::new(id));

    let sql = format!("UPDATE tasks SET {} WHERE id = ?", set_clauses.join(", "));
    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
    tx.execute(&sql, params_refs.as_slice())?;
    Ok(())
}

/// Apply one import record. Returns the row outcome, or a validation error
/// for row-level problems (missing title/id, bad due or done values).
fn apply_import_record(
    tx: &Transaction,
    record: &ImportRecord,
    mode: ImportMode,
) -> Result<RowOutcome> {
    let title = record.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if title.is_none() && record.id.is_none() {
        return Err(TodoError::validation(
            "row missing 'title' (or an existing 'id')",
        ));
    }
    if let Some(ref due) = record.due {
        model::validate_due(due)?;
    }
    let done = match record.done {
        Some(ref raw) => model::parse_done(raw)?,
        None => None,
    };
    let tags_text = record.tags.as_ref().map(|raw| tags::encode(&tags::decode(raw)));
    let now = model::now_stamp();
    let created_at = record.created_at.clone().unwrap_or_else(|| now.clone());
    let updated_at = record.updated_at.clone().unwrap_or_else(|| now.clone());

    let exists = match record.id {
        Some(id) => tx.prepare("SELECT 1 FROM tasks WHERE id = ?")?.exists([id])?,
        None => false,
    };

    match mode {
        ImportMode::Insert => {
            let title = title.ok_or_else(|| TodoError::validation("row missing 'title'"))?;
            let rows = tx.execute(
                "INSERT OR IGNORE INTO tasks (id, title, notes, description, tags, done, due, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    record.id,
                    title,
                    record.notes.as_deref().unwrap_or_default(),
                    record.description.as_deref().unwrap_or_default(),
                    tags_text.as_deref().unwrap_or("[]"),
                    i64::from(done.unwrap_or(false)),
                    normalize_due(record.due.as_deref()),
                    created_at,
                    updated_at,
                ],
            )?;
            Ok(if rows > 0 {
                RowOutcome::Inserted
            } else {
                RowOutcome::Ignored
            })
        }
        ImportMode::Replace => {
            let title = title.ok_or_else(|| TodoError::validation("row missing 'title'"))?;
            tx.execute(
                "INSERT OR REPLACE INTO tasks (id, title, notes, description, tags, done, due, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    record.id,
                    title,
                    record.notes.as_deref().unwrap_or_default(),
                    record.description.as_deref().unwrap_or_default(),
                    tags_text.as_deref().unwrap_or("[]"),
                    i64::from(done.unwrap_or(false)),
                    normalize_due(record.due.as_deref()),
                    created_at,
                    updated_at,
                ],
            )?;
            Ok(RowOutcome::Replaced)
        }
        ImportMode::Update | ImportMode::Upsert => {
            if !exists {
                if mode == ImportMode::Update {
                    return Ok(RowOutcome::Ignored);
                }
                let title = title.ok_or_else(|| TodoError::validation("row missing 'title'"))?;
                tx.execute(
                    "INSERT INTO tasks (id, title, notes, description, tags, done, due, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        record.id,
                        title,
                        record.notes.as_deref().unwrap_or_default(),
                        record.description.as_deref().unwrap_or_default(),
                        tags_text.as_deref().unwrap_or("[]"),
                        i64::from(done.unwrap_or(false)),
                        normalize_due(record.due.as_deref()),
                        created_at,
                        updated_at,
                    ],
                )?;
                return Ok(RowOutcome::Inserted);
            }

            let mut set_clauses: Vec<&str> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(title) = title {
                set_clauses.push("title = ?");
                params.push(Box::new(title.to_string()));
            }
            if let Some(ref notes) = record.notes {
                set_clauses.push("notes = ?");
                params.push(Box::new(notes.clone()));
            }
            if let Some(ref description) = record.description {
                set_clauses.push("description = ?");
                params.push(Box::new(description.clone()));
            }
            if let Some(ref text) = tags_text {
                set_clauses.push("tags = ?");
                params.push(Box::new(text.clone()));
            }
            if let Some(done) = done {
                set_clauses.push("done = ?");
                params.push(Box::new(i64::from(done)));
            }
            if let Some(ref due) = record.due {
                set_clauses.push("due = ?");
                params.push(Box::new(normalize_due(Some(due))));
            }
            if set_clauses.is_empty() {
                return Ok(RowOutcome::Ignored);
            }
            set_clauses.push("updated_at = ?");
            params.push(Box::new(record.updated_at.clone().unwrap_or(now)));
            params.push(Box::new(record.id));

            let sql = format!("UPDATE tasks SET {} WHERE id = ?", set_clauses.join(", "));
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(AsRef::as_ref).collect();
            let rows = tx.execute(&sql, params_refs.as_slice())?;
            Ok(if rows > 0 {
                RowOutcome::Updated
            } else {
                RowOutcome::Ignored
            })
        }
    }
}

/// Apply one batch operation inside a transaction. Failure reasons follow
/// the batch contract: `not found`, `invalid operation`,
/// `missing required field`.
fn apply_batch_op(tx: &Transaction, op: &BatchOp) -> Result<()> {
    match op.op.as_str() {
        "patch" => {
            let id = op
                .id
                .ok_or_else(|| TodoError::validation("missing required field: id"))?;
            let set = op
                .set
                .as_ref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| TodoError::validation("missing required field: set"))?;
            let patch = patch_from_set(set);
            if patch.is_empty() {
                return Err(TodoError::validation("patch set has no valid fields"));
            }
            patch_in_tx(tx, id, &patch)
        }
        "delete" => {
            let id = op
                .id
                .ok_or_else(|| TodoError::validation("missing required field: id"))?;
            let rows = tx.execute("DELETE FROM tasks WHERE id = ?", [id])?;
            if rows == 0 {
                return Err(TodoError::NotFound { id });
            }
            Ok(())
        }
        other => Err(TodoError::validation(format!("invalid operation: {other}"))),
    }
}

/// Convert a batch `set` map into a typed patch. Unknown keys are ignored.
fn patch_from_set(set: &serde_json::Map<String, Value>) -> TaskPatch {
    let string_of = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    };
    TaskPatch {
        title: set.get("title").and_then(&string_of),
        notes: set.get("notes").and_then(&string_of),
        description: set.get("description").and_then(&string_of),
        tags: set.get("tags").cloned(),
        done: set.get("done").cloned(),
        due: set.get("due").and_then(&string_of),
    }
}
