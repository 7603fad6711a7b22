//! Database schema definitions and migration logic.
//!
//! The schema is applied once at startup, before the server accepts traffic.
//! Request handlers never issue DDL: legacy databases missing newer columns
//! (`description`, `tags`) get them added here, additively and without
//! touching existing row data.

use rusqlite::{Connection, Result};

/// Bumped whenever `SCHEMA_SQL` or the column set changes, so existing
/// databases re-run migrations on the next open.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the task database.
pub const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        notes TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '[]',
        done INTEGER NOT NULL DEFAULT 0,
        due TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_done ON tasks(done);
    CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due) WHERE due IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at);
";

/// Columns a legacy `tasks` table may be missing. Additive only: existing
/// rows get the column default.
const TASK_COLUMNS: &[(&str, &str)] = &[
    ("notes", "TEXT NOT NULL DEFAULT ''"),
    ("description", "TEXT NOT NULL DEFAULT ''"),
    ("tags", "TEXT NOT NULL DEFAULT '[]'"),
    ("done", "INTEGER NOT NULL DEFAULT 0"),
    ("due", "TEXT"),
    ("created_at", "TEXT NOT NULL DEFAULT ''"),
    ("updated_at", "TEXT NOT NULL DEFAULT ''"),
];

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`, and a `user_version`
/// stamp lets subsequent opens skip the DDL entirely. Legacy tables are
/// migrated (missing columns added) before the batch runs, because the batch
/// includes `CREATE INDEX` statements that would fail against them.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    set_pragmas(conn)?;

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    ensure_columns(conn, "tasks", TASK_COLUMNS)?;
    conn.execute_batch(SCHEMA_SQL)?;

    // Legacy schema carried a 'completed' flag alongside 'done'; fold it in.
    if column_exists(conn, "tasks", "completed") {
        conn.execute(
            "UPDATE tasks SET done = COALESCE(done, 0) OR COALESCE(completed, 0)",
            [],
        )?;
    }

    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    Ok(())
}

fn set_pragmas(conn: &Connection) -> Result<()> {
    // WAL lets readers proceed while a writer commits; NORMAL synchronous is
    // safe under WAL.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    // Writers queue behind SQLite's own lock instead of failing fast.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> bool {
    conn.prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?")
        .and_then(|mut stmt| stmt.exists([table]))
        .unwrap_or(false)
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let sql = format!("SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?");
    conn.prepare(&sql)
        .and_then(|mut stmt| stmt.exists([column]))
        .unwrap_or(false)
}

fn ensure_columns(conn: &Connection, table: &str, columns: &[(&str, &str)]) -> Result<()> {
    if !table_exists(conn, table) {
        return Ok(());
    }

    for (name, definition) in columns {
        if !column_exists(conn, table, name) {
            let sql = format!("ALTER TABLE {table} ADD COLUMN {name} {definition}");
            conn.execute(&sql, [])?;
        }
    }

    Ok(())
}
