//! Optional FTS5 full-text index over task text.
//!
//! The index is an external-content virtual table kept in sync by triggers,
//! so the `tasks` table stays the single source of truth. Text queries are
//! always answered by the canonical folded-substring scan, which FTS5's
//! token-prefix matching cannot reproduce; the index is maintained and
//! exposed as a capability (`/admin/fts/reindex`) so the store stays ready
//! for match-compatible query shapes. Everything here degrades gracefully:
//! when the SQLite build lacks FTS5, `ensure` and `rebuild` report `false`.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::schema::table_exists;

// Indexed columns mirror exactly the fields the fallback substring match
// covers, so the two paths agree on which fields can match.
const FTS_DDL: &str = r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS tasks_fts USING fts5(
        title, notes, description,
        content='tasks', content_rowid='id',
        tokenize='unicode61 remove_diacritics 2'
    );

    CREATE TRIGGER IF NOT EXISTS tasks_ai AFTER INSERT ON tasks BEGIN
        INSERT INTO tasks_fts(rowid, title, notes, description)
        VALUES (new.id, new.title, new.notes, new.description);
    END;

    CREATE TRIGGER IF NOT EXISTS tasks_ad AFTER DELETE ON tasks BEGIN
        INSERT INTO tasks_fts(tasks_fts, rowid, title, notes, description)
        VALUES ('delete', old.id, old.title, old.notes, old.description);
    END;

    CREATE TRIGGER IF NOT EXISTS tasks_au AFTER UPDATE ON tasks BEGIN
        INSERT INTO tasks_fts(tasks_fts, rowid, title, notes, description)
        VALUES ('delete', old.id, old.title, old.notes, old.description);
        INSERT INTO tasks_fts(rowid, title, notes, description)
        VALUES (new.id, new.title, new.notes, new.description);
    END;
"#;

/// Whether the index table exists and is queryable on this connection.
#[must_use]
pub fn available(conn: &Connection) -> bool {
    table_exists(conn, "tasks_fts")
        && conn
            .prepare("SELECT count(*) FROM tasks_fts")
            .and_then(|mut stmt| stmt.query_row([], |row| row.get::<_, i64>(0)))
            .is_ok()
}

/// Create the index and its sync triggers if the SQLite build supports FTS5.
/// Returns whether the index is live afterwards.
pub fn ensure(conn: &Connection) -> Result<bool> {
    if available(conn) {
        return Ok(true);
    }
    match conn.execute_batch(FTS_DDL) {
        Ok(()) => {
            // Index rows created before the triggers existed.
            conn.execute("INSERT INTO tasks_fts(tasks_fts) VALUES ('rebuild')", [])?;
            debug!("full-text index ready");
            Ok(true)
        }
        Err(e) => {
            warn!(error = %e, "full-text index unavailable, text search will scan");
            Ok(false)
        }
    }
}

/// Drop and recreate the index from the tasks table.
pub fn rebuild(conn: &Connection) -> Result<bool> {
    if !ensure(conn)? {
        return Ok(false);
    }
    conn.execute("INSERT INTO tasks_fts(tasks_fts) VALUES ('rebuild')", [])?;
    Ok(true)
}
