//! Import record parsing for `POST /import`.
//!
//! Accepts three payload shapes: a JSON array (or a single JSON object),
//! NDJSON (one object per line, used as the fallback when the body is not a
//! single JSON document), and CSV with a header row. Parsing never aborts the
//! batch: each unusable row becomes a [`RowError`] carried through to the
//! final report.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conflict mode for applying imported records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Only create; id collisions are ignored.
    Insert,
    /// Only mutate existing rows; unknown ids are ignored.
    Update,
    /// Unconditionally overwrite-or-create the row (full replace).
    Replace,
    /// Update if the id exists, else insert.
    #[default]
    Upsert,
}

impl ImportMode {
    /// Parse the `mode` query parameter.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "replace" => Ok(Self::Replace),
            "upsert" => Ok(Self::Upsert),
            other => Err(format!("unsupported mode: {other}")),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Upsert => "upsert",
        }
    }
}

/// One record of an import payload. Every field is optional; whether the
/// record is usable depends on the mode (a row missing both `title` and an
/// existing `id` is a row-level error).
///
/// `created_at`/`updated_at` are honored when present so a full export can be
/// re-imported losslessly; absent, the store assigns them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(default)]
    pub done: Option<Value>,
    pub due: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// A per-row failure, reported alongside the aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    /// 1-based source line (or record index for JSON arrays).
    pub line: usize,
    pub error: String,
}

/// What applying a single record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    Updated,
    Replaced,
    Ignored,
}

/// Aggregate import report. Invariant:
/// `inserted + updated + replaced + ignored == processed - errors.len()`.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub ok: bool,
    pub processed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub replaced: u64,
    pub ignored: u64,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Replaced => self.replaced += 1,
            RowOutcome::Ignored => self.ignored += 1,
        }
    }
}

/// A record tagged with its source line for error reporting.
pub type NumberedRecord = (usize, ImportRecord);

/// Parse a JSON body: a single array, a single object, or NDJSON lines.
#[must_use]
pub fn parse_json_text(text: &str) -> (Vec<NumberedRecord>, Vec<RowError>) {
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return (Vec::new(), Vec::new());
    }

    // Whole-document parse first; NDJSON only as the fallback.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => {
                let mut records = Vec::new();
                let mut errors = Vec::new();
                for (idx, item) in items.into_iter().enumerate() {
                    match serde_json::from_value::<ImportRecord>(item) {
                        Ok(rec) => records.push((idx + 1, rec)),
                        Err(e) => errors.push(RowError {
                            line: idx + 1,
                            error: format!("bad record: {e}"),
                        }),
                    }
                }
                (records, errors)
            }
            other => match serde_json::from_value::<ImportRecord>(other) {
                Ok(rec) => (vec![(1, rec)], Vec::new()),
                Err(e) => (
                    Vec::new(),
                    vec![RowError {
                        line: 1,
                        error: format!("bad record: {e}"),
                    }],
                ),
            },
        };
    }

    parse_ndjson_text(trimmed)
}

/// Parse NDJSON: one JSON object per non-empty line.
#[must_use]
pub fn parse_ndjson_text(text: &str) -> (Vec<NumberedRecord>, Vec<RowError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ImportRecord>(line) {
            Ok(rec) => records.push((idx + 1, rec)),
            Err(_) => errors.push(RowError {
                line: idx + 1,
                error: "bad json".to_string(),
            }),
        }
    }
    (records, errors)
}

/// Parse CSV with a header row. Recognized columns:
/// `id,title,notes,description,tags,done,due,created_at,updated_at`;
/// unknown columns are ignored and empty cells mean "absent".
#[must_use]
pub fn parse_csv_text(text: &str) -> (Vec<NumberedRecord>, Vec<RowError>) {
    let trimmed = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(trimmed.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(str::to_string).collect(),
        Err(e) => {
            return (
                Vec::new(),
                vec![RowError {
                    line: 1,
                    error: format!("bad header: {e}"),
                }],
            );
        }
    };

    let mut records = Vec::new();
    let mut errors = Vec::new();
    // Line 1 is the header.
    for (idx, row) in reader.records().enumerate() {
        let line = idx + 2;
        match row {
            Ok(row) => {
                let mut rec = ImportRecord::default();
                let mut row_ok = true;
                for (col, cell) in headers.iter().zip(row.iter()) {
                    if cell.is_empty() {
                        continue;
                    }
                    match col.as_str() {
                        "id" => match cell.parse::<i64>() {
                            Ok(id) => rec.id = Some(id),
                            Err(_) => {
                                errors.push(RowError {
                                    line,
                                    error: format!("bad id: {cell}"),
                                });
                                // An errored row is reported, never applied.
                                row_ok = false;
                                break;
                            }
                        },
                        "title" => rec.title = Some(cell.to_string()),
                        "notes" => rec.notes = Some(cell.to_string()),
                        "description" => rec.description = Some(cell.to_string()),
                        "tags" => rec.tags = Some(Value::String(cell.to_string())),
                        "done" => rec.done = Some(Value::String(cell.to_string())),
                        "due" => rec.due = Some(cell.to_string()),
                        "created_at" => rec.created_at = Some(cell.to_string()),
                        "updated_at" => rec.updated_at = Some(cell.to_string()),
                        _ => {}
                    }
                }
                if row_ok {
                    records.push((line, rec));
                }
            }
            Err(e) => errors.push(RowError {
                line,
                error: format!("bad row: {e}"),
            }),
        }
    }
    (records, errors)
}
