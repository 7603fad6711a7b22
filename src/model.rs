//! Data types for the task service.
//!
//! [`Task`] is the sole persisted entity. The request payload types mirror
//! the shapes accepted over HTTP: tag fields stay as raw [`serde_json::Value`]
//! until the tag codec normalizes them at the storage boundary, and `done`
//! accepts the legacy truthy/falsy spellings (`"1"`, `"yes"`, `"on"`, ...)
//! that older clients still send.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TodoError};

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub description: String,
    /// Canonical tag list: unique case-insensitively, first-seen casing and
    /// order preserved.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub done: bool,
    /// ISO-8601 date or datetime text; `None` means no due date.
    #[serde(default)]
    pub due: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Whether this task carries all of the given tags, compared
    /// case-insensitively.
    #[must_use]
    pub fn has_all_tags(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|w| {
            let key = w.to_lowercase();
            self.tags.iter().any(|t| t.to_lowercase() == key)
        })
    }
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskCreate {
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub description: String,
    /// Raw tag value: list, map, or delimited string.
    #[serde(default)]
    pub tags: Value,
    #[serde(default)]
    pub due: Option<String>,
}

/// Body of `PATCH /tasks/{id}`: omitted fields keep their prior value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Value>,
    pub done: Option<Value>,
    pub due: Option<String>,
}

impl TaskPatch {
    /// True when no recognized field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.done.is_none()
            && self.due.is_none()
    }
}

/// Body of `PATCH /tasks/{id}/fields`: the restricted field-level patch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldsPatch {
    pub notes: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Value>,
    pub due: Option<String>,
}

impl FieldsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.due.is_none()
    }
}

/// One item of a `PATCH /tasks/bulk` (or `/bulk`) request.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItem {
    pub id: i64,
    pub done: Option<Value>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Value>,
    pub due: Option<String>,
}

/// Coerce a loosely typed `done` value into a boolean.
///
/// Accepts booleans, 0/1 numbers, and the truthy/falsy string spellings the
/// legacy importers recognized. `Null` means "not supplied". Anything else is
/// a validation error.
pub fn parse_done(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(TodoError::validation(format!("bad done value: {n}"))),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Ok(Some(true)),
            "0" | "false" | "f" | "no" | "n" | "off" | "" => Ok(Some(false)),
            other => Err(TodoError::validation(format!("bad done value: {other}"))),
        },
        other => Err(TodoError::validation(format!("bad done value: {other}"))),
    }
}

/// Validate a trimmed title, rejecting blank input.
pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TodoError::validation("title required"));
    }
    Ok(trimmed.to_string())
}

/// Validate a due value: ISO-8601 date or datetime ("T" or space separator),
/// with an optional offset. Empty strings count as "no due date".
///
/// The stored form is the caller's text unchanged; validated ISO text orders
/// correctly under lexicographic comparison, which is what the query engine
/// relies on.
pub fn validate_due(due: &str) -> Result<()> {
    let s = due.trim();
    if s.is_empty() {
        return Ok(());
    }
    let ok = DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();
    if ok {
        Ok(())
    } else {
        Err(TodoError::validation(format!("invalid due date: {s}")))
    }
}

/// Current UTC timestamp in the stored text form (`YYYY-MM-DD HH:MM:SS`).
#[must_use]
pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
