//! Filter, sort, and pagination semantics for task listings.
//!
//! Two variants exist: the store prefilters what SQL expresses cheaply
//! (`done`, due-range), and [`apply`] runs the canonical application-side
//! pass — accent/case-insensitive text search, AND tag containment, sort,
//! pagination. Both together produce the one logical result set the export
//! and listing endpoints share.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::config::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::error::{Result, TodoError};
use crate::model::{self, Task};

/// Sort keys accepted by listings and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Id,
    Title,
    Due,
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    /// Unknown keys fall back to `id`, matching the permissive legacy
    /// behavior (sort is a presentation knob, not a validity gate).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "title" => Self::Title,
            "due" => Self::Due,
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            _ => Self::Id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }
}

/// Parsed and validated listing filters. All filters combine with AND.
#[derive(Debug, Clone)]
pub struct TaskFilters {
    pub q: Option<String>,
    pub done: Option<bool>,
    /// Task must carry all of these (case-insensitive containment).
    pub tags: Vec<String>,
    /// Strict `due < bound`; tasks without a due date are excluded.
    pub due_before: Option<String>,
    /// Strict `due > bound`; tasks without a due date are excluded.
    pub due_after: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl Default for TaskFilters {
    fn default() -> Self {
        Self {
            q: None,
            done: None,
            tags: Vec::new(),
            due_before: None,
            due_after: None,
            sort: SortKey::default(),
            order: SortOrder::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl TaskFilters {
    /// Parse a raw query string (`q=...&tag=a&tag=b&limit=20`) into validated
    /// filters. `tag` may repeat. Malformed `done`, bounds, `limit`, or
    /// `offset` are validation errors surfaced before any query runs.
    pub fn from_query(raw: &str) -> Result<Self> {
        let mut filters = Self::default();
        for (key, value) in parse_query_pairs(raw) {
            match key.as_ref() {
                "q" => {
                    if !value.trim().is_empty() {
                        filters.q = Some(value.into_owned());
                    }
                }
                "done" => {
                    filters.done = Some(parse_bool_param("done", &value)?);
                }
                "tag" => {
                    let v = value.trim();
                    if !v.is_empty() {
                        filters.tags.push(v.to_string());
                    }
                }
                "due_before" => {
                    model::validate_due(&value)
                        .map_err(|_| TodoError::validation("invalid due_before"))?;
                    filters.due_before = Some(value.into_owned());
                }
                "due_after" => {
                    model::validate_due(&value)
                        .map_err(|_| TodoError::validation("invalid due_after"))?;
                    filters.due_after = Some(value.into_owned());
                }
                "sort" => filters.sort = SortKey::parse(&value),
                "order" => filters.order = SortOrder::parse(&value),
                "limit" => {
                    let limit: usize = value
                        .parse()
                        .map_err(|_| TodoError::validation("invalid limit"))?;
                    if !(1..=MAX_LIMIT).contains(&limit) {
                        return Err(TodoError::validation(format!(
                            "limit must be between 1 and {MAX_LIMIT}"
                        )));
                    }
                    filters.limit = limit;
                }
                "offset" => {
                    filters.offset = value
                        .parse()
                        .map_err(|_| TodoError::validation("invalid offset"))?;
                }
                // Unknown params are ignored, not errors.
                _ => {}
            }
        }
        Ok(filters)
    }
}

/// Decoded value of one query parameter. The last occurrence wins, matching
/// how the filter parser treats repeated scalar keys.
#[must_use]
pub fn query_param(raw: &str, key: &str) -> Option<String> {
    parse_query_pairs(raw)
        .into_iter()
        .filter(|(k, _)| k == key)
        .next_back()
        .map(|(_, v)| v.into_owned())
}

/// Parse a boolean query parameter under the legacy truthy/falsy spellings.
pub fn parse_bool_param(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        _ => Err(TodoError::validation(format!("invalid {name}"))),
    }
}

/// Split a query string into decoded key/value pairs.
fn parse_query_pairs(raw: &str) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
    raw.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

/// Minimal application/x-www-form-urlencoded decoding: `+` is a space and
/// `%XX` is a byte. Invalid escapes pass through literally.
fn percent_decode(input: &str) -> Cow<'_, str> {
    if !input.contains('%') && !input.contains('+') {
        return Cow::Borrowed(input);
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    out.push(u8::try_from(hi * 16 + lo).unwrap_or(b'%'));
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

/// Diacritic-stripping table covering the corpus alphabet (Turkish plus
/// Western European accents).
static DIACRITICS: Lazy<HashMap<char, char>> = Lazy::new(|| {
    let pairs = [
        ("ıİ", "iI"),
        ("ğĞ", "gG"),
        ("şŞ", "sS"),
        ("çÇ", "cC"),
        ("âÂäÄàÀáÁãÃ", "aAaAaAaAaA"),
        ("éÉèÈêÊëË", "eEeEeEeE"),
        ("íÍìÌîÎïÏ", "iIiIiIiI"),
        ("óÓòÒôÔõÕöÖ", "oOoOoOoOoO"),
        ("úÚùÙûÛüÜ", "uUuUuUuU"),
        ("ñÑ", "nN"),
        ("ÿÝ", "yY"),
    ];
    let mut map = HashMap::new();
    for (accented, plain) in pairs {
        for (a, p) in accented.chars().zip(plain.chars()) {
            map.insert(a, p);
        }
    }
    map
});

/// Normalize text for search: strip accents, then case-fold.
///
/// Both sides of every substring comparison go through this, so `"çay"`
/// matches `"CAY"` and vice versa.
#[must_use]
pub fn fold(s: &str) -> String {
    s.chars()
        .map(|c| DIACRITICS.get(&c).copied().unwrap_or(c))
        .collect::<String>()
        .to_lowercase()
}

/// The canonical application-side filter/sort/paginate pass.
///
/// Input order does not matter; output is deterministic for a given filter.
#[must_use]
pub fn apply(mut tasks: Vec<Task>, filters: &TaskFilters) -> Vec<Task> {
    if let Some(done) = filters.done {
        tasks.retain(|t| t.done == done);
    }
    if let Some(ref bound) = filters.due_before {
        tasks.retain(|t| due_value(t).is_some_and(|d| d < bound.as_str()));
    }
    if let Some(ref bound) = filters.due_after {
        tasks.retain(|t| due_value(t).is_some_and(|d| d > bound.as_str()));
    }
    if let Some(ref q) = filters.q {
        let needle = fold(q);
        tasks.retain(|t| matches_text(t, &needle));
    }
    if !filters.tags.is_empty() {
        tasks.retain(|t| t.has_all_tags(&filters.tags));
    }

    sort_tasks(&mut tasks, filters.sort, filters.order);

    tasks
        .into_iter()
        .skip(filters.offset)
        .take(filters.limit)
        .collect()
}

/// Substring match over title/notes/description with both sides folded.
#[must_use]
pub fn matches_text(task: &Task, folded_needle: &str) -> bool {
    fold(&task.title).contains(folded_needle)
        || fold(&task.notes).contains(folded_needle)
        || fold(&task.description).contains(folded_needle)
}

fn due_value(task: &Task) -> Option<&str> {
    task.due.as_deref().filter(|d| !d.is_empty())
}

/// Sort in place. Tasks without a due date always sort after every task that
/// has one, regardless of direction. The sort is stable, so ties keep their
/// incoming (id-descending) order.
pub fn sort_tasks(tasks: &mut [Task], sort: SortKey, order: SortOrder) {
    tasks.sort_by(|a, b| {
        let ord = match sort {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::Title => a.title.cmp(&b.title),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortKey::Due => {
                return match (due_value(a), due_value(b)) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(x), Some(y)) => match order {
                        SortOrder::Asc => x.cmp(y),
                        SortOrder::Desc => y.cmp(x),
                    },
                };
            }
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}
