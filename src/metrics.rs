//! Aggregate counters for `GET /metrics`.
//!
//! One snapshot type, rendered two ways: the JSON default and the Prometheus
//! text exposition format (negotiated via `Accept: text/plain` or
//! `?format=prometheus`). Counts always come from fresh queries so the
//! endpoint reflects the store at the moment of the request.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::Result;
use crate::storage::TaskStore;

/// Point-in-time counters over the task table.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub done: u64,
    pub open: u64,
    pub overdue: u64,
    /// `done / total`, `0.0` for an empty store.
    pub done_ratio: f64,
    /// Tasks marked done within the last 24 hours.
    pub recent_done_24h: u64,
    /// Task count per tag, all tasks.
    pub by_tag: BTreeMap<String, u64>,
    /// Task count per tag, open tasks only.
    pub open_by_tag: BTreeMap<String, u64>,
}

/// Collect a snapshot from the store.
pub fn collect(store: &TaskStore) -> Result<MetricsSnapshot> {
    let counts = store.count_aggregate()?;
    let done_ratio = if counts.total == 0 {
        0.0
    } else {
        counts.done as f64 / counts.total as f64
    };
    Ok(MetricsSnapshot {
        total: counts.total,
        done: counts.done,
        open: counts.open,
        overdue: counts.overdue,
        done_ratio,
        recent_done_24h: store.recent_done_24h()?,
        by_tag: store.tag_counts(false)?,
        open_by_tag: store.tag_counts(true)?,
    })
}

/// Render the snapshot in the Prometheus text exposition format.
#[must_use]
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();
    gauge(&mut out, "todo_tasks_total", "Total number of tasks.", snapshot.total as f64);
    gauge(&mut out, "todo_tasks_done", "Tasks marked done.", snapshot.done as f64);
    gauge(&mut out, "todo_tasks_open", "Tasks not yet done.", snapshot.open as f64);
    gauge(
        &mut out,
        "todo_tasks_overdue",
        "Open tasks past their due date.",
        snapshot.overdue as f64,
    );
    gauge(
        &mut out,
        "todo_tasks_done_ratio",
        "Fraction of tasks marked done.",
        snapshot.done_ratio,
    );
    gauge(
        &mut out,
        "todo_tasks_recent_done_24h",
        "Tasks marked done within the last 24 hours.",
        snapshot.recent_done_24h as f64,
    );

    let _ = writeln!(out, "# HELP todo_tasks_by_tag Task count per tag.");
    let _ = writeln!(out, "# TYPE todo_tasks_by_tag gauge");
    for (tag, count) in &snapshot.by_tag {
        let _ = writeln!(out, "todo_tasks_by_tag{{tag=\"{}\"}} {count}", escape_label(tag));
    }

    let _ = writeln!(out, "# HELP todo_tasks_open_by_tag Open task count per tag.");
    let _ = writeln!(out, "# TYPE todo_tasks_open_by_tag gauge");
    for (tag, count) in &snapshot.open_by_tag {
        let _ = writeln!(
            out,
            "todo_tasks_open_by_tag{{tag=\"{}\"}} {count}",
            escape_label(tag)
        );
    }
    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: f64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    if value.fract() == 0.0 {
        let _ = writeln!(out, "{name} {}", value as i64);
    } else {
        let _ = writeln!(out, "{name} {value}");
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
