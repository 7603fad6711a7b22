//! Export rendering for `GET /export`.
//!
//! Serializes a filtered task list into one of three downloadable formats.
//! Rendering is pure: the handler fetches rows, this module turns them into
//! bytes plus the matching content type and suggested filename.

use crate::error::Result;
use crate::model::Task;
use crate::tags;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Jsonl,
}

impl ExportFormat {
    /// Parse the `format` query parameter.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        match raw {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            other => Err(format!("unsupported format: {other}")),
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Jsonl => "application/x-ndjson",
        }
    }

    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Json => "tasks.json",
            Self::Csv => "tasks.csv",
            Self::Jsonl => "tasks.jsonl",
        }
    }
}

/// Render tasks in the given format.
pub fn render(tasks: &[Task], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(tasks)?),
        ExportFormat::Jsonl => render_jsonl(tasks),
        ExportFormat::Csv => render_csv(tasks),
    }
}

fn render_jsonl(tasks: &[Task]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for task in tasks {
        serde_json::to_writer(&mut out, task)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// CSV with a fixed header. Tags render as their JSON-array text so a CSV
/// export re-imports to the same tag list.
fn render_csv(tasks: &[Task]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "title",
        "notes",
        "description",
        "done",
        "due",
        "created_at",
        "updated_at",
        "tags",
    ])?;
    for task in tasks {
        writer.write_record([
            task.id.to_string().as_str(),
            &task.title,
            &task.notes,
            &task.description,
            if task.done { "1" } else { "0" },
            task.due.as_deref().unwrap_or_default(),
            &task.created_at,
            &task.updated_at,
            &tags::encode(&task.tags),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| crate::error::TodoError::bad_request(format!("csv render failed: {e}")))?;
    Ok(bytes)
}
