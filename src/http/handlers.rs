//! Request handlers and the route manifest.
//!
//! Every handler opens a short-lived store against the configured database,
//! does its work, and drops the connection; WAL plus the schema fast path
//! keep that cheap, and it means no connection state outlives a request.
//! Store work is synchronous rusqlite, so it runs on the blocking pool to
//! keep worker threads free while a writer waits out the busy timeout.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, RawQuery, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete as delete_route, get, patch, post};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Result, TodoError};
use crate::export::{self, ExportFormat};
use crate::http::{AppState, RouteTable};
use crate::ingest::{self, ImportMode, ImportReport};
use crate::metrics;
use crate::model::{BulkItem, FieldsPatch, TaskCreate, TaskPatch};
use crate::query::{self, TaskFilters};
use crate::storage::{BatchOp, TaskStore};

/// The full route manifest. Built as a table first so overlapping
/// registrations resolve deterministically before axum sees them.
#[must_use]
pub fn build_routes() -> RouteTable {
    let mut table = RouteTable::new();
    table.register(Method::POST, "/tasks", post(create_task));
    table.register(Method::GET, "/tasks", get(list_tasks));
    table.register(Method::GET, "/tasks/:id", get(get_task));
    table.register(Method::PATCH, "/tasks/:id", patch(patch_task));
    table.register(Method::DELETE, "/tasks/:id", delete_route(delete_task));
    table.register(Method::PATCH, "/tasks/:id/fields", patch(patch_fields));
    table.register(Method::PATCH, "/tasks/bulk", patch(bulk_patch));
    // Legacy alias kept for older clients.
    table.register(Method::PATCH, "/bulk", patch(bulk_patch));
    table.register(Method::POST, "/import", post(import));
    table.register(Method::GET, "/export", get(export_tasks));
    table.register(Method::POST, "/batch", post(batch));
    table.register(Method::GET, "/metrics", get(metrics_endpoint));
    table.register(Method::GET, "/health", get(health));
    table.register(Method::POST, "/admin/fts/reindex", post(fts_reindex));
    table
}

/// Open a store and run `f` with it on the blocking pool.
async fn with_store<F, R>(state: &AppState, f: F) -> Result<R>
where
    F: FnOnce(&mut TaskStore) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    let db_path = state.config.db_path.clone();
    tokio::task::spawn_blocking(move || {
        let mut store = TaskStore::open(&db_path)?;
        f(&mut store)
    })
    .await?
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<TaskCreate>,
) -> Result<impl IntoResponse> {
    let task = with_store(&state, move |store| store.create(&body)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse> {
    let filters = TaskFilters::from_query(raw.as_deref().unwrap_or_default())?;
    let tasks = with_store(&state, move |store| store.list(&filters)).await?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    with_store(&state, move |store| store.get(id))
        .await?
        .map(Json)
        .ok_or(TodoError::NotFound { id })
}

async fn patch_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TaskPatch>,
) -> Result<impl IntoResponse> {
    let task = with_store(&state, move |store| store.patch(id, &body)).await?;
    Ok(Json(task))
}

async fn patch_fields(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<FieldsPatch>,
) -> Result<impl IntoResponse> {
    if body.is_empty() {
        return Err(TodoError::bad_request("empty patch"));
    }
    let patch = TaskPatch {
        title: None,
        notes: body.notes,
        description: body.description,
        tags: body.tags,
        done: None,
        due: body.due,
    };
    let task = with_store(&state, move |store| store.patch(id, &patch)).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let existed = with_store(&state, move |store| store.delete(id)).await?;
    Ok(Json(json!({ "ok": true, "existed": existed })))
}

async fn bulk_patch(
    State(state): State<AppState>,
    Json(items): Json<Vec<BulkItem>>,
) -> Result<impl IntoResponse> {
    let report = with_store(&state, move |store| store.bulk_patch(&items)).await?;
    Ok(Json(report))
}

/// `POST /import`: JSON array, NDJSON, CSV, or a multipart upload of one of
/// those. The `mode` query parameter picks the conflict strategy.
async fn import(State(state): State<AppState>, req: Request) -> Result<Json<ImportReport>> {
    let raw_query = req.uri().query().unwrap_or_default().to_string();
    let mode = match query::query_param(&raw_query, "mode") {
        Some(m) => ImportMode::parse(&m).map_err(TodoError::bad_request)?,
        None => ImportMode::default(),
    };
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();

    let (records, errors) = if content_type.starts_with("multipart/form-data") {
        parse_multipart(req).await?
    } else {
        let bytes = Bytes::from_request(req, &())
            .await
            .map_err(|e| TodoError::bad_request(format!("unreadable body: {e}")))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if content_type.contains("csv") {
            ingest::parse_csv_text(&text)
        } else {
            ingest::parse_json_text(&text)
        }
    };

    let report = with_store(&state, move |store| {
        store.import_records(&records, errors, mode)
    })
    .await?;
    Ok(Json(report))
}

async fn parse_multipart(
    req: Request,
) -> Result<(Vec<ingest::NumberedRecord>, Vec<ingest::RowError>)> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| TodoError::bad_request(format!("bad multipart body: {e}")))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TodoError::bad_request(format!("bad multipart field: {e}")))?
    {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let is_csv = field
            .file_name()
            .is_some_and(|n| n.to_lowercase().ends_with(".csv"))
            || field.content_type().is_some_and(|c| c.contains("csv"));
        let text = field
            .text()
            .await
            .map_err(|e| TodoError::bad_request(format!("unreadable upload: {e}")))?;
        return Ok(if is_csv {
            ingest::parse_csv_text(&text)
        } else {
            ingest::parse_json_text(&text)
        });
    }
    Err(TodoError::bad_request("multipart body has no file field"))
}

/// `GET /export`: the listing filter contract rendered as a download.
/// Without an explicit `limit` the export covers every matching row.
async fn export_tasks(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Response> {
    let raw = raw.unwrap_or_default();
    let format = match query::query_param(&raw, "format") {
        Some(f) => ExportFormat::parse(&f).map_err(TodoError::bad_request)?,
        None => ExportFormat::default(),
    };
    let mut filters = TaskFilters::from_query(&raw)?;
    if query::query_param(&raw, "limit").is_none() {
        filters.limit = usize::MAX;
    }

    let tasks = with_store(&state, move |store| store.list(&filters)).await?;
    let body = export::render(&tasks, format)?;

    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", format.filename()),
        ),
    ];
    Ok((headers, body).into_response())
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    #[serde(default)]
    ops: Vec<BatchOp>,
    #[serde(default)]
    atomic: Option<bool>,
}

/// `POST /batch`: ordered patch/delete operations. `atomic` comes from the
/// body, overridable by the query parameter; a rolled-back atomic batch
/// answers 400 with the failure report.
async fn batch(State(state): State<AppState>, req: Request) -> Result<Response> {
    let raw_query = req.uri().query().unwrap_or_default().to_string();
    let Json(body) = Json::<BatchRequest>::from_request(req, &())
        .await
        .map_err(|e| TodoError::bad_request(format!("bad json body: {e}")))?;
    if body.ops.is_empty() {
        return Err(TodoError::bad_request("empty ops"));
    }
    let atomic = match query::query_param(&raw_query, "atomic") {
        Some(v) => query::parse_bool_param("atomic", &v)?,
        None => body.atomic.unwrap_or(false),
    };

    let ops = body.ops;
    let report = with_store(&state, move |store| store.batch(&ops, atomic)).await?;
    let status = if report.rolled_back {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)).into_response())
}

/// `GET /metrics`: JSON by default, Prometheus text exposition when asked
/// for via `Accept: text/plain` or `?format=prometheus`.
async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Response> {
    let snapshot = with_store(&state, |store| metrics::collect(store)).await?;

    let raw = raw.unwrap_or_default();
    let wants_text = query::query_param(&raw, "format").is_some_and(|f| f == "prometheus")
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|a| a.contains("text/plain"));

    if wants_text {
        let body = metrics::render_prometheus(&snapshot);
        Ok((
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response())
    } else {
        Ok(Json(snapshot).into_response())
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// `POST /admin/fts/reindex`: rebuild the full-text index. Hidden (404)
/// unless admin endpoints are enabled.
async fn fts_reindex(State(state): State<AppState>) -> Result<Response> {
    if !state.config.admin_enabled {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let available = with_store(&state, |store| store.fts_rebuild()).await?;
    Ok(Json(json!({ "ok": true, "fts": available })).into_response())
}
