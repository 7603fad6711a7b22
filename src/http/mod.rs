//! HTTP surface: route table, shared state, and error mapping.

pub mod handlers;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::Config;
use crate::error::TodoError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

struct RouteEntry {
    method: Method,
    path: String,
    handler: MethodRouter<AppState>,
}

/// Ordered route registry built before the router.
///
/// Registering the same method and path twice replaces the earlier entry
/// (last registration wins), so overlapping registrations collapse to one
/// deterministic handler instead of panicking at router build time.
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. `method` is the dedup key; `handler` is the
    /// method-filtered service for it.
    pub fn register(&mut self, method: Method, path: &str, handler: MethodRouter<AppState>) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.method == method && e.path == path)
        {
            debug!(method = %method, path, "duplicate route registration, keeping the later one");
            existing.handler = handler;
            return;
        }
        self.entries.push(RouteEntry {
            method,
            path: path.to_string(),
            handler,
        });
    }

    /// Registered (method, path) pairs in registration order.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.entries
            .iter()
            .map(|e| (e.method.clone(), e.path.clone()))
            .collect()
    }

    /// Collapse the table into an axum router. Entries sharing a path merge
    /// into one method router.
    #[must_use]
    pub fn into_router(self, state: AppState) -> Router {
        let mut by_path: Vec<(String, MethodRouter<AppState>)> = Vec::new();
        for entry in self.entries {
            match by_path.iter_mut().find(|(p, _)| *p == entry.path) {
                Some((_, merged)) => {
                    let prior = std::mem::take(merged);
                    *merged = prior.merge(entry.handler);
                }
                None => by_path.push((entry.path, entry.handler)),
            }
        }

        let mut router = Router::new();
        for (path, handler) in by_path {
            router = router.route(&path, handler);
        }
        router
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

impl IntoResponse for TodoError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Json(_) | Self::Csv(_) | Self::Io(_) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let detail = self.to_string();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %detail, "request failed");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
