//! `todo_api` - task management REST service library
//!
//! This crate provides the core functionality for the `todo-api` server,
//! a small `SQLite`-backed task tracker with an HTTP surface.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`http`] - axum route table and request handlers
//! - [`model`] - Data types (Task, patch and bulk payloads)
//! - [`storage`] - `SQLite` database layer and full-text index
//! - [`query`] - Filter, sort, and pagination semantics
//! - [`tags`] - Tag codec (legacy encodings to the canonical list)
//! - [`ingest`] - Import payload parsing (JSON, NDJSON, CSV)
//! - [`export`] - Export rendering (JSON, CSV, JSONL)
//! - [`metrics`] - Aggregate counters and Prometheus exposition
//! - [`config`] - Runtime configuration
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod export;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;
pub mod tags;

pub use error::{Result, TodoError};
