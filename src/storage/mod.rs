//! Persistence layer: schema management, the `SQLite` task store, and the
//! optional full-text index.

pub mod fts;
pub mod schema;
pub mod sqlite;

pub use sqlite::{
    AggregateCounts, BatchOp, BatchOpError, BatchOpResult, BatchReport, BulkReport, TaskStore,
};
