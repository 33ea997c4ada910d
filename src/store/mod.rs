//! Document store abstraction: a `Connector` opens per-database `Database` handles.
//! Backends: PostgreSQL JSONB (`postgres`) and in-process (`memory`).

pub mod memory;
pub mod names;
pub mod postgres;

use crate::error::AppError;
use crate::query::TranslatedQuery;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub use memory::{MemoryConnector, MemoryDatabase};
pub use postgres::{PgConnector, PgDatabase};

/// Identifier field assigned by the store on creation.
pub const ID_FIELD: &str = "_id";

/// An opaque JSON object. Only `_id` has a contract.
pub type Document = Map<String, Value>;

/// Process-wide access to the store: opens handles and manages whole databases.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a handle bound to one logical database.
    async fn connect(&self, database: &str) -> Result<Arc<dyn Database>, AppError>;

    async fn list_databases(&self) -> Result<Vec<String>, AppError>;

    /// Drop a database. Returns false when it did not exist.
    async fn drop_database(&self, database: &str) -> Result<bool, AppError>;

    /// Cheap reachability check used by readiness probes.
    async fn ping(&self) -> Result<(), AppError>;
}

/// A live handle to one logical database. Missing collections read as empty.
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<String>, AppError>;

    /// Returns false when the collection already existed.
    async fn create_collection(&self, collection: &str) -> Result<bool, AppError>;

    /// Returns false when the collection did not exist.
    async fn drop_collection(&self, collection: &str) -> Result<bool, AppError>;

    /// Run a translated query: filter, sort (then `_id`), skip, limit. Projection is applied by the caller.
    async fn find(&self, collection: &str, query: &TranslatedQuery) -> Result<Vec<Document>, AppError>;

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError>;

    /// Insert a document that already carries its `_id`. Duplicate ids fail with `Conflict`.
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, AppError>;

    /// Replace the document at `id`. None when absent.
    async fn replace(&self, collection: &str, id: &str, doc: Document) -> Result<Option<Document>, AppError>;

    /// Replace or insert. The flag is true when the document was created.
    async fn upsert(&self, collection: &str, id: &str, doc: Document) -> Result<(Document, bool), AppError>;

    /// Returns false when no document had that id.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AppError>;

    async fn count(&self, collection: &str, query: &TranslatedQuery) -> Result<u64, AppError>;

    /// Create an index on a dotted field path. Returns the index name.
    async fn create_index(&self, collection: &str, field: &str) -> Result<String, AppError>;

    async fn drop_index(&self, collection: &str, field: &str) -> Result<bool, AppError>;

    async fn stats(&self) -> Result<Value, AppError>;

    /// Release the underlying connection(s). The handle must not be used afterwards.
    async fn close(&self);
}

/// Name used for the index on `field` of `collection` by every backend.
pub fn index_name(collection: &str, field: &str) -> String {
    format!("{}_{}_idx", collection, field).replace(['.', '-'], "_")
}
