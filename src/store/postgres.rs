//! PostgreSQL JSONB backend. One pool per logical database; one table per collection
//! in the configured schema, holding `(id TEXT PRIMARY KEY, doc JSONB)`. A database is
//! created by its first write; reads of an absent database are empty.

use crate::config::StoreConfig;
use crate::error::AppError;
use crate::query::TranslatedQuery;
use crate::sql::{self, quoted, qualified_table, QueryBuf};
use crate::store::{index_name, Connector, Database, Document};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, Connection, PgConnection, PgPool, Postgres, Row};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::OnceCell;

const UNDEFINED_TABLE: &str = "42P01";
const UNIQUE_VIOLATION: &str = "23505";
const DUPLICATE_DATABASE: &str = "42P04";

fn has_code(e: &sqlx::Error, code: &str) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(code))
}

fn build(q: &QueryBuf) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

fn row_to_doc(row: &PgRow) -> Result<Document, AppError> {
    match row.try_get::<Value, _>("doc")? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Store(format!("stored document is not an object: {}", other))),
    }
}

/// Server settings shared by the connector and every handle it opens.
struct Cluster {
    config: StoreConfig,
}

impl Cluster {
    fn options(&self, database: &str) -> PgConnectOptions {
        let opts = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .database(database);
        match &self.config.password {
            Some(p) => opts.password(p),
            None => opts,
        }
    }

    /// Single connection to the maintenance database for CREATE/DROP DATABASE and listing.
    async fn admin_connection(&self) -> Result<PgConnection, AppError> {
        Ok(self.options(&self.config.maintenance_database).connect().await?)
    }

    async fn exists_on(conn: &mut PgConnection, database: &str) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(database)
            .fetch_one(conn)
            .await?;
        Ok(exists.0)
    }

    async fn database_exists(&self, database: &str) -> Result<bool, AppError> {
        let mut conn = self.admin_connection().await?;
        let exists = Self::exists_on(&mut conn, database).await?;
        conn.close().await?;
        Ok(exists)
    }

    /// Create the database if it does not exist. Losing a creation race is not an error.
    async fn ensure_database_exists(&self, database: &str) -> Result<(), AppError> {
        let mut conn = self.admin_connection().await?;
        if !Self::exists_on(&mut conn, database).await? {
            tracing::info!(database, "creating database");
            match sqlx::query(&format!("CREATE DATABASE {}", quoted(database)))
                .execute(&mut conn)
                .await
            {
                Ok(_) => {}
                Err(e) if has_code(&e, DUPLICATE_DATABASE) => {}
                Err(e) => return Err(e.into()),
            }
        }
        conn.close().await?;
        Ok(())
    }

    async fn open_pool(&self, database: &str) -> Result<PgPool, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect_with(self.options(database))
            .await?;
        sqlx::query(&sql::create_schema(&self.config.schema))
            .execute(&pool)
            .await?;
        tracing::info!(database, "opened pool");
        Ok(pool)
    }
}

pub struct PgConnector {
    cluster: Arc<Cluster>,
}

impl PgConnector {
    pub fn new(config: StoreConfig) -> Self {
        PgConnector {
            cluster: Arc::new(Cluster { config }),
        }
    }

    fn check_not_reserved(&self, database: &str) -> Result<(), AppError> {
        if database == self.cluster.config.maintenance_database {
            return Err(AppError::BadIdentifier(format!("database '{}' is reserved", database)));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for PgConnector {
    /// Checks the server is reachable. The database itself is created by the first write.
    async fn connect(&self, database: &str) -> Result<Arc<dyn Database>, AppError> {
        self.check_not_reserved(database)?;
        self.ping().await?;
        Ok(Arc::new(PgDatabase::new(database, self.cluster.clone())))
    }

    async fn list_databases(&self) -> Result<Vec<String>, AppError> {
        let mut conn = self.cluster.admin_connection().await?;
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT datname FROM pg_database WHERE NOT datistemplate AND datname <> $1 ORDER BY datname",
        )
        .bind(&self.cluster.config.maintenance_database)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;
        Ok(names)
    }

    async fn drop_database(&self, database: &str) -> Result<bool, AppError> {
        self.check_not_reserved(database)?;
        let mut conn = self.cluster.admin_connection().await?;
        let exists = Cluster::exists_on(&mut conn, database).await?;
        if exists {
            sqlx::query(&format!("DROP DATABASE {} WITH (FORCE)", quoted(database)))
                .execute(&mut conn)
                .await?;
            tracing::info!(database, "dropped database");
        }
        conn.close().await?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.cluster.admin_connection().await?;
        conn.ping().await?;
        conn.close().await?;
        Ok(())
    }
}

pub struct PgDatabase {
    name: String,
    schema: String,
    cluster: Arc<Cluster>,
    /// Opened on first use; stays empty while the database does not exist.
    pool: OnceCell<PgPool>,
    /// Collections whose table is known to exist, to skip CREATE TABLE on every write.
    known: RwLock<HashSet<String>>,
}

impl PgDatabase {
    fn new(name: &str, cluster: Arc<Cluster>) -> Self {
        PgDatabase {
            name: name.to_string(),
            schema: cluster.config.schema.clone(),
            cluster,
            pool: OnceCell::new(),
            known: RwLock::new(HashSet::new()),
        }
    }

    /// Pool for reads. None when the database does not exist; nothing is created.
    async fn read_pool(&self) -> Result<Option<&PgPool>, AppError> {
        if let Some(pool) = self.pool.get() {
            return Ok(Some(pool));
        }
        if !self.cluster.database_exists(&self.name).await? {
            return Ok(None);
        }
        let pool = self
            .pool
            .get_or_try_init(|| self.cluster.open_pool(&self.name))
            .await?;
        Ok(Some(pool))
    }

    /// Pool for writes, creating the database on first use when configured to.
    async fn write_pool(&self) -> Result<&PgPool, AppError> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        if self.cluster.config.create_databases {
            self.cluster.ensure_database_exists(&self.name).await?;
        }
        self.pool
            .get_or_try_init(|| self.cluster.open_pool(&self.name))
            .await
    }

    fn is_known(&self, collection: &str) -> bool {
        self.known.read().map(|k| k.contains(collection)).unwrap_or(false)
    }

    fn remember(&self, collection: &str, exists: bool) {
        if let Ok(mut k) = self.known.write() {
            if exists {
                k.insert(collection.to_string());
            } else {
                k.remove(collection);
            }
        }
    }

    async fn ensure_collection(&self, pool: &PgPool, collection: &str) -> Result<(), AppError> {
        if self.is_known(collection) {
            return Ok(());
        }
        sqlx::query(&sql::create_table(&self.schema, collection))
            .execute(pool)
            .await?;
        self.remember(collection, true);
        Ok(())
    }

    /// Run a write that needs the table. Retries once if the table vanished behind our cache.
    async fn write_one(&self, collection: &str, q: &QueryBuf) -> Result<Option<PgRow>, AppError> {
        let pool = self.write_pool().await?;
        self.ensure_collection(pool, collection).await?;
        match build(q).fetch_optional(pool).await {
            Err(e) if has_code(&e, UNDEFINED_TABLE) => {
                self.remember(collection, false);
                self.ensure_collection(pool, collection).await?;
                Ok(build(q).fetch_optional(pool).await?)
            }
            Err(e) if has_code(&e, UNIQUE_VIOLATION) => {
                Err(AppError::Conflict(format!("duplicate _id in '{}'", collection)))
            }
            other => Ok(other?),
        }
    }
}

#[async_trait]
impl Database for PgDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(Vec::new());
        };
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(pool)
        .await?;
        Ok(names)
    }

    async fn create_collection(&self, collection: &str) -> Result<bool, AppError> {
        let pool = self.write_pool().await?;
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(qualified_table(&self.schema, collection))
            .fetch_one(pool)
            .await?;
        if !exists {
            sqlx::query(&sql::create_table(&self.schema, collection))
                .execute(pool)
                .await?;
        }
        self.remember(collection, true);
        Ok(!exists)
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(false);
        };
        let result = sqlx::query(&sql::drop_table(&self.schema, collection))
            .execute(pool)
            .await;
        self.remember(collection, false);
        match result {
            Ok(_) => Ok(true),
            Err(e) if has_code(&e, UNDEFINED_TABLE) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, collection: &str, query: &TranslatedQuery) -> Result<Vec<Document>, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(Vec::new());
        };
        let q = sql::select_list(&self.schema, collection, query);
        match build(&q).fetch_all(pool).await {
            Ok(rows) => rows.iter().map(row_to_doc).collect(),
            Err(e) if has_code(&e, UNDEFINED_TABLE) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(None);
        };
        let q = sql::select_by_id(&self.schema, collection, id);
        match build(&q).fetch_optional(pool).await {
            Ok(row) => row.as_ref().map(row_to_doc).transpose(),
            Err(e) if has_code(&e, UNDEFINED_TABLE) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, AppError> {
        let id = doc
            .get(crate::store::ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Validation("document has no string _id".into()))?
            .to_string();
        let q = sql::insert(&self.schema, collection, &id, &doc);
        let row = self
            .write_one(collection, &q)
            .await?
            .ok_or_else(|| AppError::Store("insert returned no row".into()))?;
        row_to_doc(&row)
    }

    async fn replace(&self, collection: &str, id: &str, doc: Document) -> Result<Option<Document>, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(None);
        };
        let q = sql::replace(&self.schema, collection, id, &doc);
        match build(&q).fetch_optional(pool).await {
            Ok(row) => row.as_ref().map(row_to_doc).transpose(),
            Err(e) if has_code(&e, UNDEFINED_TABLE) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Document) -> Result<(Document, bool), AppError> {
        let q = sql::upsert(&self.schema, collection, id, &doc);
        let row = self
            .write_one(collection, &q)
            .await?
            .ok_or_else(|| AppError::Store("upsert returned no row".into()))?;
        let inserted: bool = row.try_get("inserted")?;
        Ok((row_to_doc(&row)?, inserted))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(false);
        };
        let q = sql::delete(&self.schema, collection, id);
        match build(&q).execute(pool).await {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(e) if has_code(&e, UNDEFINED_TABLE) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, collection: &str, query: &TranslatedQuery) -> Result<u64, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(0);
        };
        let q = sql::count(&self.schema, collection, query);
        match build(&q).fetch_one(pool).await {
            Ok(row) => Ok(row.try_get::<i64, _>(0)?.max(0) as u64),
            Err(e) if has_code(&e, UNDEFINED_TABLE) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_index(&self, collection: &str, field: &str) -> Result<String, AppError> {
        let pool = self.write_pool().await?;
        self.ensure_collection(pool, collection).await?;
        let name = index_name(collection, field);
        sqlx::query(&sql::create_index(&self.schema, collection, &name, field))
            .execute(pool)
            .await?;
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, field: &str) -> Result<bool, AppError> {
        let Some(pool) = self.read_pool().await? else {
            return Ok(false);
        };
        let name = index_name(collection, field);
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM pg_indexes WHERE schemaname = $1 AND tablename = $2 AND indexname = $3)",
        )
        .bind(&self.schema)
        .bind(collection)
        .bind(&name)
        .fetch_one(pool)
        .await?;
        if exists {
            sqlx::query(&sql::drop_index(&self.schema, &name))
                .execute(pool)
                .await?;
        }
        Ok(exists)
    }

    async fn stats(&self) -> Result<Value, AppError> {
        let rows: Vec<(String, i64, i64)> = match self.read_pool().await? {
            Some(pool) => {
                sqlx::query_as(
                    "SELECT c.relname::text, c.reltuples::bigint, pg_total_relation_size(c.oid) \
                     FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                     WHERE n.nspname = $1 AND c.relkind = 'r'",
                )
                .bind(&self.schema)
                .fetch_all(pool)
                .await?
            }
            None => Vec::new(),
        };
        let objects: i64 = rows.iter().map(|(_, n, _)| (*n).max(0)).sum();
        let size: i64 = rows.iter().map(|(_, _, s)| *s).sum();
        Ok(json!({
            "db": self.name,
            "collections": rows.len(),
            "objects": objects,
            "storageSize": size,
        }))
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            tracing::info!(database = %self.name, "closed pool");
        }
    }
}
