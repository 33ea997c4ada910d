//! Builds parameterized statements against one collection table `(id TEXT PRIMARY KEY, doc JSONB)`.

use crate::query::{SortDirection, TranslatedQuery};
use crate::sql::PgBindValue;
use crate::store::names::field_segments;
use crate::store::Document;
use serde_json::Value;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a string literal for DDL, where parameters are not allowed.
fn quoted_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, collection: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(collection))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema))
}

pub fn create_table(schema: &str, collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)",
        qualified_table(schema, collection)
    )
}

pub fn drop_table(schema: &str, collection: &str) -> String {
    format!("DROP TABLE {}", qualified_table(schema, collection))
}

/// WHERE clause for the equality filter: `doc #> $path = $value` per term, ANDed.
fn where_clause(q: &mut QueryBuf, query: &TranslatedQuery) -> String {
    let mut parts = Vec::new();
    for (field, value) in &query.filter {
        let path = q.push_param(PgBindValue::Path(field_segments(field)));
        let val = q.push_param(PgBindValue::Json(value.clone()));
        parts.push(format!("doc #> ${}::text[] = ${}::jsonb", path, val));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT with filter, sort (then id), LIMIT and OFFSET.
pub fn select_list(schema: &str, collection: &str, query: &TranslatedQuery) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(schema, collection);
    let where_clause = where_clause(&mut q, query);

    let mut order_parts = Vec::new();
    for (field, dir) in &query.sort {
        let path = q.push_param(PgBindValue::Path(field_segments(field)));
        let dir = match dir {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        order_parts.push(format!("doc #> ${}::text[] {}", path, dir));
    }
    order_parts.push("id".to_string());

    let limit_clause = query.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = query.skip.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT doc FROM {}{} ORDER BY {}{}{}",
        table,
        where_clause,
        order_parts.join(", "),
        limit_clause,
        offset_clause
    );
    q
}

pub fn count(schema: &str, collection: &str, query: &TranslatedQuery) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(schema, collection);
    let where_clause = where_clause(&mut q, query);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_clause);
    q
}

pub fn select_by_id(schema: &str, collection: &str, id: &str) -> QueryBuf {
    let mut q = QueryBuf::default();
    q.push_param(PgBindValue::Text(id.to_string()));
    q.sql = format!("SELECT doc FROM {} WHERE id = $1", qualified_table(schema, collection));
    q
}

pub fn insert(schema: &str, collection: &str, id: &str, doc: &Document) -> QueryBuf {
    let mut q = QueryBuf::default();
    q.push_param(PgBindValue::Text(id.to_string()));
    q.push_param(PgBindValue::Json(Value::Object(doc.clone())));
    q.sql = format!(
        "INSERT INTO {} (id, doc) VALUES ($1, $2::jsonb) RETURNING doc",
        qualified_table(schema, collection)
    );
    q
}

pub fn replace(schema: &str, collection: &str, id: &str, doc: &Document) -> QueryBuf {
    let mut q = QueryBuf::default();
    q.push_param(PgBindValue::Text(id.to_string()));
    q.push_param(PgBindValue::Json(Value::Object(doc.clone())));
    q.sql = format!(
        "UPDATE {} SET doc = $2::jsonb WHERE id = $1 RETURNING doc",
        qualified_table(schema, collection)
    );
    q
}

/// INSERT .. ON CONFLICT DO UPDATE; `inserted` is true when no row existed (xmax = 0).
pub fn upsert(schema: &str, collection: &str, id: &str, doc: &Document) -> QueryBuf {
    let mut q = QueryBuf::default();
    q.push_param(PgBindValue::Text(id.to_string()));
    q.push_param(PgBindValue::Json(Value::Object(doc.clone())));
    q.sql = format!(
        "INSERT INTO {} (id, doc) VALUES ($1, $2::jsonb) \
         ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc \
         RETURNING doc, (xmax = 0) AS inserted",
        qualified_table(schema, collection)
    );
    q
}

pub fn delete(schema: &str, collection: &str, id: &str) -> QueryBuf {
    let mut q = QueryBuf::default();
    q.push_param(PgBindValue::Text(id.to_string()));
    q.sql = format!("DELETE FROM {} WHERE id = $1", qualified_table(schema, collection));
    q
}

/// Expression index on a field path. DDL takes no parameters, so the path is a quoted literal;
/// callers pass only validated field paths.
pub fn create_index(schema: &str, collection: &str, index: &str, field: &str) -> String {
    let elems: Vec<String> = field_segments(field)
        .iter()
        .map(|s| format!("\"{}\"", s))
        .collect();
    let path = quoted_literal(&format!("{{{}}}", elems.join(",")));
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ((doc #> {}))",
        quoted(index),
        qualified_table(schema, collection),
        path
    )
}

pub fn drop_index(schema: &str, index: &str) -> String {
    format!("DROP INDEX IF EXISTS {}", qualified_table(schema, index))
}
