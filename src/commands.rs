//! Named administrative commands run against one database: a dispatch table from command
//! name to handler. New commands are registered without touching the router.

use crate::error::AppError;
use crate::flavor::Flavor;
use crate::query::TranslatedQuery;
use crate::store::names::{check_collection, is_field_path};
use crate::store::Database;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[async_trait]
pub trait AdminCommand: Send + Sync {
    async fn run(&self, db: &dyn Database, args: &Map<String, Value>) -> Result<Value, AppError>;
}

#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn AdminCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `ping`, `stats`, `count`, `createCollection`, `createIndex`, `dropIndex`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping", Arc::new(Ping));
        registry.register("stats", Arc::new(Stats));
        registry.register("count", Arc::new(Count));
        registry.register("createCollection", Arc::new(CreateCollection));
        registry.register("createIndex", Arc::new(CreateIndex));
        registry.register("dropIndex", Arc::new(DropIndex));
        registry
    }

    /// Add or replace a command.
    pub fn register(&mut self, name: &str, command: Arc<dyn AdminCommand>) {
        self.commands.insert(name.to_string(), command);
    }

    /// Registered names, plus the registry-level `listCommands`.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.push("listCommands".to_string());
        names.sort();
        names
    }

    pub async fn run(&self, name: &str, db: &dyn Database, args: &Map<String, Value>) -> Result<Value, AppError> {
        if name == "listCommands" {
            return Ok(json!({ "commands": self.names() }));
        }
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| AppError::UnknownCommand(name.to_string()))?;
        tracing::debug!(command = name, database = db.name(), "running command");
        command.run(db, args).await
    }
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, AppError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation(format!("argument '{}' must be a string", key)))
}

fn collection_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, AppError> {
    let name = str_arg(args, key)?;
    check_collection(name)?;
    Ok(name)
}

fn field_arg<'a>(args: &'a Map<String, Value>) -> Result<&'a str, AppError> {
    let field = str_arg(args, "field")?;
    if !is_field_path(field) {
        return Err(AppError::Validation(format!("invalid field '{}'", field)));
    }
    Ok(field)
}

struct Ping;

#[async_trait]
impl AdminCommand for Ping {
    async fn run(&self, _db: &dyn Database, _args: &Map<String, Value>) -> Result<Value, AppError> {
        Ok(json!({ "ok": 1 }))
    }
}

struct Stats;

#[async_trait]
impl AdminCommand for Stats {
    async fn run(&self, db: &dyn Database, _args: &Map<String, Value>) -> Result<Value, AppError> {
        db.stats().await
    }
}

/// `{collection, query?}`: number of documents matching the equality filter in `query`.
struct Count;

#[async_trait]
impl AdminCommand for Count {
    async fn run(&self, db: &dyn Database, args: &Map<String, Value>) -> Result<Value, AppError> {
        let collection = collection_arg(args, "collection")?;
        let query = match args.get("query") {
            None | Some(Value::Null) => TranslatedQuery::default(),
            Some(Value::Object(terms)) => {
                let params = HashMap::from([("query".to_string(), Value::Object(terms.clone()).to_string())]);
                TranslatedQuery::translate(&params, Flavor::Regular)?
            }
            Some(_) => return Err(AppError::Validation("argument 'query' must be an object".into())),
        };
        let n = db.count(collection, &query).await?;
        Ok(json!({ "count": n }))
    }
}

struct CreateCollection;

#[async_trait]
impl AdminCommand for CreateCollection {
    async fn run(&self, db: &dyn Database, args: &Map<String, Value>) -> Result<Value, AppError> {
        let name = collection_arg(args, "name")?;
        let created = db.create_collection(name).await?;
        Ok(json!({ "created": created }))
    }
}

struct CreateIndex;

#[async_trait]
impl AdminCommand for CreateIndex {
    async fn run(&self, db: &dyn Database, args: &Map<String, Value>) -> Result<Value, AppError> {
        let collection = collection_arg(args, "collection")?;
        let index = db.create_index(collection, field_arg(args)?).await?;
        Ok(json!({ "index": index }))
    }
}

struct DropIndex;

#[async_trait]
impl AdminCommand for DropIndex {
    async fn run(&self, db: &dyn Database, args: &Map<String, Value>) -> Result<Value, AppError> {
        let collection = collection_arg(args, "collection")?;
        let dropped = db.drop_index(collection, field_arg(args)?).await?;
        Ok(json!({ "dropped": dropped }))
    }
}
