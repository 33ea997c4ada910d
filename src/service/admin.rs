//! Database- and collection-level operations that bypass the document CRUD path.

use crate::commands::CommandRegistry;
use crate::error::AppError;
use crate::registry::ConnectionRegistry;
use crate::service::RequestValidator;
use crate::store::names::{check_collection, check_database};
use serde_json::{Map, Value};

pub struct AdminService;

impl AdminService {
    pub async fn list_databases(registry: &ConnectionRegistry) -> Result<Vec<String>, AppError> {
        registry.connector().list_databases().await
    }

    pub async fn list_collections(registry: &ConnectionRegistry, db: &str) -> Result<Vec<String>, AppError> {
        let handle = registry.acquire(db).await?;
        handle.list_collections().await
    }

    /// Release our handle so the store can drop the database, and again afterwards for any
    /// handle a concurrent request opened in between. Absent database is `NotFound`.
    pub async fn drop_database(registry: &ConnectionRegistry, db: &str) -> Result<(), AppError> {
        check_database(db)?;
        registry.release(db).await;
        let dropped = registry.connector().drop_database(db).await?;
        registry.release(db).await;
        if dropped {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("database {}", db)))
        }
    }

    pub async fn drop_collection(registry: &ConnectionRegistry, db: &str, collection: &str) -> Result<(), AppError> {
        check_collection(collection)?;
        let handle = registry.acquire(db).await?;
        if handle.drop_collection(collection).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("collection {}/{}", db, collection)))
        }
    }

    /// Body `{"command": name, "args": {...}}`; `args` may be omitted.
    pub async fn run_command(
        registry: &ConnectionRegistry,
        commands: &CommandRegistry,
        db: &str,
        body: &[u8],
    ) -> Result<Value, AppError> {
        let mut request = RequestValidator::object(body)?;
        let name = match request.remove("command") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => return Err(AppError::Validation("'command' must be a non-empty string".into())),
        };
        let args = match request.remove("args") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m,
            Some(_) => return Err(AppError::Validation("'args' must be an object".into())),
        };
        let handle = registry.acquire(db).await?;
        commands.run(&name, handle.as_ref(), &args).await
    }
}
