//! Generic document CRUD against one database handle.

use crate::error::AppError;
use crate::query::TranslatedQuery;
use crate::service::RequestValidator;
use crate::store::names::{check_collection, check_item_id};
use crate::store::{Database, Document, ID_FIELD};
use serde_json::Value;

pub struct CrudService;

impl CrudService {
    /// Run the query and apply its projection. A missing or empty collection yields an empty list.
    pub async fn list(
        db: &dyn Database,
        collection: &str,
        query: &TranslatedQuery,
    ) -> Result<Vec<Document>, AppError> {
        check_collection(collection)?;
        let docs = db.find(collection, query).await?;
        Ok(docs.into_iter().map(|d| query.project(d)).collect())
    }

    /// Insert one document, assigning a UUID `_id` when absent. Returns the stored document.
    pub async fn create(db: &dyn Database, collection: &str, mut doc: Document) -> Result<Document, AppError> {
        check_collection(collection)?;
        if RequestValidator::client_id(&doc)?.is_none() {
            doc.insert(ID_FIELD.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        db.insert(collection, doc).await
    }

    pub async fn read(db: &dyn Database, collection: &str, id: &str) -> Result<Document, AppError> {
        check_collection(collection)?;
        check_item_id(id)?;
        db.find_by_id(collection, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}/{}/{}", db.name(), collection, id)))
    }

    /// Replace the document at `id`. Without `upsert` an absent id is `NotFound`;
    /// with it the document is created and the flag is true.
    pub async fn update(
        db: &dyn Database,
        collection: &str,
        id: &str,
        mut doc: Document,
        upsert: bool,
    ) -> Result<(Document, bool), AppError> {
        check_collection(collection)?;
        check_item_id(id)?;
        match doc.get(ID_FIELD) {
            Some(Value::String(s)) if s == id => {}
            None => {}
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "_id {} does not match the item id '{}'",
                    other, id
                )))
            }
        }
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        if upsert {
            return db.upsert(collection, id, doc).await;
        }
        let updated = db
            .replace(collection, id, doc)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}/{}/{}", db.name(), collection, id)))?;
        Ok((updated, false))
    }

    pub async fn delete(db: &dyn Database, collection: &str, id: &str) -> Result<(), AppError> {
        check_collection(collection)?;
        check_item_id(id)?;
        if db.delete(collection, id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("{}/{}/{}", db.name(), collection, id)))
        }
    }
}
