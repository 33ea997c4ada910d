//! Request body checks shared by create, update and command requests.

use crate::error::AppError;
use crate::store::names::check_item_id;
use crate::store::{Document, ID_FIELD};
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Parse a raw body as a JSON object.
    pub fn object(body: &[u8]) -> Result<Document, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::Validation("request body must be a JSON object".into()));
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(AppError::Validation("request body must be a JSON object".into())),
            Err(e) => Err(AppError::Validation(format!("malformed JSON body: {}", e))),
        }
    }

    /// A client-supplied `_id` must be a string usable as a URL segment.
    pub fn client_id(doc: &Document) -> Result<Option<String>, AppError> {
        match doc.get(ID_FIELD) {
            None => Ok(None),
            Some(Value::String(s)) => {
                check_item_id(s).map_err(|_| AppError::Validation(format!("_id '{}' is not a valid identifier", s)))?;
                Ok(Some(s.clone()))
            }
            Some(other) => Err(AppError::Validation(format!("_id must be a string, got {}", other))),
        }
    }
}
