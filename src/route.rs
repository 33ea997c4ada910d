//! Resource routing: path segment count and verb select one of a closed set of routes.

use crate::error::AppError;
use axum::http::Method;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    ListDatabases,
    ListCollections { db: String },
    DropDatabase { db: String },
    RunCommand { db: String },
    ListItems { db: String, collection: String },
    CreateItem { db: String, collection: String },
    DropCollection { db: String, collection: String },
    ReadItem { db: String, collection: String, id: String },
    UpdateItem { db: String, collection: String, id: String },
    DeleteItem { db: String, collection: String, id: String },
}

/// Non-empty segments of a decoded path; leading, trailing and repeated slashes are ignored.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl Route {
    /// Segments are taken verbatim; identifier checks happen in the store layer.
    /// HEAD resolves like GET.
    pub fn resolve(method: &Method, segments: &[&str]) -> Result<Route, AppError> {
        let verb = if *method == Method::HEAD { "GET" } else { method.as_str() };
        let route = match (segments, verb) {
            ([], "GET") => Route::ListDatabases,
            ([db], "GET") => Route::ListCollections { db: db.to_string() },
            ([db], "DELETE") => Route::DropDatabase { db: db.to_string() },
            ([db], "POST") => Route::RunCommand { db: db.to_string() },
            ([db, collection], "GET") => Route::ListItems {
                db: db.to_string(),
                collection: collection.to_string(),
            },
            ([db, collection], "POST") => Route::CreateItem {
                db: db.to_string(),
                collection: collection.to_string(),
            },
            ([db, collection], "DELETE") => Route::DropCollection {
                db: db.to_string(),
                collection: collection.to_string(),
            },
            ([db, collection, id], "GET") => Route::ReadItem {
                db: db.to_string(),
                collection: collection.to_string(),
                id: id.to_string(),
            },
            ([db, collection, id], "PUT") => Route::UpdateItem {
                db: db.to_string(),
                collection: collection.to_string(),
                id: id.to_string(),
            },
            ([db, collection, id], "DELETE") => Route::DeleteItem {
                db: db.to_string(),
                collection: collection.to_string(),
                id: id.to_string(),
            },
            _ => {
                return Err(AppError::RouteNotFound {
                    method: method.to_string(),
                    path: format!("/{}", segments.join("/")),
                })
            }
        };
        Ok(route)
    }

    pub fn database(&self) -> Option<&str> {
        match self {
            Route::ListDatabases => None,
            Route::ListCollections { db }
            | Route::DropDatabase { db }
            | Route::RunCommand { db }
            | Route::ListItems { db, .. }
            | Route::CreateItem { db, .. }
            | Route::DropCollection { db, .. }
            | Route::ReadItem { db, .. }
            | Route::UpdateItem { db, .. }
            | Route::DeleteItem { db, .. } => Some(db),
        }
    }
}
