//! HTTP entry points for the resource hierarchy. Every request is resolved to a `Route`
//! and dispatched to the CRUD or admin service; errors become `{"error": ..}` envelopes.

use crate::error::AppError;
use crate::query::TranslatedQuery;
use crate::response::Envelope;
use crate::route::{split_path, Route};
use crate::service::{AdminService, CrudService, RequestValidator};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{Method, StatusCode},
};
use serde_json::Value;
use std::collections::HashMap;

type Params = Result<Query<HashMap<String, String>>, QueryRejection>;
type Body = Result<Bytes, BytesRejection>;

/// `/`: only GET (list databases) is routed.
pub async fn root(
    State(state): State<AppState>,
    method: Method,
    params: Params,
    body: Body,
) -> Result<Envelope, AppError> {
    dispatch(&state, &method, "", params, body).await
}

/// `/{db}`, `/{db}/{collection}`, `/{db}/{collection}/{id}`.
pub async fn nested(
    State(state): State<AppState>,
    method: Method,
    path: Result<Path<String>, PathRejection>,
    params: Params,
    body: Body,
) -> Result<Envelope, AppError> {
    let Path(path) = path.map_err(|e| AppError::BadIdentifier(e.body_text()))?;
    dispatch(&state, &method, &path, params, body).await
}

fn body_bytes(body: Body) -> Result<Bytes, AppError> {
    body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(e.body_text())
        } else {
            AppError::Validation(e.body_text())
        }
    })
}

fn upsert_flag(params: &HashMap<String, String>) -> Result<bool, AppError> {
    match params.get("upsert").map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" || v.is_empty() => Ok(false),
        Some(v) => Err(AppError::BadQuery(format!("upsert must be true or false, got '{}'", v))),
    }
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    params: Params,
    body: Body,
) -> Result<Envelope, AppError> {
    let route = Route::resolve(method, &split_path(path))?;
    tracing::debug!(?route, "dispatch");
    let Query(params) = params.map_err(|e| AppError::BadQuery(e.body_text()))?;
    let body = body_bytes(body)?;
    let flavor = state.config.flavor;
    let registry = state.registry.as_ref();

    let envelope = match route {
        Route::ListDatabases => {
            let names = AdminService::list_databases(registry).await?;
            Envelope::ok(Value::from(names))
        }
        Route::ListCollections { db } => {
            let names = AdminService::list_collections(registry, &db).await?;
            Envelope::ok(Value::from(names))
        }
        Route::DropDatabase { db } => {
            AdminService::drop_database(registry, &db).await?;
            Envelope::empty()
        }
        Route::RunCommand { db } => {
            let result = AdminService::run_command(registry, &state.commands, &db, &body).await?;
            Envelope::ok(result)
        }
        Route::DropCollection { db, collection } => {
            AdminService::drop_collection(registry, &db, &collection).await?;
            Envelope::empty()
        }
        Route::ListItems { db, collection } => {
            let query = TranslatedQuery::translate(&params, flavor)?
                .with_default_limit(state.config.default_page_size);
            let handle = registry.acquire(&db).await?;
            let docs = CrudService::list(handle.as_ref(), &collection, &query).await?;
            Envelope::ok(flavor.docs_to_client(docs))
        }
        Route::CreateItem { db, collection } => {
            let doc = flavor.from_client(RequestValidator::object(&body)?);
            let handle = registry.acquire(&db).await?;
            let created = CrudService::create(handle.as_ref(), &collection, doc).await?;
            Envelope::created(Value::Object(flavor.to_client(created)))
        }
        Route::ReadItem { db, collection, id } => {
            let handle = registry.acquire(&db).await?;
            let doc = CrudService::read(handle.as_ref(), &collection, &id).await?;
            Envelope::ok(Value::Object(flavor.to_client(doc)))
        }
        Route::UpdateItem { db, collection, id } => {
            let upsert = upsert_flag(&params)?;
            let doc = flavor.from_client(RequestValidator::object(&body)?);
            let handle = registry.acquire(&db).await?;
            let (doc, created) = CrudService::update(handle.as_ref(), &collection, &id, doc, upsert).await?;
            let body = Value::Object(flavor.to_client(doc));
            if created {
                Envelope::created(body)
            } else {
                Envelope::ok(body)
            }
        }
        Route::DeleteItem { db, collection, id } => {
            let handle = registry.acquire(&db).await?;
            CrudService::delete(handle.as_ref(), &collection, &id).await?;
            Envelope::empty()
        }
    };
    Ok(envelope.pretty(state.config.pretty_json))
}
