//! End-to-end requests through the full router against the in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use docrest::config::AccessControlConfig;
use docrest::{app, AppState, Connector, Flavor, GatewayConfig, MemoryConnector};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const DB: &str = "mongodb_rest_test1";
const COLLECTION: &str = "mongodb_test_collection1";

struct TestApp {
    router: Router,
    connector: Arc<MemoryConnector>,
    state: AppState,
}

fn test_app_with(config: GatewayConfig) -> TestApp {
    let connector = Arc::new(MemoryConnector::new());
    let state = AppState::new(connector.clone(), config);
    TestApp {
        router: app(state.clone()),
        connector,
        state,
    }
}

fn test_app() -> TestApp {
    test_app_with(GatewayConfig::default())
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send_request(request).await
    }

    async fn send_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    /// Seed a collection the way a fixture loader would, bypassing HTTP.
    async fn seed(&self, db: &str, collection: &str, docs: &[Value]) {
        let handle = self.connector.connect(db).await.unwrap();
        for (i, d) in docs.iter().enumerate() {
            let mut doc = d.as_object().cloned().unwrap();
            doc.insert("_id".into(), json!(format!("seed{:02}", i)));
            handle.insert(collection, doc).await.unwrap();
        }
    }
}

fn collection_url() -> String {
    format!("/{}/{}", DB, COLLECTION)
}

fn field(docs: &Value, name: &str) -> Vec<Value> {
    docs.as_array().unwrap().iter().map(|d| d[name].clone()).collect()
}

#[tokio::test]
async fn sorted_limited_listing() {
    let app = test_app();
    app.seed(DB, COLLECTION, &[json!({"a": 1}), json!({"a": 2}), json!({"a": 3})]).await;
    let (status, body) = app.get(&format!("{}?sort=-a&limit=2", collection_url())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "a"), vec![json!(3), json!(2)]);
    assert!(body[0]["_id"].is_string());
}

#[tokio::test]
async fn skip_and_limit_over_a_larger_fixture() {
    let app = test_app();
    let docs: Vec<Value> = [5, 3, 7, 1, 6, 2, 4, 8].iter().map(|a| json!({"a": a})).collect();
    app.seed(DB, COLLECTION, &docs).await;
    let (status, body) = app.get(&format!("{}?sort=a&limit=5&skip=2", collection_url())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(field(&body, "a"), vec![json!(3), json!(4), json!(5), json!(6), json!(7)]);
}

#[tokio::test]
async fn filters_and_projection() {
    let app = test_app();
    app.seed(
        DB,
        COLLECTION,
        &[
            json!({"kind": "x", "n": 1, "extra": true}),
            json!({"kind": "y", "n": 2}),
            json!({"kind": "x", "n": 3}),
        ],
    )
    .await;
    let (status, body) = app.get(&format!("{}?kind=x&fields=n&sort=-n", collection_url())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"_id": "seed02", "n": 3}, {"_id": "seed00", "n": 1}]));

    let (_, body) = app.get(&format!("{}?query=%7B%22n%22%3A2%7D", collection_url())).await;
    assert_eq!(field(&body, "kind"), vec![json!("y")]);
}

#[tokio::test]
async fn bad_limit_is_400() {
    let app = test_app();
    let (status, body) = app.get(&format!("{}?limit=abc", collection_url())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("limit"));
    let (status, _) = app.get(&format!("{}?skip=-3", collection_url())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_collection_lists_as_empty_array() {
    let app = test_app();
    let (status, body) = app.get("/fresh_db/never_written").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn create_read_delete_lifecycle() {
    let app = test_app();
    let (status, created) = app.send("POST", &collection_url(), Some(json!({"x": 1}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["_id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(created["x"], json!(1));

    let item_url = format!("{}/{}", collection_url(), id);
    let (status, read) = app.get(&item_url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read, created);

    let (status, body) = app.send("DELETE", &item_url, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let (status, body) = app.get(&item_url).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn absent_item_is_404_for_read_update_delete() {
    let app = test_app();
    let url = format!("{}/missing", collection_url());
    assert_eq!(app.get(&url).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.send("PUT", &url, Some(json!({"v": 1}))).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.send("DELETE", &url, None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_updates_and_upserts() {
    let app = test_app();
    let url = format!("{}/k1?upsert=true", collection_url());
    let (status, body) = app.send("PUT", &url, Some(json!({"v": 1}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"_id": "k1", "v": 1}));

    let item = format!("{}/k1", collection_url());
    let (status, body) = app.send("PUT", &item, Some(json!({"v": 2}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"_id": "k1", "v": 2}));
    assert_eq!(app.get(&item).await.1, json!({"_id": "k1", "v": 2}));
}

#[tokio::test]
async fn malformed_bodies_are_400() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri(collection_url())
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.send_request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("validation"));
    let (status, _) = app.send("POST", &collection_url(), Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.send("POST", &collection_url(), Some(json!({"_id": 7}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_id_conflicts() {
    let app = test_app();
    let doc = json!({"_id": "same", "v": 1});
    assert_eq!(app.send("POST", &collection_url(), Some(doc.clone())).await.0, StatusCode::CREATED);
    assert_eq!(app.send("POST", &collection_url(), Some(doc)).await.0, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unmatched_routes_and_bad_identifiers() {
    let app = test_app();
    assert_eq!(app.send("PUT", "/db1", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.send("PATCH", "/db1/c/1", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/db1/c/1/extra").await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/db1/c/bad%20id").await.0, StatusCode::BAD_REQUEST);
    assert_eq!(app.get("/bad%20db").await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn databases_and_collections_are_listed_and_dropped() {
    let app = test_app();
    app.seed("db_a", "c1", &[json!({"v": 1})]).await;
    app.seed("db_a", "c2", &[json!({"v": 2})]).await;
    app.seed("db_b", "c1", &[json!({"v": 3})]).await;

    assert_eq!(app.get("/").await, (StatusCode::OK, json!(["db_a", "db_b"])));
    assert_eq!(app.get("/db_a").await, (StatusCode::OK, json!(["c1", "c2"])));

    assert_eq!(app.send("DELETE", "/db_a/c2", None).await.0, StatusCode::OK);
    assert_eq!(app.send("DELETE", "/db_a/c2", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/db_a").await.1, json!(["c1"]));

    assert_eq!(app.send("DELETE", "/db_b", None).await.0, StatusCode::OK);
    assert_eq!(app.send("DELETE", "/db_b", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/").await.1, json!(["db_a"]));
}

#[tokio::test]
async fn commands_run_through_post_on_database() {
    let app = test_app();
    app.seed(DB, COLLECTION, &[json!({"a": 1}), json!({"a": 2}), json!({"a": 2})]).await;
    let (status, body) = app
        .send(
            "POST",
            &format!("/{}", DB),
            Some(json!({"command": "count", "args": {"collection": COLLECTION, "query": {"a": 2}}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"count": 2}));

    let (status, body) = app.send("POST", &format!("/{}", DB), Some(json!({"command": "ping"}))).await;
    assert_eq!((status, body), (StatusCode::OK, json!({"ok": 1})));

    let (status, body) = app.send("POST", &format!("/{}", DB), Some(json!({"command": "nope"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown command"));
}

#[tokio::test]
async fn unreachable_store_is_503_and_recovers() {
    let app = test_app();
    app.connector.set_reachable(false);
    let (status, body) = app.get(&collection_url()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains(DB));
    assert_eq!(app.get("/_ready").await.0, StatusCode::SERVICE_UNAVAILABLE);

    app.connector.set_reachable(true);
    assert_eq!(app.get(&collection_url()).await.0, StatusCode::OK);
    assert_eq!(app.get("/_ready").await.0, StatusCode::OK);
}

#[tokio::test]
async fn requests_reuse_one_handle_per_database() {
    let app = test_app();
    for _ in 0..3 {
        app.send("POST", &collection_url(), Some(json!({"v": 1}))).await;
    }
    app.get(&collection_url()).await;
    assert_eq!(app.connector.open_count(), 1);

    app.state.registry.close_all().await;
    assert_eq!(app.connector.close_count(), 1);
    let (status, body) = app.get(&collection_url()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert_eq!(app.connector.open_count(), 2);
}

#[tokio::test]
async fn nounderscore_flavor_renames_id() {
    let mut config = GatewayConfig::default();
    config.flavor = Flavor::NoUnderscore;
    let app = test_app_with(config);
    let (status, created) = app.send("POST", &collection_url(), Some(json!({"id": "n1", "v": 1}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({"id": "n1", "v": 1}));
    let (_, listed) = app.get(&format!("{}?id=n1", collection_url())).await;
    assert_eq!(listed, json!([{"id": "n1", "v": 1}]));
}

#[tokio::test]
async fn default_page_size_applies_without_limit() {
    let mut config = GatewayConfig::default();
    config.default_page_size = Some(2);
    let app = test_app_with(config);
    let docs: Vec<Value> = (0..5).map(|i| json!({"i": i})).collect();
    app.seed(DB, COLLECTION, &docs).await;
    assert_eq!(app.get(&collection_url()).await.1.as_array().unwrap().len(), 2);
    assert_eq!(
        app.get(&format!("{}?limit=4", collection_url())).await.1.as_array().unwrap().len(),
        4
    );
}

#[tokio::test]
async fn access_gate_runs_before_routing() {
    let mut config = GatewayConfig::default();
    config.access_control = Some(AccessControlConfig {
        header: "X-API-Key".into(),
        keys: vec!["admin-key".into()],
        read_only_keys: vec!["read-key".into()],
    });
    let app = test_app_with(config);

    assert_eq!(app.get("/").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(app.get("/_health").await.0, StatusCode::OK);

    let with_key = |method: &str, key: &str| {
        Request::builder()
            .method(method)
            .uri(collection_url())
            .header("X-API-Key", key)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"v": 1}"#))
            .unwrap()
    };
    assert_eq!(app.send_request(with_key("GET", "read-key")).await.0, StatusCode::OK);
    assert_eq!(app.send_request(with_key("POST", "read-key")).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.send_request(with_key("POST", "admin-key")).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn version_endpoint() {
    let app = test_app();
    let (status, body) = app.get("/_version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("docrest"));
}

#[tokio::test]
async fn reading_an_unknown_database_does_not_create_it() {
    let app = test_app();
    assert_eq!(app.get("/ghost").await, (StatusCode::OK, json!([])));
    assert_eq!(app.get("/ghost/c").await, (StatusCode::OK, json!([])));
    assert_eq!(app.get("/ghost/c/x").await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/").await, (StatusCode::OK, json!([])));
    assert_eq!(app.send("DELETE", "/ghost", None).await.0, StatusCode::NOT_FOUND);

    assert_eq!(app.send("POST", "/ghost/c", Some(json!({"v": 1}))).await.0, StatusCode::CREATED);
    assert_eq!(app.get("/").await.1, json!(["ghost"]));
}

#[tokio::test]
async fn undecodable_path_is_a_json_400() {
    let app = test_app();
    let (status, body) = app.get("/%FF/c").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("bad identifier"));
}

#[tokio::test]
async fn oversized_body_is_a_json_413() {
    let mut config = GatewayConfig::default();
    config.server.body_limit_bytes = 16;
    let app = test_app_with(config);
    let big = json!({"padding": "x".repeat(100)}).to_string();

    let without_length = Request::builder()
        .method("POST")
        .uri(collection_url())
        .header("content-type", "application/json")
        .body(Body::from(big.clone()))
        .unwrap();
    let (status, body) = app.send_request(without_length).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().starts_with("payload too large"));

    let with_length = Request::builder()
        .method("POST")
        .uri(collection_url())
        .header("content-type", "application/json")
        .header("content-length", big.len())
        .body(Body::from(big))
        .unwrap();
    let (status, body) = app.send_request(with_length).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());

    assert_eq!(app.send("POST", &collection_url(), Some(json!({"v": 1}))).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn dotted_fields_project_nested_values() {
    let app = test_app();
    app.seed(DB, COLLECTION, &[json!({"name": "n", "address": {"city": "Oslo", "zip": "0150"}})]).await;
    let (status, body) = app.get(&format!("{}?fields=address.city", collection_url())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"_id": "seed00", "address": {"city": "Oslo"}}]));

    let (_, body) = app.get(&format!("{}?query=%7B%22address.zip%22%3A%220150%22%7D", collection_url())).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
