//! HTTP surface: routing, configuration errors, authentication and a full
//! conversion driven the way the admin client drives it

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use ferry_common::api::auth::sign_request;
use ferry_cv::source::{AdapterRegistry, SourceConnection};
use ferry_cv::{build_router, AppState};
use helpers::{count, destination, temp_dir, LegacyFixture};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot`

fn setup_state(db: SqlitePool, shared_secret: i64) -> AppState {
    AppState::new(db, shared_secret, AdapterRegistry::builtin().unwrap()).with_lookup_table(false)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(body: Body) -> Value {
    serde_json::from_str(&body_text(body).await).unwrap()
}

fn convert_body(connection: &SourceConnection, platform: &str) -> Value {
    json!({
        "action": "process",
        "platform": platform,
        "rowsPerPage": 2,
        "restart": false,
        "clean": false,
        "convertUsers": true,
        "sourceConnection": {
            "server": "localhost",
            "port": 3306,
            "name": connection.name,
            "user": "ignored",
            "password": "ignored",
            "tablePrefix": connection.table_prefix,
        }
    })
}

async fn app_with_legacy(shared_secret: i64) -> (tempfile::TempDir, SourceConnection, SqlitePool, Router) {
    let dir = temp_dir();
    let legacy = LegacyFixture::create(dir.path()).await;
    legacy.add_forums(3).await;
    legacy.add_user(1, "hana", "pw").await;
    legacy.add_topic(1, 1, 1, "Hello").await;
    let (connection, source) = legacy.finish().await;
    source.close().await;

    let pool = destination(dir.path(), false).await;
    let app = build_router(setup_state(pool.clone(), shared_secret));
    (dir, connection, pool, app)
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = temp_dir();
    let pool = destination(dir.path(), false).await;
    let app = build_router(setup_state(pool, 0));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ferry-cv");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_unknown_platform_rejected() {
    let (_dir, connection, pool, app) = app_with_legacy(0).await;

    let response = app
        .oneshot(post_json("/convert", &convert_body(&connection, "nonesuch")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "CONFIG_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("nonesuch"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM entities").await, 0);
}

#[tokio::test]
async fn test_request_validation() {
    let (_dir, connection, _pool, app) = app_with_legacy(0).await;

    let mut body = convert_body(&connection, "classic");
    body["action"] = json!("explode");
    let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = convert_body(&connection, "classic");
    body["rowsPerPage"] = json!(0);
    let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = convert_body(&connection, "classic");
    body["sourceConnection"]["tablePrefix"] = json!("bb_; DROP TABLE users");
    let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = convert_body(&connection, "classic");
    body["sourceConnection"]["name"] = json!("");
    let response = app.oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_conversion_driven_to_completion() {
    let (_dir, connection, pool, app) = app_with_legacy(0).await;
    let body = convert_body(&connection, "classic");

    let mut lines = Vec::new();
    for _ in 0..50 {
        let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let line = body_text(response.into_body()).await;
        assert!(line.starts_with("<p>") && line.ends_with("</p>"), "{}", line);
        assert!(!line.to_lowercase().contains("error"), "{}", line);
        let done = line.contains("Conversion Complete");
        lines.push(line);
        if done {
            break;
        }
    }

    assert_eq!(lines.last().map(String::as_str), Some("<p>Conversion Complete</p>"));
    assert!(lines.contains(&"<p>Converting periods (0 - 1)</p>".to_string()));
    assert!(lines.contains(&"<p>Converting periods (2 - 2)</p>".to_string()));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM entities").await, 4);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 1);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM settings WHERE key LIKE 'conversion.%'").await,
        0
    );

    let response = app.oneshot(get("/convert/status")).await.unwrap();
    let status = body_json(response.into_body()).await;
    assert_eq!(status["step"], 1);
    assert_eq!(status["offset"], 0);
    assert_eq!(status["running"], false);
}

#[tokio::test]
async fn test_status_reports_checkpoint() {
    let (_dir, connection, _pool, app) = app_with_legacy(0).await;
    let body = convert_body(&connection, "classic");

    // clean, users
    for _ in 0..2 {
        app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    }

    let response = app.oneshot(get("/convert/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response.into_body()).await;
    assert_eq!(status["step"], 3);
    assert_eq!(status["stepName"], "passwords");
    assert!(status["lastQuery"].as_str().unwrap().contains("bb_users"));
}

#[tokio::test]
async fn test_concurrent_page_rejected() {
    let dir = temp_dir();
    let pool = destination(dir.path(), false).await;
    let state = setup_state(pool, 0);
    let app = build_router(state.clone());
    let connection = SourceConnection::sqlite(dir.path().join("legacy.db").to_string_lossy(), "bb_");

    let _held = state.run_lease.lock().await;
    let response = app
        .oneshot(post_json("/convert", &convert_body(&connection, "classic")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_platforms_listed() {
    let dir = temp_dir();
    let pool = destination(dir.path(), false).await;
    let app = build_router(setup_state(pool, 0));

    let response = app.oneshot(get("/convert/platforms")).await.unwrap();
    let body = body_json(response.into_body()).await;
    assert_eq!(body[0]["name"], "classic");
}

#[tokio::test]
async fn test_authentication_required_when_secret_set() {
    let (_dir, connection, _pool, app) = app_with_legacy(424242).await;

    // Unsigned request
    let response = app
        .clone()
        .oneshot(post_json("/convert", &convert_body(&connection, "classic")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Wrong secret
    let mut body = convert_body(&connection, "classic");
    sign_request(&mut body, 1);
    let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error = body_json(response.into_body()).await;
    assert_eq!(error["error"]["code"], "UNAUTHORIZED");
    assert_eq!(error["error"]["message"], "Invalid hash");

    // Stale timestamp, otherwise valid
    let mut body = convert_body(&connection, "classic");
    sign_request(&mut body, 424242);
    body["timestamp"] = json!(body["timestamp"].as_i64().unwrap() - 60_000);
    let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correctly signed
    let mut body = convert_body(&connection, "classic");
    sign_request(&mut body, 424242);
    let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health stays public
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_upgrade_endpoint() {
    let (_dir, connection, _pool, app) = app_with_legacy(0).await;
    let body = convert_body(&connection, "classic");
    for _ in 0..50 {
        let response = app.clone().oneshot(post_json("/convert", &body)).await.unwrap();
        if body_text(response.into_body()).await.contains("Conversion Complete") {
            break;
        }
    }

    let response = app
        .clone()
        .oneshot(post_json("/convert/password", &json!({"login": "hana", "password": "pw"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response.into_body()).await;
    assert_eq!(result["upgraded"], true);
    assert_eq!(result["outcome"], "upgraded");

    let response = app
        .oneshot(post_json("/convert/password", &json!({"login": "hana", "password": "pw"})))
        .await
        .unwrap();
    let result = body_json(response.into_body()).await;
    assert_eq!(result["upgraded"], false);
    assert_eq!(result["outcome"], "not_legacy");
}
