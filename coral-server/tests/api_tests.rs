//! Integration tests for the coral-server HTTP API
//!
//! The router is driven in-process against a temporary registry and a small `tissue`
//! entity database.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use coral_cohort::CohortService;
use coral_common::config::{AttachConfig, DatabaseConfig, TomlConfig};
use coral_common::db::DatabasePools;
use coral_server::{build_router, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: registry plus entity database `publicdb` with a seeded tissue table
async fn setup_app() -> (axum::Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TomlConfig::default();
    config.registry = DatabaseConfig {
        name: "registry".to_string(),
        path: dir.path().join("registry.db"),
        attach: Vec::new(),
    };
    config.databases = vec![DatabaseConfig {
        name: "publicdb".to_string(),
        path: dir.path().join("publicdb.db"),
        attach: vec![AttachConfig {
            schema: "tissue".to_string(),
            path: dir.path().join("tissue.db"),
        }],
    }];

    let service = CohortService::connect(&config).await.unwrap();

    let pools = DatabasePools::connect(&config.databases[0], &config.pool)
        .await
        .unwrap();
    let pool = pools.primary.pool();
    sqlx::query("CREATE TABLE tissue.tdp_tissue (tissuename TEXT PRIMARY KEY, gender TEXT, age INTEGER)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO tissue.tdp_tissue VALUES
            ('T01', 'female', 30), ('T02', 'male', 41), ('T03', 'female', 52),
            ('T04', 'male', NULL), ('T05', NULL, 64)",
    )
    .execute(pool)
    .await
    .unwrap();
    pools.close().await;

    (build_router(AppState::new(service)), dir)
}

/// Test helper: GET request
fn test_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app.clone().oneshot(test_request(uri)).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

const CREATE_ROOT: &str =
    "/api/cohorts/create?name=All&isInitial=1&previous=-1&database=publicdb&schema=tissue&table=tdp_tissue";

// =============================================================================
// Health and build information
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = setup_app().await;
    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "coral-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_endpoint() {
    let (app, _dir) = setup_app().await;
    let (status, body) = get(&app, "/api/buildinfo").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
}

// =============================================================================
// Cohort lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_derive_and_read() {
    let (app, _dir) = setup_app().await;

    let (status, root) = get(&app, CREATE_ROOT).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["name"], "All");
    assert_eq!(root["previous_cohort"], -1);
    let root_id = root["id"].as_i64().unwrap();

    let (status, created) = get(
        &app,
        &format!(
            "/api/cohorts/derive/equals?cohortId={}&name=Women&attribute=gender&numeric=false&values=female",
            root_id
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let women = created["id"].as_i64().unwrap();

    let (_, size) = get(&app, &format!("/api/cohorts/size?cohortId={}", women)).await;
    assert_eq!(size["size"], 2);

    let (_, rows) = get(&app, &format!("/api/cohorts/data?cohortId={}&attribute=age", women)).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.as_object().unwrap().len() == 2));

    let (_, listed) = get(&app, &format!("/api/cohorts/by-ids?cohortIds={}", women)).await;
    assert_eq!(listed[0]["name"], "Women");
    assert_eq!(listed[0]["previous_cohort"], root_id);

    let (status, renamed) = get(&app, &format!("/api/cohorts/rename?cohortId={}&name=F", women)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "F");
}

#[tokio::test]
async fn test_preview_range() {
    let (app, _dir) = setup_app().await;
    let (_, root) = get(&app, CREATE_ROOT).await;

    let (status, body) = get(
        &app,
        &format!(
            "/api/cohorts/preview/num/size?cohortId={}&attribute=age&ranges=gte_40%25lt_60",
            root["id"]
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], 2);
}

#[tokio::test]
async fn test_histogram_endpoint() {
    let (app, _dir) = setup_app().await;
    let (_, root) = get(&app, CREATE_ROOT).await;

    let (status, body) = get(
        &app,
        &format!("/api/cohorts/hist?cohortId={}&type=dataCat&attribute=gender", root["id"]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let bins = body.as_array().unwrap();
    assert_eq!(bins.len(), 3);
    assert_eq!(bins[0]["bin"], "female");
    assert_eq!(bins[0]["count"], 2);
}

#[tokio::test]
async fn test_recommend_split_endpoint() {
    let (app, _dir) = setup_app().await;
    let (_, root) = get(&app, CREATE_ROOT).await;

    let (status, body) = get(
        &app,
        &format!(
            "/api/cohorts/recommend-split?cohortId={}&attribute0=age&numberOfClusters=2",
            root["id"]
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["age"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Error responses
// =============================================================================

#[tokio::test]
async fn test_missing_parameter_is_bad_request() {
    let (app, _dir) = setup_app().await;
    let (status, body) = get(&app, "/api/cohorts/derive/equals?cohortId=1&name=x&attribute=gender").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_PARAMETER");
}

#[tokio::test]
async fn test_unknown_filter_kind_is_bad_request() {
    let (app, _dir) = setup_app().await;
    let (status, body) = get(&app, "/api/cohorts/derive/fuzzy?cohortId=1&name=x").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FILTER_VALUE");
}

#[tokio::test]
async fn test_unknown_cohort_is_not_found() {
    let (app, _dir) = setup_app().await;
    let (status, body) = get(&app, "/api/cohorts/size?cohortId=404").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_identifier_is_rejected() {
    let (app, _dir) = setup_app().await;
    let (_, root) = get(&app, CREATE_ROOT).await;

    let (status, body) = get(
        &app,
        &format!(
            "/api/cohorts/data?cohortId={}&attribute=age%3B%20DROP%20TABLE%20cohort",
            root["id"]
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_IDENTIFIER");
}
