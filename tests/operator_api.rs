mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use common::*;
use pitchpool::api::auth::ADMIN_TOKEN_HEADER;
use pitchpool::api::{create_router, AppState};
use pitchpool::domain::{FixtureKey, Prediction};
use pitchpool::settlement::{Schedule, Scheduler};

const KEY: FixtureKey = FixtureKey { gameweek: 4, match_id: 40 };

fn app(authority: bool, admin_token: Option<&str>) -> Router {
    let oracle = Arc::new(FakeOracle::with_authority(authority));
    let ledger = Arc::new(FakePayoutLedger::new(
        oracle.clone(),
        vec![wager(0, KEY, Prediction::Draw, dec!(2))],
    ));
    let feed = Arc::new(FakeFeed::with(vec![finished_record(KEY, 1, 1)]));
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(orchestrator(feed, oracle, ledger)),
        Schedule::parse("*/5 * * * *").unwrap(),
        false,
    ));

    let address = authority.then(|| "0x00000000000000000000000000000000000000aa".to_string());
    let state = AppState::new(scheduler, address).with_admin_token(admin_token.map(String::from));
    create_router(state)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_run() -> axum::http::request::Builder {
    Request::builder().method("POST").uri("/settlement/run")
}

#[tokio::test]
async fn test_health_without_database() {
    let response = app(true, None)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "disabled");
}

#[tokio::test]
async fn test_status_before_any_run() {
    let response = app(true, None)
        .oneshot(Request::get("/settlement/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["authority_configured"], true);
    assert_eq!(body["schedule"], "*/5 * * * *");
    assert_eq!(body["running"], false);
    assert!(body["last_run"].is_null());
}

#[tokio::test]
async fn test_manual_run_returns_summary_and_updates_status() {
    let app = app(true, None);

    let response = app
        .clone()
        .oneshot(post_run().body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["settled"], 1);
    assert_eq!(summary["details"][0]["state"], "SETTLED");

    let response = app
        .oneshot(Request::get("/settlement/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = json_body(response).await;
    assert_eq!(status["last_run"]["settled"], 1);
}

#[tokio::test]
async fn test_manual_run_without_authority_is_unavailable() {
    let response = app(false, None)
        .oneshot(post_run().body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let summary = json_body(response).await;
    assert_eq!(summary["processed"], 0);
    assert!(summary["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_manual_run_requires_admin_token_when_configured() {
    let app = app(true, Some("s3cret"));

    let response = app
        .clone()
        .oneshot(post_run().body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            post_run()
                .header(ADMIN_TOKEN_HEADER, "s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
