//! Integration tests for the HTTP surface, driving the router directly
//! with `tower::Service`'s `oneshot` instead of binding a real socket.
//!
//! These only exercise request paths that never touch the database pool or
//! the Lightning client, so the pool is built with `build_unchecked` (no
//! connection attempt at startup) and the Phoenix client points at an
//! address nothing is listening on.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use diesel::r2d2;
use diesel::r2d2::ConnectionManager;
use diesel::PgConnection;
use gateway::price_cache::BtcPriceCache;
use gateway::routes::router;
use gateway::settings::ApiConfig;
use gateway::settings::BtcPriceConfig;
use gateway::settings::EndpointConfig;
use gateway::settings::PriceType;
use gateway::settings::Settings;
use gateway::state::Core;
use gateway::state::DailyCounters;
use gateway::used_hash::UsedHashSet;
use lightning_client::PhoenixClient;
use tower::ServiceExt;

fn test_core() -> Core {
    let mut apis = HashMap::new();
    apis.insert(
        "openai".to_string(),
        ApiConfig {
            upstream_base: "http://localhost:0".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            auth_header: None,
            auth_prefix: Some("Bearer ".to_string()),
            extra_headers: HashMap::new(),
            endpoints: vec![EndpointConfig {
                path: "/v1/chat/completions".to_string(),
                method: "POST".to_string(),
                price_type: PriceType::Flat,
                price_sats: Some(10),
                models: HashMap::new(),
                max_request_bytes: Some(16),
                description: Some("chat completion".to_string()),
                daily_call_cap: None,
            }],
        },
    );

    let settings = Arc::new(Settings {
        max_request_bytes: 32_768,
        invoice_expiry_seconds: 900,
        used_hash_ttl_seconds: 3600,
        used_hash_cleanup_interval_seconds: 300,
        btc_price: BtcPriceConfig::default(),
        hire_task_fee_sats: 50,
        hire_quote_fee_sats: 10,
        apis,
        path: None,
    });

    // `build_unchecked` skips the initial connection test r2d2 otherwise
    // performs on `build()`, so this pool never actually dials Postgres —
    // fine as long as a test never calls `core.pool.get()`.
    let manager = ConnectionManager::<PgConnection>::new("postgres://unused/unused");
    let pool = r2d2::Pool::builder().max_size(1).build_unchecked(manager);

    Core {
        pool,
        phoenix: PhoenixClient::new("http://127.0.0.1:1", ""),
        used_hashes: Arc::new(UsedHashSet::default()),
        price_cache: Arc::new(BtcPriceCache::new(None, 60)),
        settings,
        root_key: Arc::new([7u8; 32]),
        daily_counters: Arc::new(Mutex::new(DailyCounters::default())),
    }
}

#[tokio::test]
async fn unconfigured_endpoint_returns_404() {
    let app = router(test_core());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/openai/v1/embeddings")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_request_body_returns_413() {
    let app = router(test_core());

    let oversized_body = serde_json::json!({"model": "gpt-4o-mini", "messages": "way more than sixteen bytes"});
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/openai/v1/chat/completions")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(oversized_body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);

    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["error"]["code"], "request_too_large");
}

#[tokio::test]
async fn catalog_lists_configured_endpoints_without_touching_the_database() {
    let app = router(test_core());

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/catalog")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let catalog: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(catalog["apis"]["openai"]["endpoints"][0]["path"], "/v1/chat/completions");
    assert_eq!(catalog["apis"]["openai"]["endpoints"][0]["price_sats"], 10);
    assert!(catalog["btc_usd"].is_null());
}

#[tokio::test]
async fn missing_token_on_a_gated_hire_route_returns_401() {
    let app = router(test_core());

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/v1/ai-for-hire/me")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}
