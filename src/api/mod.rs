//! API Module
//!
//! Router construction and the middleware chain. Routes are mounted under
//! both /qcache and /qocache for compatibility with existing qcache clients.
//! The chain runs recover, then statistics, then the optional request log
//! and basic auth, then the LZ4 codec, then the handler.

pub mod compression;
pub mod handlers;
pub mod headers;
pub mod middleware;
pub mod recover;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;

use crate::cache::LruCache;
use crate::config::Config;
use crate::error::Result;
use self::middleware::BasicAuth;
use crate::stats::Statistics;

// == Application State ==
/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Mutex<LruCache>>,
    pub stats: Arc<Statistics>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(Mutex::new(LruCache::new(
            config.size,
            Duration::from_secs(config.age),
            config.statistics_buffer_size,
        )));
        let stats = Arc::new(Statistics::new(
            Arc::clone(&cache),
            config.statistics_buffer_size,
        ));
        Self { cache, stats }
    }
}

// == Router ==
/// Builds the application router with the full middleware chain.
pub fn application(config: &Config) -> Result<Router> {
    let state = AppState::from_config(config);
    application_with_state(config, state)
}

pub fn application_with_state(config: &Config, state: AppState) -> Result<Router> {
    let routes = Router::new()
        .route(
            "/dataset/:key",
            post(handlers::store_dataset).get(handlers::query_dataset_get),
        )
        .route("/dataset/:key/q", post(handlers::query_dataset_post))
        .route("/statistics", get(handlers::statistics))
        .route("/status", get(handlers::status));

    let mut router = Router::new()
        .nest("/qcache", routes.clone())
        .nest("/qocache", routes)
        .with_state(state.clone());

    // Layers added later wrap the ones added earlier, so this reads from the
    // innermost middleware outwards.
    router = router.layer(from_fn(compression::lz4));

    if let Some(auth) = &config.basic_auth {
        let creds = Arc::new(BasicAuth::parse(auth)?);
        router = router.layer(from_fn_with_state(creds, middleware::basic_auth));
    }

    if config.request_log {
        router = router.layer(from_fn(middleware::request_log));
    }

    router = router
        .layer(from_fn_with_state(
            Arc::clone(&state.stats),
            middleware::statistics,
        ))
        .layer(CatchPanicLayer::custom(recover::panic_response))
        .layer(TimeoutLayer::new(Duration::from_secs(config.write_timeout)));

    Ok(router)
}

/// The bare router for the secondary health listener: only /status, no
/// middleware, no TLS.
pub fn status_router() -> Router {
    async fn plain_status() -> &'static str {
        "OK"
    }

    Router::new()
        .route("/qcache/status", get(plain_status))
        .route("/qocache/status", get(plain_status))
        .route("/status", get(plain_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        application(&Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        for root in ["/qcache", "/qocache"] {
            let response = test_app()
                .oneshot(
                    Request::builder()
                        .uri(format!("{root}/status"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&body[..], b"OK");
        }
    }

    #[tokio::test]
    async fn test_statistics_endpoint() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/qocache/statistics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_statistics_rejects_non_json_accept() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/qocache/statistics")
                    .header("Accept", "text/csv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_404() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/qocache/dataset/nope")
                    .header("Accept", "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Dataset 'nope' not found");
    }

    #[tokio::test]
    async fn test_basic_auth_challenge() {
        let config = Config {
            basic_auth: Some("user:secret".to_string()),
            ..Config::default()
        };
        let app = application(&config).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/qocache/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));

        // "user:secret" base64
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/qocache/status")
                    .header("Authorization", "Basic dXNlcjpzZWNyZXQ=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_basic_auth_config_fails() {
        let config = Config {
            basic_auth: Some("nocolon".to_string()),
            ..Config::default()
        };
        assert!(application(&config).is_err());
    }

    #[tokio::test]
    async fn test_status_router() {
        let response = status_router()
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
