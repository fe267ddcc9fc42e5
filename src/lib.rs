//! Rate-limiting gateway for the TribuTalks edge functions.
//!
//! Requests arrive as `/{class}/{*path}`. The first segment names an
//! endpoint class (`ai`, `standard`, `batch`, `public`, `webhook`), which
//! selects a sliding-window quota. Admitted requests are forwarded to a
//! healthy upstream; rejected ones get a 429 and never reach it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod load_balancer;
pub mod metrics;
pub mod rate_limit;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{any, get};
use tower_http::cors::{Any, CorsLayer};

pub use error::GatewayError;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/{class}/{*path}", any(handlers::proxy_handler))
        // matched routes only, unroutable paths must not spend quota
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        // outermost, so 429s carry CORS headers too
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }

    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
        .expose_headers([
            header::RETRY_AFTER,
            rate_limit::http::X_RATELIMIT_LIMIT,
            rate_limit::http::X_RATELIMIT_REMAINING,
            rate_limit::http::X_RATELIMIT_RESET,
        ]);

    if origins.len() == 1 && origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard origin");
        base.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        base.allow_origin(parsed)
    }
}
