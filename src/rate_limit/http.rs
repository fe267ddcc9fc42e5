//! Bridges limiter decisions to HTTP: bucket keys, headers, 429s.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, warn};

use super::limiter::RateLimitResult;
use super::policy::EndpointClass;
use crate::metrics::{RATE_LIMITED_TOTAL, TRACKED_IDENTIFIERS};
use crate::state::AppState;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Authenticated user id. Must be set by the trusted auth proxy in front
/// of the gateway, which strips any client-supplied value.
pub const X_USER_ID: &str = "x-user-id";
/// Subscription tier of the authenticated user. Trusted as-is, so the auth
/// proxy must overwrite it; otherwise any caller can claim `enterprise`.
pub const X_USER_TIER: &str = "x-user-tier";

const UNKNOWN_IP: &str = "unknown";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Client IP from proxy headers: `x-real-ip`, then the first hop of
/// `x-forwarded-for`, then `cf-connecting-ip`. Falls back to `"unknown"`,
/// which is one shared bucket.
pub fn client_ip(headers: &HeaderMap) -> String {
    header_str(headers, "x-real-ip")
        .or_else(|| {
            header_str(headers, "x-forwarded-for")
                .and_then(|xff| xff.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| header_str(headers, "cf-connecting-ip"))
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

/// Who a request is counted against, and at which tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub key: String,
    pub tier: Option<String>,
}

impl Caller {
    /// Buckets are namespaced per class so classes never share a window.
    pub fn from_headers(class: EndpointClass, headers: &HeaderMap) -> Self {
        let user = class
            .keys_by_user()
            .then(|| header_str(headers, X_USER_ID))
            .flatten();

        match user {
            Some(user) => Caller {
                key: format!("{class}:user:{user}"),
                tier: class
                    .uses_tiers()
                    .then(|| header_str(headers, X_USER_TIER))
                    .flatten()
                    .map(str::to_ascii_lowercase),
            },
            None => Caller {
                key: format!("{class}:ip:{}", client_ip(headers)),
                tier: None,
            },
        }
    }
}

/// Writes the `X-RateLimit-*` headers.
pub fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_at_secs()));
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedBody {
    pub error: &'static str,
    pub message: String,
    pub retry_after: u64,
}

/// 429 with `Retry-After`, the rate-limit headers and a JSON body.
pub fn rejection(result: &RateLimitResult) -> Response {
    let body = RateLimitedBody {
        error: "Rate limit exceeded",
        message: format!(
            "Too many requests. Please try again in {} seconds.",
            result.retry_after
        ),
        retry_after: result.retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(result.retry_after));
    apply_headers(headers, result);
    response
}

/// Endpoint class from the first path segment, e.g. `/ai/clara-chat`.
pub fn classify(path: &str) -> Option<EndpointClass> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

/// Admission middleware. A rejected request never reaches the inner handler.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(class) = classify(req.uri().path()) else {
        return next.run(req).await;
    };

    let caller = Caller::from_headers(class, req.headers());
    let result = state
        .rate_limiter
        .check(&caller.key, class.config(), caller.tier.as_deref());
    TRACKED_IDENTIFIERS.set(state.rate_limiter.store().len() as f64);

    if !result.allowed {
        RATE_LIMITED_TOTAL.with_label_values(&[class.as_str()]).inc();
        warn!(
            %class,
            key = %caller.key,
            retry_after = result.retry_after,
            "rate limit exceeded"
        );
        return rejection(&result);
    }

    debug!(
        %class,
        key = %caller.key,
        remaining = result.remaining,
        "request admitted"
    );
    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &result);
    response
}
