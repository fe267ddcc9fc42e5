use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, to_bytes};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::metrics::{REQUEST_TOTAL, UPSTREAM_FAILURES, UPSTREAM_LATENCY};
use crate::rate_limit::EndpointClass;
use crate::state::AppState;

// Connection-scoped headers, never forwarded in either direction
const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

// Forwards an admitted request to the next healthy upstream.
// Rate limiting already happened in the middleware.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    Path((class, path)): Path<(String, String)>,
    req: Request,
) -> Result<Response, GatewayError> {
    let class = class
        .parse::<EndpointClass>()
        .map_err(|e| GatewayError::NotFound(e.to_string()))?;
    REQUEST_TOTAL.inc();

    let upstream = state
        .load_balancer
        .next_upstream()
        .ok_or(GatewayError::NoHealthyUpstream)?;

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| GatewayError::BodyTooLarge)?;

    let mut url = format!("{}/{}", upstream.url, path);
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    debug!(%class, url = %url, "forwarding request");
    let start_time = Instant::now();

    let result = state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream_res = match result {
        Ok(res) => res,
        // Marking upstream as unhealthy on transport error
        Err(e) => {
            upstream.set_healthy(false);
            UPSTREAM_FAILURES.inc();
            warn!(url = %upstream.url, error = %e, "upstream failed, marked unhealthy");
            return Err(e.into());
        }
    };

    let status = upstream_res.status();
    let mut response_headers = upstream_res.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    let bytes = upstream_res.bytes().await?;

    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}
