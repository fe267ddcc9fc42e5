//! Sliding-window rate limiting for the gateway's endpoint classes.

pub mod http;
pub mod limiter;
pub mod policy;
pub mod store;

pub use http::{Caller, apply_headers, client_ip, rate_limit_middleware, rejection};
pub use limiter::{DEFAULT_SWEEP_INTERVAL, RateLimitResult, RateLimiter};
pub use policy::{EndpointClass, RateLimitConfig};
pub use store::{InMemoryWindowStore, RateLimitEntry, WindowStore, WindowView};
