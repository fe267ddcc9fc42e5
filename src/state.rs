use std::sync::Arc;

use crate::config::Args;
use crate::error::GatewayError;
use crate::load_balancer::LoadBalancer;
use crate::rate_limit::{EndpointClass, InMemoryWindowStore, RateLimiter};

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub load_balancer: Arc<LoadBalancer>,
    pub rate_limiter: RateLimiter,
    pub max_body_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        load_balancer: LoadBalancer,
        rate_limiter: RateLimiter,
        max_body_bytes: usize,
        cors_origins: Vec<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            load_balancer: Arc::new(load_balancer),
            rate_limiter,
            max_body_bytes,
            cors_origins,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, GatewayError> {
        let load_balancer = LoadBalancer::new(&args.upstreams)?;
        let rate_limiter = RateLimiter::new(
            Arc::new(InMemoryWindowStore::new()),
            args.sweep_interval(),
        )
        .with_longest_window(EndpointClass::longest_window());

        Ok(Self::new(
            load_balancer,
            rate_limiter,
            args.max_body_bytes,
            args.cors_origins.clone(),
        ))
    }
}
