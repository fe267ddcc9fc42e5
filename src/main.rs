use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tributalks_gateway::config::Args;
use tributalks_gateway::load_balancer::health_checker;
use tributalks_gateway::{AppState, router};

#[tokio::main]
async fn main() {
    // parse cli arguments
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = match AppState::from_args(&args) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to start gateway");
            std::process::exit(2);
        }
    };

    // spawn the upstream health checker
    tokio::spawn(health_checker(
        state.load_balancer.clone(),
        state.client.clone(),
        args.health_interval(),
        args.health_path.clone(),
    ));

    // periodic sweep on top of the opportunistic one on the request path
    let limiter = state.rate_limiter.clone();
    let sweep_interval = args.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep_now();
        }
    });

    let app = router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        upstreams = %args.upstreams,
        sweep_interval_secs = args.sweep_interval,
        "gateway listening"
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
    }
}
