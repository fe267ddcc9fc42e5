use std::time::Duration;

use clap::Parser;

// CLI argument structure, every flag has a GATEWAY_* env fallback
#[derive(Parser, Debug, Clone)]
#[command(name = "tributalks-gateway", version)]
#[command(about = "Rate-limiting gateway in front of the TribuTalks edge functions")]
pub struct Args {
    // Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "GATEWAY_HOST")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, default_value_t = 8080, env = "GATEWAY_PORT")]
    pub port: u16,

    // Upstream edge function hosts (comma-separated)
    // Example: "localhost:54321,localhost:54322"
    #[arg(short, long, default_value = "localhost:54321", env = "GATEWAY_UPSTREAMS")]
    pub upstreams: String,

    // Upstream health check interval in seconds
    #[arg(long, default_value_t = 30, env = "GATEWAY_HEALTH_INTERVAL")]
    pub health_interval: u64,

    // Path probed on each upstream by the health checker
    #[arg(long, default_value = "/health", env = "GATEWAY_HEALTH_PATH")]
    pub health_path: String,

    // Rate limiter sweep interval in seconds
    #[arg(long, default_value_t = 300, env = "GATEWAY_SWEEP_INTERVAL")]
    pub sweep_interval: u64,

    // Largest request body forwarded upstream
    #[arg(long, default_value_t = 2 * 1024 * 1024, env = "GATEWAY_MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // CORS allowed origins (comma-separated, "*" for any). Empty disables CORS.
    #[arg(long, env = "GATEWAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    // Log level, RUST_LOG takes precedence
    #[arg(long, default_value = "info", env = "GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    // "text" or "json"
    #[arg(long, default_value = "text", env = "GATEWAY_LOG_FORMAT")]
    pub log_format: String,
}

impl Args {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }
}
