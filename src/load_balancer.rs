use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::time::{Duration, interval};
use tracing::{info, warn};

use crate::error::GatewayError;

// Single upstream edge function host
pub struct Upstream {
    pub url: String,
    healthy: AtomicBool,
}

impl Upstream {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Round-robin pool over the upstreams
pub struct LoadBalancer {
    upstreams: Vec<Arc<Upstream>>,
    current: AtomicUsize,
}

impl LoadBalancer {
    // Parse comma-separated hosts "localhost:54321, localhost:54322"
    pub fn new(upstreams_str: &str) -> Result<Self, GatewayError> {
        let upstreams: Vec<Arc<Upstream>> = upstreams_str
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|url| {
                // add http:// if not present
                let full_url = if url.starts_with("http://") || url.starts_with("https://") {
                    url.trim_end_matches('/').to_string()
                } else {
                    format!("http://{}", url.trim_end_matches('/'))
                };
                Arc::new(Upstream::new(full_url))
            })
            .collect();

        if upstreams.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "at least one upstream required".into(),
            ));
        }

        for (i, u) in upstreams.iter().enumerate() {
            info!(index = i + 1, url = %u.url, "upstream registered");
        }

        Ok(Self {
            upstreams,
            current: AtomicUsize::new(0),
        })
    }

    // Next healthy upstream (round-robin)
    pub fn next_upstream(&self) -> Option<Arc<Upstream>> {
        let len = self.upstreams.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        (0..len)
            .map(|i| &self.upstreams[(start + i) % len])
            .find(|u| u.is_healthy())
            .map(Arc::clone)
    }

    pub fn upstreams(&self) -> &[Arc<Upstream>] {
        &self.upstreams
    }

    pub fn healthy_count(&self) -> usize {
        self.upstreams.iter().filter(|u| u.is_healthy()).count()
    }
}

// Periodic health probe, logs transitions only
pub async fn health_checker(
    load_balancer: Arc<LoadBalancer>,
    client: reqwest::Client,
    check_interval: Duration,
    health_path: String,
) {
    let mut interval = interval(check_interval);

    info!(interval = ?check_interval, "health checker started");

    loop {
        interval.tick().await;

        for upstream in load_balancer.upstreams() {
            let url = format!("{}{}", upstream.url, health_path);

            let was_healthy = upstream.is_healthy();

            let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            upstream.set_healthy(is_healthy);

            if was_healthy != is_healthy {
                if is_healthy {
                    info!(url = %upstream.url, "upstream is now healthy");
                } else {
                    warn!(url = %upstream.url, "upstream is now unhealthy");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_urls() {
        let lb = LoadBalancer::new(" localhost:54321 , https://fn.example.com/ ,").unwrap();
        let urls: Vec<&str> = lb.upstreams().iter().map(|u| u.url.as_str()).collect();
        assert_eq!(urls, vec!["http://localhost:54321", "https://fn.example.com"]);
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            LoadBalancer::new(" , "),
            Err(GatewayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn round_robin_skips_unhealthy() {
        let lb = LoadBalancer::new("a:1,b:2,c:3").unwrap();
        lb.upstreams()[1].set_healthy(false);

        let picked: Vec<String> = (0..4).map(|_| lb.next_upstream().unwrap().url.clone()).collect();
        assert_eq!(picked, vec!["http://a:1", "http://c:3", "http://c:3", "http://a:1"]);
        assert_eq!(lb.healthy_count(), 2);
    }

    #[test]
    fn none_when_all_unhealthy() {
        let lb = LoadBalancer::new("a:1").unwrap();
        lb.upstreams()[0].set_healthy(false);
        assert!(lb.next_upstream().is_none());
    }
}
