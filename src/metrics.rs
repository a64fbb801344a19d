use crate::constants::METRICS_PORT_ENV;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Installs the Prometheus exporter when `LEADS_METRICS_PORT` is set.
/// Without it the `metrics` macros in the pipeline no-op, so scrape runs
/// on machines with no scrape target pay nothing.
pub fn init_metrics() {
    let port: u16 = match std::env::var(METRICS_PORT_ENV).ok().and_then(|s| s.parse().ok()) {
        Some(port) => port,
        None => {
            info!("Metrics exporter disabled ({} not set)", METRICS_PORT_ENV);
            return;
        }
    };

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            info!("Metrics exporter listening on http://{}/metrics", addr);
            println!("📈 Metrics exporter listening on http://{addr}/metrics");
        }
        Err(e) => warn!("Metrics exporter install failed: {}", e),
    }
}
