//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered backend
//! - Feed results into `HealthState` through the same API as live traffic

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::HealthCheckConfig;
use crate::load_balancer::backend::HttpClient;
use crate::load_balancer::pool::BalancerRegistry;

pub struct HealthMonitor {
    registry: Arc<BalancerRegistry>,
    config: HealthCheckConfig,
    client: HttpClient,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BalancerRegistry>, config: HealthCheckConfig, client: HttpClient) -> Self {
        Self {
            registry,
            config,
            client,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.active {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend in the current snapshot once.
    pub async fn check_all(&self) {
        let health = self.registry.health();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        for backend in self.registry.snapshot().iter() {
            let id = backend.id();
            let uri = match backend.address().join(&self.config.path) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    tracing::error!(backend = %id, error = %e, "Invalid health check path");
                    continue;
                }
            };

            let request = match Request::builder()
                .method("GET")
                .uri(uri)
                .header("user-agent", "http-balancer-health-check")
                .body(Body::empty())
            {
                Ok(req) => req,
                Err(e) => {
                    tracing::error!(backend = %id, error = %e, "Failed to build health check request");
                    continue;
                }
            };

            let healthy = match time::timeout(timeout, self.client.request(request)).await {
                Ok(Ok(response)) => {
                    let success = response.status().is_success();
                    if !success {
                        tracing::warn!(backend = %id, status = %response.status(), "Health check failed: non-success status");
                    }
                    success
                }
                Ok(Err(e)) => {
                    tracing::warn!(backend = %id, error = %e, "Health check failed: connection error");
                    false
                }
                Err(_) => {
                    tracing::warn!(backend = %id, "Health check failed: timeout");
                    false
                }
            };

            // The backend may have been deregistered while we probed it.
            let recorded = if healthy {
                health.record_success(id)
            } else {
                health.record_failure(id)
            };
            if let Err(e) = recorded {
                tracing::debug!(backend = %id, error = %e, "Dropping probe result");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::HealthState;
    use crate::load_balancer::backend::build_client;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn start_status_server(status_line: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!("HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_probe_results_update_health() {
        let ok = start_status_server("200 OK").await;
        let failing = start_status_server("500 Internal Server Error").await;

        let client = build_client(Duration::from_millis(500));
        let registry = Arc::new(BalancerRegistry::new(Arc::new(HealthState::new(2)), client.clone()));
        let ok_id = registry.add_backend(&ok.to_string()).unwrap();
        let failing_id = registry.add_backend(&failing.to_string()).unwrap();

        let config = HealthCheckConfig {
            active: true,
            timeout_secs: 1,
            ..HealthCheckConfig::default()
        };
        let monitor = HealthMonitor::new(registry.clone(), config, client);

        monitor.check_all().await;
        assert!(registry.health().is_alive(failing_id));
        monitor.check_all().await;
        assert!(!registry.health().is_alive(failing_id));
        assert!(registry.health().is_alive(ok_id));
        assert_eq!(registry.health().record(ok_id).unwrap().total_successes(), 2);
    }
}
