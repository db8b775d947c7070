//! Round-robin HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ dispatch::Dispatcher ──▶ RoundRobin selector
//!                                            │                        │
//!                                            │                  registry snapshot
//!                                            ▼                        │
//!     Client Response                 Backend::forward ◀──────────────┘
//!     ◀────────────── response ◀─────────────┘             ──────▶ Backend Server
//!
//!     Cross-cutting: config (+ hot reload), health (passive + active),
//!     resilience (retries, timeouts), observability, lifecycle, admin API
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use http_balancer::admin::{self, AdminState};
use http_balancer::config::watcher::ConfigWatcher;
use http_balancer::config::{parse_config, validate_config, BackendConfig, BalancerConfig};
use http_balancer::lifecycle::signals::wait_for_signal;
use http_balancer::observability::{logging, metrics};
use http_balancer::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "http-balancer", version, about = "Round-robin HTTP load balancer")]
struct Args {
    /// Path to a TOML config file. Changes to its backend list are applied live.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port; overrides the port of `listener.bind_address`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend address, repeatable. Appended to the configured backends.
    #[arg(short, long = "backend")]
    backends: Vec<String>,

    /// Log level when RUST_LOG is unset.
    #[arg(long)]
    log_level: Option<String>,
}

/// Effective startup configuration plus what hot reload needs to rebuild it.
struct Startup {
    config: BalancerConfig,
    config_path: Option<PathBuf>,
    extra_backends: Vec<String>,
}

impl Args {
    fn into_startup(self) -> Result<Startup, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => parse_config(path)?,
            None => BalancerConfig::default(),
        };

        if let Some(port) = self.port {
            let host = config
                .listener
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            config.listener.bind_address = format!("{host}:{port}");
        }
        config.backends.extend(self.backends.iter().map(BackendConfig::new));
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        Ok(Startup {
            config,
            config_path: self.config,
            extra_backends: self.backends,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Startup {
        config,
        config_path,
        extra_backends,
    } = Args::parse().into_startup()?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-balancer starting");

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        unhealthy_threshold = config.health_check.unhealthy_threshold,
        active_health_checks = config.health_check.active,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config.clone())?;
    let registry = server.registry();

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(registry.clone(), &config.admin.api_key);
        let token = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, state, token).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    // Held for the lifetime of the process; dropping it stops the watch.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let watcher = watcher.run()?;
            let registry = registry.clone();
            let running = config.clone();
            tokio::spawn(async move {
                while let Some(next) = updates.recv().await {
                    let mut desired = next.backend_addresses();
                    desired.extend(extra_backends.iter().cloned());
                    let report = registry.reconcile(&desired);
                    tracing::info!(
                        added = report.added.len(),
                        removed = report.removed.len(),
                        backends = registry.len(),
                        "Backends reconciled"
                    );
                    if next.health_check != running.health_check
                        || next.dispatch != running.dispatch
                        || next.listener != running.listener
                    {
                        tracing::warn!("Only backend changes apply live; restart to apply the rest");
                    }
                }
            });
            Some(watcher)
        }
        None => None,
    };

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
