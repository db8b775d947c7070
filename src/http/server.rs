//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router that accepts every method and path
//! - Wire up middleware (tracing, request ID)
//! - Buffer the request body so attempts can be replayed
//! - Hand each request to the dispatcher with a cancellation token
//! - Start the active health monitor when enabled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::BalancerConfig;
use crate::dispatch::Dispatcher;
use crate::error::BalancerError;
use crate::health::active::HealthMonitor;
use crate::health::state::HealthState;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::load_balancer::backend::{build_client, ForwardRequest};
use crate::load_balancer::pool::BalancerRegistry;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: CancellationToken,
    pub max_body_bytes: usize,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    config: BalancerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Build the registry from the configured backends.
    pub fn new(config: BalancerConfig) -> Result<Self, BalancerError> {
        let health = Arc::new(
            HealthState::new(config.health_check.unhealthy_threshold)
                .with_recovery_window(config.health_check.recovery_window()),
        );
        let client = build_client(config.dispatch.connect_timeout());
        let registry = Arc::new(BalancerRegistry::new(health, client));

        for backend in &config.backends {
            registry.add_backend(&backend.address)?;
        }

        Ok(Self::with_registry(config, registry))
    }

    /// Serve an already populated registry.
    pub fn with_registry(config: BalancerConfig, registry: Arc<BalancerRegistry>) -> Self {
        let dispatcher = Arc::new(Dispatcher::from_config(registry, &config.dispatch));
        Self { config, dispatcher }
    }

    pub fn registry(&self) -> Arc<BalancerRegistry> {
        self.dispatcher.registry().clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self, shutdown: CancellationToken) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            shutdown,
            max_body_bytes: self.config.listener.max_body_bytes,
        };

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` is cancelled.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.dispatcher.registry().len(),
            "HTTP server starting"
        );

        if self.config.health_check.active {
            let monitor = HealthMonitor::new(
                self.registry(),
                self.config.health_check.clone(),
                build_client(self.config.dispatch.connect_timeout()),
            );
            let token = shutdown.clone();
            tokio::spawn(async move {
                monitor.run(token).await;
            });
        }

        let app = self
            .router(shutdown.clone())
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Buffer the request body so attempts can be replayed. Exceeding the limit
/// is 413; any other read failure is the client's and maps to 400.
async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, StatusCode> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!(error = %e, "Request body read failed");
        if exceeds_limit(&e) {
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            StatusCode::BAD_REQUEST
        }
    })
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Forward any request to the next alive backend.
///
/// A client disconnect drops this future, and with it the in-flight
/// forward. Shutdown cancels through the token instead.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let body = match buffer_body(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(status) => {
            metrics::record_request(status.as_u16(), start_time);
            let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "Request body too large"
            } else {
                "Failed to read request body"
            };
            tracing::warn!(request_id = %request_id, status = %status, "{}", message);
            return (status, message).into_response();
        }
    };

    let forward = ForwardRequest::from_parts(&parts, body, Some(client_addr));
    let cancel = state.shutdown.child_token();
    let span = tracing::info_span!("dispatch", request_id = %request_id, method = %method, path = %path);

    let response = match state.dispatcher.handle(&forward, &cancel).instrument(span).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request failed");
            e.into_response()
        }
    };

    metrics::record_request(response.status().as_u16(), start_time);
    response
}
