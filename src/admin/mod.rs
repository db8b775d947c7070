//! Admin API.
//!
//! Dynamic registration and liveness push, behind a Bearer API key.
//!
//! ```text
//! GET    /admin/status
//! GET    /admin/backends
//! POST   /admin/backends               {"address": "127.0.0.1:3001"}
//! DELETE /admin/backends/{id}
//! POST   /admin/backends/{id}/health   {"healthy": true}
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::load_balancer::pool::BalancerRegistry;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<BalancerRegistry>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(registry: Arc<BalancerRegistry>, api_key: &str) -> Self {
        Self {
            registry,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(list_backends).post(add_backend))
        .route("/admin/backends/{id}", delete(remove_backend))
        .route("/admin/backends/{id}/health", post(report_health))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API starting");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
