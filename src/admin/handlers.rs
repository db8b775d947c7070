use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::error::BalancerError;
use crate::load_balancer::backend::BackendId;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub backends: usize,
    pub alive: usize,
    pub unhealthy_threshold: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendStatus {
    pub id: BackendId,
    pub address: String,
    pub alive: bool,
    pub consecutive_failures: u64,
    pub total_successes: u64,
    pub total_failures: u64,
}

#[derive(Debug, Deserialize)]
pub struct AddBackend {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Registered {
    pub id: BackendId,
    pub address: String,
}

/// Liveness pushed by an external health checker.
#[derive(Debug, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.registry.snapshot();
    let alive = snapshot.iter().filter(|b| b.is_alive()).count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if alive > 0 { "operational" } else { "degraded" }.to_string(),
        backends: snapshot.len(),
        alive,
        unhealthy_threshold: state.registry.health().unhealthy_threshold(),
    })
}

pub async fn list_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let health = state.registry.health();

    let statuses = state
        .registry
        .snapshot()
        .iter()
        .map(|b| {
            let record = health.record(b.id());
            BackendStatus {
                id: b.id(),
                address: b.address().to_string(),
                alive: b.is_alive(),
                consecutive_failures: record.as_ref().map_or(0, |r| r.consecutive_failures()),
                total_successes: record.as_ref().map_or(0, |r| r.total_successes()),
                total_failures: record.as_ref().map_or(0, |r| r.total_failures()),
            }
        })
        .collect();

    Json(statuses)
}

pub async fn add_backend(
    State(state): State<AdminState>,
    Json(body): Json<AddBackend>,
) -> Result<(StatusCode, Json<Registered>), BalancerError> {
    let id = state.registry.add_backend(&body.address)?;
    let address = state
        .registry
        .snapshot()
        .find(id)
        .map(|b| b.address().to_string())
        .unwrap_or(body.address);

    Ok((StatusCode::CREATED, Json(Registered { id, address })))
}

pub async fn remove_backend(
    State(state): State<AdminState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, BalancerError> {
    state.registry.remove_backend(BackendId::new(id))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn report_health(
    State(state): State<AdminState>,
    Path(id): Path<u64>,
    Json(report): Json<HealthReport>,
) -> Result<StatusCode, BalancerError> {
    state.registry.health().set_alive(BackendId::new(id), report.healthy)?;
    Ok(StatusCode::NO_CONTENT)
}
