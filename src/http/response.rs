//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Map balancer errors to 5xx/4xx responses

use axum::http::{header, HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};

use crate::error::BalancerError;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
/// `Upgrade` is dropped too; protocol upgrades are not proxied.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        let message = match &self {
            BalancerError::NoAvailableBackend => "No available backend".to_string(),
            BalancerError::UpstreamUnavailable { .. } | BalancerError::BackendUnreachable { .. } => {
                "Upstream unavailable".to_string()
            }
            BalancerError::Cancelled => "Request cancelled".to_string(),
            other => other.to_string(),
        };
        (self.status_code(), message).into_response()
    }
}
