//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Add X-Forwarded-* headers before forwarding

use std::net::SocketAddr;

use axum::http::uri::Scheme;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Sets `x-request-id` on requests lacking one.
pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId)
}

/// Copies `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Record the client and original host for the upstream.
pub fn apply_forwarded_headers(
    headers: &mut HeaderMap,
    client: Option<SocketAddr>,
    original_host: Option<HeaderValue>,
    inbound_scheme: &Scheme,
) {
    if let Some(client) = client {
        let ip = client.ip().to_string();
        let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host);
    }
    // An earlier proxy's value describes the original client hop.
    if !headers.contains_key(&X_FORWARDED_PROTO) {
        if let Ok(proto) = HeaderValue::from_str(inbound_scheme.as_str()) {
            headers.insert(X_FORWARDED_PROTO, proto);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        apply_forwarded_headers(&mut headers, Some("10.0.0.2:4000".parse().unwrap()), None, &Scheme::HTTP);

        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert!(headers.get(X_FORWARDED_HOST).is_none());
    }

    #[test]
    fn test_forwarded_proto_follows_inbound_scheme() {
        let mut headers = HeaderMap::new();
        apply_forwarded_headers(&mut headers, None, None, &Scheme::HTTPS);
        assert_eq!(headers[X_FORWARDED_PROTO], "https");

        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
        apply_forwarded_headers(&mut headers, None, None, &Scheme::HTTP);
        assert_eq!(headers[X_FORWARDED_PROTO], "https");
    }

    #[test]
    fn test_request_id_fallback() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        assert_eq!(request_id(&headers), "abc");
    }
}
