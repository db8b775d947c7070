//! Backend abstraction.
//!
//! # Responsibilities
//! - Identify a single upstream target
//! - Expose its liveness as last recorded by `HealthState`
//! - Forward one request to it (reverse-proxy semantics)
//!
//! A backend never mutates shared state while forwarding. Outcomes are
//! returned to the dispatcher, which reports them to `HealthState`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response, Uri};
use bytes::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::{Position, Url};

use crate::error::BalancerError;
use crate::health::state::HealthRecord;
use crate::http::request::apply_forwarded_headers;
use crate::http::response::strip_hop_by_hop;

/// Opaque backend identifier, unique for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(u64);

impl BackendId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound request, buffered so it can be replayed on another backend.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Scheme the client used to reach the balancer.
    pub scheme: Scheme,
    pub path_and_query: PathAndQuery,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl ForwardRequest {
    /// Capture the parts of an inbound request.
    pub fn from_parts(parts: &Parts, body: Bytes, client_addr: Option<SocketAddr>) -> Self {
        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Self {
            method: parts.method.clone(),
            scheme: parts.uri.scheme().cloned().unwrap_or(Scheme::HTTP),
            path_and_query,
            headers: parts.headers.clone(),
            body,
            client_addr,
        }
    }

    /// A body-less GET, mostly useful for probes and tests.
    pub fn get(path_and_query: &'static str) -> Self {
        Self {
            method: Method::GET,
            scheme: Scheme::HTTP,
            path_and_query: PathAndQuery::from_static(path_and_query),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
        }
    }
}

/// Capability every upstream target provides.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    fn id(&self) -> BackendId;

    /// Base URL of the target. Immutable after creation.
    fn address(&self) -> &Url;

    /// Current liveness snapshot. Never performs I/O.
    fn is_alive(&self) -> bool;

    /// Claim a recovery trial while dead. See `HealthRecord::admit_trial`.
    fn admit_trial(&self) -> bool {
        false
    }

    /// Forward a request. Transport failures come back as `BackendUnreachable`;
    /// any HTTP response, whatever its status, is `Ok`.
    async fn forward(&self, request: &ForwardRequest) -> Result<Response<Body>, BalancerError>;
}

/// HTTP client shared by all reverse-proxy backends. Speaks both `http`
/// and `https` (rustls, webpki roots).
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the outbound client with the given connect timeout.
pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);

    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(connector);
    Client::builder(TokioExecutor::new()).build(https)
}

/// Normalize `host:port`, `http://host:port` or `https://host[:port]`
/// into a base URL. Bare addresses are taken as `http`.
pub fn parse_address(address: &str) -> Result<Url, BalancerError> {
    let invalid = |reason: &str| BalancerError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https upstreams are supported"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("address must not carry a path, query or fragment"));
    }
    Ok(url)
}

/// Plain reverse-proxy backend.
#[derive(Debug)]
pub struct HttpBackend {
    id: BackendId,
    address: Url,
    scheme: Scheme,
    authority: Authority,
    health: Arc<HealthRecord>,
    client: HttpClient,
}

impl HttpBackend {
    pub fn new(
        id: BackendId,
        address: Url,
        health: Arc<HealthRecord>,
        client: HttpClient,
    ) -> Result<Self, BalancerError> {
        let authority = Authority::try_from(&address[Position::BeforeHost..Position::AfterPort])
            .map_err(|e| BalancerError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        let scheme = if address.scheme() == "https" {
            Scheme::HTTPS
        } else {
            Scheme::HTTP
        };

        Ok(Self {
            id,
            address,
            scheme,
            authority,
            health,
            client,
        })
    }

    fn unreachable(&self, reason: impl Into<String>) -> BalancerError {
        BalancerError::BackendUnreachable {
            backend: self.id,
            reason: reason.into(),
        }
    }

    /// Rewrite the inbound request for this target.
    fn build_request(&self, request: &ForwardRequest) -> Result<Request<Body>, BalancerError> {
        let uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(request.path_and_query.clone())
            .build()
            .map_err(|e| self.unreachable(format!("invalid upstream uri: {}", e)))?;

        let mut upstream = Request::builder()
            .method(request.method.clone())
            .uri(uri)
            .body(Body::from(request.body.clone()))
            .map_err(|e| self.unreachable(format!("invalid upstream request: {}", e)))?;

        let original_host = request.headers.get(header::HOST).cloned();
        let headers = upstream.headers_mut();
        *headers = request.headers.clone();
        strip_hop_by_hop(headers);

        let host = HeaderValue::from_str(self.authority.as_str())
            .map_err(|e| self.unreachable(format!("invalid host header: {}", e)))?;
        headers.insert(header::HOST, host);
        apply_forwarded_headers(headers, request.client_addr, original_host, &request.scheme);

        Ok(upstream)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn address(&self) -> &Url {
        &self.address
    }

    fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    fn admit_trial(&self) -> bool {
        self.health.admit_trial()
    }

    async fn forward(&self, request: &ForwardRequest) -> Result<Response<Body>, BalancerError> {
        let upstream = self.build_request(request)?;

        match self.client.request(upstream).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(e) => {
                let reason = match std::error::Error::source(&e) {
                    Some(source) => format!("{}: {}", e, source),
                    None => e.to_string(),
                };
                Err(self.unreachable(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::HealthState;

    fn backend(address: &str) -> HttpBackend {
        let health = HealthState::new(3);
        let id = BackendId::new(1);
        HttpBackend::new(
            id,
            parse_address(address).unwrap(),
            health.register(id),
            build_client(Duration::from_millis(100)),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("127.0.0.1:3000").unwrap().as_str(), "http://127.0.0.1:3000/");
        assert_eq!(parse_address("http://localhost:8080").unwrap().port(), Some(8080));
        assert_eq!(parse_address("https://www.amazon.com").unwrap().as_str(), "https://www.amazon.com/");
        assert!(parse_address("ftp://example.com:21").is_err());
        assert!(parse_address("http://example.com/api").is_err());
        assert!(parse_address("not a url").is_err());
    }

    #[test]
    fn test_request_rewrite() {
        let b = backend("http://10.0.0.5:9000");
        let mut request = ForwardRequest::get("/items?page=2");
        request.headers.insert(header::HOST, HeaderValue::from_static("lb.example.com"));
        request.headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        request.client_addr = Some("192.168.1.10:5555".parse().unwrap());

        let upstream = b.build_request(&request).unwrap();
        assert_eq!(upstream.uri().to_string(), "http://10.0.0.5:9000/items?page=2");
        assert_eq!(upstream.headers()[header::HOST], "10.0.0.5:9000");
        assert_eq!(upstream.headers()["x-forwarded-host"], "lb.example.com");
        assert_eq!(upstream.headers()["x-forwarded-for"], "192.168.1.10");
        assert!(upstream.headers().get(header::CONNECTION).is_none());
    }

    #[test]
    fn test_https_request_rewrite() {
        let b = backend("https://www.amazon.com");
        let mut request = ForwardRequest::get("/gp/help?ref=nav");
        request.headers.insert(header::HOST, HeaderValue::from_static("lb.example.com"));

        let upstream = b.build_request(&request).unwrap();
        assert_eq!(upstream.uri().scheme(), Some(&Scheme::HTTPS));
        assert_eq!(upstream.uri().to_string(), "https://www.amazon.com/gp/help?ref=nav");
        assert_eq!(upstream.headers()[header::HOST], "www.amazon.com");
        assert_eq!(upstream.headers()["x-forwarded-proto"], "http");
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let b = backend(&addr.to_string());
        let err = b.forward(&ForwardRequest::get("/")).await.unwrap_err();
        assert!(err.is_transport());
    }
}
