//! Admin API tests, driven in-process through the router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_balancer::admin::handlers::{BackendStatus, Registered, SystemStatus};
use http_balancer::admin::{setup_admin_router, AdminState};
use http_balancer::health::HealthState;
use http_balancer::load_balancer::backend::build_client;
use http_balancer::load_balancer::pool::BalancerRegistry;
use tower::ServiceExt;

const KEY: &str = "test-key";

fn setup() -> (Router, Arc<BalancerRegistry>) {
    let registry = Arc::new(BalancerRegistry::new(
        Arc::new(HealthState::new(3)),
        build_client(Duration::from_millis(100)),
    ));
    registry.add_backend("127.0.0.1:3001").unwrap();
    let router = setup_admin_router(AdminState::new(registry.clone(), KEY));
    (router, registry)
}

fn request(method: Method, uri: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {KEY}"));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json<T: serde::de::DeserializeOwned>(res: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_rejects_missing_or_wrong_key() {
    let (router, _) = setup();

    let res = router
        .clone()
        .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = router
        .oneshot(
            Request::get("/admin/status")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_and_listing() {
    let (router, _) = setup();

    let res = router.clone().oneshot(request(Method::GET, "/admin/status", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: SystemStatus = json(res).await;
    assert_eq!(status.backends, 1);
    assert_eq!(status.alive, 1);
    assert_eq!(status.status, "operational");
    assert_eq!(status.unhealthy_threshold, 3);

    let res = router.oneshot(request(Method::GET, "/admin/backends", None)).await.unwrap();
    let backends: Vec<BackendStatus> = json(res).await;
    assert_eq!(backends.len(), 1);
    assert_eq!(backends[0].address, "http://127.0.0.1:3001/");
    assert!(backends[0].alive);
}

#[tokio::test]
async fn test_register_and_deregister() {
    let (router, registry) = setup();

    let res = router
        .clone()
        .oneshot(request(Method::POST, "/admin/backends", Some(r#"{"address":"127.0.0.1:3002"}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let registered: Registered = json(res).await;
    assert_eq!(registry.len(), 2);

    let res = router
        .clone()
        .oneshot(request(Method::POST, "/admin/backends", Some(r#"{"address":"http://127.0.0.1:3002"}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = router
        .clone()
        .oneshot(request(Method::POST, "/admin/backends", Some(r#"{"address":"ftp://127.0.0.1:21"}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = router
        .clone()
        .oneshot(request(Method::DELETE, "/admin/backends/999", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let uri = format!("/admin/backends/{}", registered.id);
    let res = router.clone().oneshot(request(Method::DELETE, &uri, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(registry.len(), 1);

    let last = registry.snapshot().get(0).unwrap().id();
    let uri = format!("/admin/backends/{}", last);
    let res = router.oneshot(request(Method::DELETE, &uri, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_liveness_push() {
    let (router, registry) = setup();
    let id = registry.snapshot().get(0).unwrap().id();
    let uri = format!("/admin/backends/{}/health", id);

    let res = router
        .clone()
        .oneshot(request(Method::POST, &uri, Some(r#"{"healthy":false}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(!registry.health().is_alive(id));

    let res = router
        .clone()
        .oneshot(request(Method::GET, "/admin/status", None))
        .await
        .unwrap();
    let status: SystemStatus = json(res).await;
    assert_eq!(status.status, "degraded");

    let res = router
        .clone()
        .oneshot(request(Method::POST, &uri, Some(r#"{"healthy":true}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(registry.health().is_alive(id));

    let res = router
        .oneshot(request(Method::POST, "/admin/backends/42/health", Some(r#"{"healthy":true}"#)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
