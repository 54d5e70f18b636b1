//! End-to-end tests against the full router, exercising the ingress ↔
//! correlation table ↔ tunnel registry path without a real WebSocket
//! client — a session is simulated by draining the tunnel's outbound
//! queue directly and fulfilling the correlation table by hand.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pipegate_server::auth::AuthMode;
use pipegate_server::relay::Relay;
use tower::ServiceExt;
use uuid::Uuid;

fn test_relay(waiter_timeout: Duration) -> Relay {
    Relay::new(
        AuthMode::SharedToken {
            secret: "s3cr3t".to_string(),
        },
        1024,
        waiter_timeout,
    )
}

#[tokio::test]
async fn invalid_connection_id_is_rejected_before_any_tunnel_work() {
    let relay = test_relay(Duration::from_secs(5));
    let app = pipegate_server::router(relay);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/not-a-uuid/foo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unmethod_is_rejected_with_405() {
    let relay = test_relay(Duration::from_secs(5));
    let app = pipegate_server::router(relay);
    let conn_id = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("TRACE")
                .uri(format!("/{conn_id}/foo"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn no_tunnel_ever_attaches_times_out_as_504() {
    let relay = test_relay(Duration::from_millis(50));
    let app = pipegate_server::router(relay);
    let conn_id = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{conn_id}/hello"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn a_response_fulfilled_on_the_correlation_table_is_assembled_into_the_http_response() {
    let relay = test_relay(Duration::from_secs(5));
    let conn_id = Uuid::new_v4();

    // Attach a session, playing the part of a connected session's writer
    // fiber, to get at the tunnel's outbound queue.
    let (_tunnel, mut rx) = relay
        .registry()
        .attach_session(&conn_id.to_string(), Uuid::new_v4(), relay.queue_soft_cap())
        .unwrap();

    let relay_for_origin = relay.clone();
    let origin = tokio::spawn(async move {
        let frame = rx.recv().await.expect("ingress should have enqueued a frame");
        let response = pipegate_protocol::ResponseFrame::new(
            frame.correlation_id,
            &[("content-type".to_string(), "text/plain".to_string())],
            b"hello from origin",
            201,
        );
        relay_for_origin.correlation().fulfill(frame.correlation_id, response);
    });

    let app = pipegate_server::router(relay);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{conn_id}/widgets"))
                .body(Body::from("payload"))
                .unwrap(),
        )
        .await
        .unwrap();

    origin.await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello from origin");
}

#[tokio::test]
async fn websocket_upgrade_without_a_credential_is_rejected_with_401() {
    let relay = test_relay(Duration::from_secs(5));
    let app = pipegate_server::router(relay);
    let conn_id = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/{conn_id}"))
                .header("connection", "upgrade")
                .header("upgrade", "websocket")
                .header("sec-websocket-version", "13")
                .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn websocket_upgrade_with_the_shared_token_succeeds() {
    let relay = test_relay(Duration::from_secs(5));
    let app = pipegate_server::router(relay);
    let conn_id = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/{conn_id}"))
                .header("connection", "upgrade")
                .header("upgrade", "websocket")
                .header("sec-websocket-version", "13")
                .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                .header("x-pipegate-client-token", "s3cr3t")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
}

#[tokio::test]
async fn during_shutdown_ingress_requests_are_refused_with_504() {
    let relay = test_relay(Duration::from_secs(5));
    relay.shutdown().await;
    let app = pipegate_server::router(relay);
    let conn_id = Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/{conn_id}/hello"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}
