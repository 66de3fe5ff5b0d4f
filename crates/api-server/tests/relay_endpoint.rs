//! Relay endpoint against an in-process mock backend.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use bizevent_api::{RelayServer, RemoteForwarder};
use bizevent_core::config::AppConfig;
use bizevent_core::{CorrelationId, CorrelationOrigin};
use bizevent_transport::{
    AsyncSocketTransport, DeliveryOutcome, RelayRequest, Transport, TransportConfig,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

#[derive(Debug)]
struct Forwarded {
    correlation_id: String,
    authorization: Option<String>,
    body: String,
}

async fn backend(
    State(tx): State<mpsc::UnboundedSender<Forwarded>>,
    Path(correlation_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let _ = tx.send(Forwarded {
        correlation_id,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    StatusCode::OK
}

async fn spawn_backend() -> (String, mpsc::UnboundedReceiver<Forwarded>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/plugin/:correlation_id/v1-beta/magentoBizEvent", post(backend))
        .layer(DefaultBodyLimit::disable())
        .with_state(tx);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), rx)
}

fn target_on(port: u16) -> TransportConfig {
    TransportConfig {
        scheme: "http".into(),
        host: "127.0.0.1".into(),
        port,
        path: "/bizevent/send".into(),
        send_key: "shared-secret".into(),
    }
}

fn target() -> TransportConfig {
    target_on(8080)
}

fn relay_config(backend_url: &str, enabled: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.capture.enabled = enabled;
    config.capture.api_key = "api-key".into();
    config.capture.test_mode = true;
    config.capture.test_server_url_start = backend_url.to_string();
    config
}

fn relay_with(config: AppConfig, target: &TransportConfig) -> Router {
    let forwarder = Arc::new(RemoteForwarder::from_config(&config).unwrap());
    RelayServer::new(config, forwarder, target).router()
}

fn relay(backend_url: &str, enabled: bool) -> Router {
    relay_with(relay_config(backend_url, enabled), &target())
}

fn relay_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/bizevent/send")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn forwards_verified_request_with_basic_auth() {
    let (backend_url, mut rx) = spawn_backend().await;
    let app = relay(&backend_url, true);

    let body = RelayRequest {
        data: r#"{"eventType":"start_of_session"}"#,
        sequence_no: 0,
        correlation_id: "4242",
        send_key: "shared-secret",
    }
    .form_body();
    let response = app.oneshot(relay_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Done");

    let forwarded = rx.try_recv().unwrap();
    assert_eq!(forwarded.correlation_id, "4242");
    assert_eq!(forwarded.body, r#"{"eventType":"start_of_session"}"#);
    // base64("api-key:")
    assert_eq!(forwarded.authorization.as_deref(), Some("Basic YXBpLWtleTo="));
}

#[tokio::test]
async fn accepts_event_no_alias() {
    let (backend_url, mut rx) = spawn_backend().await;
    let app = relay(&backend_url, true);

    let body = "event_no=5&data=%7B%7D&is_local_request=1&correlation_id=9&send_key=shared-secret";
    let response = app.oneshot(relay_request(body.to_string())).await.unwrap();

    assert_eq!(body_text(response).await, "Done");
    assert_eq!(rx.try_recv().unwrap().correlation_id, "9");
}

#[tokio::test]
async fn rejected_requests_still_answer_done() {
    let (backend_url, mut rx) = spawn_backend().await;

    let bad_key = RelayRequest {
        data: "{}",
        sequence_no: 1,
        correlation_id: "1",
        send_key: "guess",
    }
    .form_body();
    let not_local = "sequence_no=1&data=%7B%7D&correlation_id=1&send_key=shared-secret".to_string();
    let no_data = "sequence_no=1&is_local_request=1&correlation_id=1&send_key=shared-secret".to_string();

    for body in [bad_key, not_local, no_data] {
        let response = relay(&backend_url, true)
            .oneshot(relay_request(body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Done");
    }

    // Capture switched off: even a valid request is dropped.
    let valid = RelayRequest {
        data: "{}",
        sequence_no: 1,
        correlation_id: "1",
        send_key: "shared-secret",
    }
    .form_body();
    let response = relay(&backend_url, false)
        .oneshot(relay_request(valid))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "Done");

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_backend_is_invisible_to_caller() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = relay(&format!("http://127.0.0.1:{port}"), true);

    let body = RelayRequest {
        data: "{}",
        sequence_no: 2,
        correlation_id: "1",
        send_key: "shared-secret",
    }
    .form_body();
    let response = app.oneshot(relay_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Done");
}

fn valid_body(data: &str) -> String {
    RelayRequest {
        data,
        sequence_no: 6,
        correlation_id: "4242",
        send_key: "shared-secret",
    }
    .form_body()
}

#[tokio::test]
async fn forwards_events_larger_than_framework_default_limit() {
    let (backend_url, mut rx) = spawn_backend().await;
    let data = format!(r#"{{"eventType":"cart","blob":"{}"}}"#, "a".repeat(3 * 1024 * 1024));

    let response = relay(&backend_url, true)
        .oneshot(relay_request(valid_body(&data)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Done");
    assert_eq!(rx.try_recv().unwrap().body.len(), data.len());
}

#[tokio::test]
async fn oversized_body_still_answers_done() {
    let (backend_url, mut rx) = spawn_backend().await;
    let mut config = relay_config(&backend_url, true);
    config.api.max_body_bytes = 1024;
    let data = "b".repeat(4096);

    let response = relay_with(config, &target())
        .oneshot(relay_request(valid_body(&data)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Done");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn path_like_correlation_id_is_not_forwarded() {
    let (backend_url, mut rx) = spawn_backend().await;
    let body = RelayRequest {
        data: "{}",
        sequence_no: 1,
        correlation_id: "../../admin",
        send_key: "shared-secret",
    }
    .form_body();

    let response = relay(&backend_url, true)
        .oneshot(relay_request(body))
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "Done");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn socket_transport_delivers_through_running_relay() {
    let (backend_url, mut rx) = spawn_backend().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = target_on(listener.local_addr().unwrap().port());
    let app = relay_with(relay_config(&backend_url, true), &target);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let transport =
        AsyncSocketTransport::new(Arc::new(target), &AppConfig::default().relay).unwrap();
    let id = CorrelationId::new("5150", CorrelationOrigin::Cookie);
    let outcome = transport.send(r#"{"eventType":"x"}"#, 2, &id).await;
    assert!(matches!(outcome, DeliveryOutcome::Written { .. }), "{outcome:?}");

    // The socket closes without reading; the relay still forwards.
    let forwarded = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forwarded.correlation_id, "5150");
    assert_eq!(forwarded.body, r#"{"eventType":"x"}"#);
}

#[tokio::test]
async fn health_endpoints() {
    let (backend_url, _rx) = spawn_backend().await;

    let response = relay(&backend_url, true)
        .oneshot(Request::get("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = relay(&backend_url, true)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["capture_enabled"], true);
}
