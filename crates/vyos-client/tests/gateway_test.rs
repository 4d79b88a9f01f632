//! HTTP handling of the VyOS client against a local stub server

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vyos_client::{DeviceApiError, DeviceGateway, VyosClient};
use vyos_commands::port_forward::delete_rule;

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    body: String,
    delay: Duration,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn handler(State(stub): State<Stub>, Json(request): Json<Value>) -> (StatusCode, String) {
    stub.received.lock().unwrap().push(request);
    tokio::time::sleep(stub.delay).await;
    (stub.status, stub.body.clone())
}

async fn serve(status: StatusCode, body: &str, delay: Duration) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let stub = Stub {
        status,
        body: body.to_string(),
        delay,
        received: received.clone(),
    };
    let app = Router::new()
        .route("/configure", post(handler))
        .route("/retrieve", post(handler))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), received)
}

fn client(base_url: String, timeout: Duration) -> VyosClient {
    VyosClient::new(base_url, "controller".to_string(), "s3cret".to_string(), timeout, false)
        .expect("Failed to create client")
}

#[tokio::test]
async fn test_apply_sends_envelope() {
    let (url, received) = serve(StatusCode::OK, r#"{"success": true, "data": null, "error": null}"#, Duration::ZERO).await;
    let client = client(url, Duration::from_secs(5));

    client.apply(&delete_rule(10001)).await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0],
        json!({
            "op": "delete",
            "id": "controller",
            "key": "s3cret",
            "commands": ["delete nat destination rule 10001"]
        })
    );
}

#[tokio::test]
async fn test_empty_batch_makes_no_call() {
    let (url, received) = serve(StatusCode::OK, r#"{"success": true}"#, Duration::ZERO).await;
    let client = client(url, Duration::from_secs(5));

    let empty = vyos_commands::CommandBatch::new(vyos_commands::Op::Set, Vec::new());
    client.apply(&empty).await.unwrap();
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_device_rejection_keeps_message() {
    let (url, _) = serve(
        StatusCode::BAD_REQUEST,
        r#"{"success": false, "error": {"message": "Configuration path is not valid"}}"#,
        Duration::ZERO,
    )
    .await;
    let client = client(url, Duration::from_secs(5));

    let err = client.apply(&delete_rule(10001)).await.unwrap_err();
    assert_eq!(
        err,
        DeviceApiError::Rejected {
            status: Some(400),
            message: "Configuration path is not valid".to_string()
        }
    );
    assert!(!err.is_indeterminate());
}

#[tokio::test]
async fn test_malformed_body() {
    let (url, _) = serve(StatusCode::OK, "<html>login</html>", Duration::ZERO).await;
    let client = client(url, Duration::from_secs(5));

    let err = client.apply(&delete_rule(10001)).await.unwrap_err();
    assert!(matches!(err, DeviceApiError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_timeout_is_indeterminate() {
    let (url, received) = serve(StatusCode::OK, r#"{"success": true}"#, Duration::from_secs(3)).await;
    let client = client(url, Duration::from_millis(200));

    let err = client.apply(&delete_rule(10001)).await.unwrap_err();
    assert!(err.is_indeterminate(), "expected transport error, got {:?}", err);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_device_is_indeterminate() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(url, Duration::from_secs(2)).fetch_nat_rules().await.unwrap_err();
    assert!(err.is_indeterminate());
}

#[tokio::test]
async fn test_fetch_nat_rules() {
    let body = json!({
        "success": true,
        "data": {
            "10001": {
                "description": "vm1 SSH",
                "destination": {"port": "2201"},
                "inbound-interface": {"name": "eth0"},
                "protocol": "tcp",
                "translation": {"address": "192.168.1.10", "port": "22"}
            }
        },
        "error": null
    });
    let (url, received) = serve(StatusCode::OK, &body.to_string(), Duration::ZERO).await;
    let client = client(url, Duration::from_secs(5));

    let rules = client.fetch_nat_rules().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].number, 10001);
    assert_eq!(rules[0].destination_port, Some(2201));

    let request = &received.lock().unwrap()[0];
    assert_eq!(request["op"], "showConfig");
    assert_eq!(request["path"], json!(["nat", "destination", "rule"]));
}
