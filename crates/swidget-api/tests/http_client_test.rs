#![allow(clippy::unwrap_used)]

// Integration tests for `HttpClient` and `Provisioner` using wiremock.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use swidget_api::{Credentials, Error, HttpClient, ProvisionPolicy, ProvisionRequest, Provisioner};

// ── Helpers ─────────────────────────────────────────────────────────

fn credentials() -> Credentials {
    Credentials::new("x-secret-key", SecretString::from("s3cret".to_string()))
}

async fn setup() -> (MockServer, HttpClient) {
    let server = MockServer::start().await;
    let client = HttpClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        credentials(),
    );
    (server, client)
}

fn summary_body() -> serde_json::Value {
    json!({
        "model": "SW-DIM-1",
        "mac": "aabbccddeeff",
        "version": "1.4.2",
        "host": {
            "type": "dimmer",
            "components": [{ "id": "0", "functions": ["toggle", "level"] }]
        },
        "insert": {
            "type": "USB",
            "components": [{ "id": "usb", "functions": ["toggle"] }]
        }
    })
}

// ── Device state ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_summary_sends_secret_header() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/summary"))
        .and(header("x-secret-key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body()))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client.get_summary().await.unwrap();
    assert_eq!(summary.model, "SW-DIM-1");
    assert_eq!(summary.host.kind, "dimmer");
    assert_eq!(summary.insert.components[0].id, "usb");
}

#[tokio::test]
async fn test_send_command_returns_body() {
    let (server, client) = setup().await;
    let document = json!({ "host": { "components": { "0": { "toggle": { "state": "on" } } } } });
    let reply = json!({ "host": { "components": { "0": { "toggle": { "state": "on" } } } }, "connection": { "rssi": -52 } });

    Mock::given(method("POST"))
        .and(path("/api/v1/command"))
        .and(body_json(&document))
        .respond_with(ResponseTemplate::new(200).set_body_json(&reply))
        .mount(&server)
        .await;

    assert_eq!(client.send_command(&document).await.unwrap(), reply);
}

#[tokio::test]
async fn test_get_name_and_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Hallway" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blink"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert_eq!(client.get_name().await.unwrap(), "Hallway");
    assert_eq!(client.blink().await.unwrap(), serde_json::Value::Null);
}

// ── Maintenance ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_check_for_updates_sorted() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updates": ["1.5.0", "1.4.9", "1.4.10"] })))
        .mount(&server)
        .await;

    assert_eq!(
        client.check_for_updates().await.unwrap(),
        vec!["1.4.10", "1.4.9", "1.5.0"]
    );
}

#[tokio::test]
async fn test_reset_methods() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "restarting": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/reset"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.restart_device().await.unwrap();
    client.factory_reset().await.unwrap();
}

#[tokio::test]
async fn test_enable_debug_server_passes_token_in_query() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/debug"))
        .and(query_param("x-secret-key", "s3cret"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert!(client.enable_debug_server().await.unwrap());
}

#[tokio::test]
async fn test_ping_reports_reachability() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    assert!(client.ping().await);

    // Reserve a port, then free it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed = listener.local_addr().unwrap();
    drop(listener);
    let unreachable = HttpClient::with_client(
        reqwest::Client::new(),
        Url::parse(&format!("http://{closed}")).unwrap(),
        credentials(),
    );
    assert!(!unreachable.ping().await);
}

#[tokio::test]
async fn test_get_picture_with_size_headers() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/picture"))
        .and(header("x-picture-width", "640"))
        .and(header("x-picture-height", "480"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .mount(&server)
        .await;

    let bytes = client.get_picture(Some((640, 480))).await.unwrap().unwrap();
    assert_eq!(bytes.as_ref(), &[0xFF, 0xD8, 0xFF]);
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_auth_failure() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/state"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.get_state().await;
    assert!(
        matches!(result, Err(Error::AuthenticationFailed { .. })),
        "expected AuthenticationFailed, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/device_config"))
        .respond_with(ResponseTemplate::new(500).set_body_string("flash busy"))
        .mount(&server)
        .await;

    match client.get_device_config().await {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "flash busy");
        }
        other => panic!("expected Http 500 error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_json_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"model\":"))
        .mount(&server)
        .await;

    let result = client.get_summary().await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization, got: {result:?}"
    );
}

// ── Provisioning ────────────────────────────────────────────────────

fn provisioner(server: &MockServer) -> Provisioner {
    Provisioner::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        ProvisionPolicy {
            attempts: 3,
            interval: Duration::from_millis(10),
        },
    )
}

fn provision_request() -> ProvisionRequest {
    ProvisionRequest {
        device_name: "Porch".into(),
        ssid: "home".into(),
        network_password: SecretString::from("wifi-pass".to_string()),
        secret_key: SecretString::from(String::new()),
    }
}

#[tokio::test]
async fn test_provision_uses_device_generated_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/network"))
        .and(body_json(json!({
            "name": "Porch",
            "ssid": "home",
            "password": "wifi-pass",
            "secretKey": ""
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "secretKey": "generated" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/network"))
        .and(header("x-secret-key", "generated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Success",
            "ip": "192.168.1.77",
            "mac": "aabbccddeeff"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/setup_complete"))
        .and(header("x-secret-key", "generated"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let done = provisioner(&server).provision_wifi(&provision_request()).await.unwrap();
    assert_eq!(done.ip, "192.168.1.77");
    assert_eq!(done.mac, "aabbccddeeff");
    assert_eq!(done.secret_key.expose_secret(), "generated");
}

#[tokio::test]
async fn test_provision_gives_up_while_in_progress() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "secretKey": "k" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "InProgress" })))
        .expect(3)
        .mount(&server)
        .await;

    let result = provisioner(&server).provision_wifi(&provision_request()).await;
    assert!(
        matches!(result, Err(Error::Provisioning { .. })),
        "expected Provisioning error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_provision_reports_wrong_wifi_password() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "secretKey": "k" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/network"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "AuthFail" })))
        .expect(1)
        .mount(&server)
        .await;

    match provisioner(&server).provision_wifi(&provision_request()).await {
        Err(Error::Provisioning { reason }) => assert!(reason.contains("AuthenticationFailure"), "{reason}"),
        other => panic!("expected Provisioning error, got: {other:?}"),
    }
}
