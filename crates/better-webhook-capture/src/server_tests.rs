//! Tests for the capture HTTP server.

use super::*;
use crate::store::CaptureStore;
use serde_json::json;
use tempfile::TempDir;

async fn running_server() -> (TempDir, CaptureStore, CaptureServerHandle) {
    let dir = TempDir::new().unwrap();
    let store = CaptureStore::new(dir.path().to_path_buf()).await.unwrap();
    let handle = start_capture_server(
        CaptureServerConfig::default(),
        store.clone(),
        ProviderDetector::with_defaults(),
    )
    .await
    .unwrap();
    (dir, store, handle)
}

#[tokio::test]
async fn post_is_captured_and_persisted() {
    let (_dir, store, handle) = running_server().await;
    let url = format!("http://{}/webhooks/x", handle.addr());

    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .header("x-demo", "1")
        .body(r#"{"hello":"world"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let capture_id = response
        .headers()
        .get("x-capture-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let body: CaptureResponse = response.json().await.unwrap();
    assert!(body.success);
    assert_eq!(body.id, capture_id);
    assert!(body.file.ends_with(".json"));

    let listed = store.list(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    let capture = &listed[0].capture;
    assert_eq!(capture.id, capture_id);
    assert_eq!(capture.method, "POST");
    assert_eq!(capture.path, "/webhooks/x");
    assert_eq!(capture.body, json!({"hello": "world"}));
    assert_eq!(capture.raw_body, r#"{"hello":"world"}"#);
    assert!(capture
        .headers
        .iter()
        .any(|pair| pair.key == "x-demo" && pair.value == "1"));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn any_method_and_path_are_accepted() {
    let (_dir, store, handle) = running_server().await;
    let url = format!("http://{}/some/odd/path?a=1&a=2", handle.addr());

    let response = reqwest::Client::new().put(&url).body("null").send().await.unwrap();
    assert_eq!(response.status(), 200);

    let listed = store.list(None).await.unwrap();
    let capture = &listed[0].capture;
    assert_eq!(capture.method, "PUT");
    assert_eq!(capture.path, "/some/odd/path");
    assert_eq!(capture.query["a"], vec!["1", "2"]);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_body_answers_413_and_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let store = CaptureStore::new(dir.path().to_path_buf()).await.unwrap();
    let handle = start_capture_server(
        CaptureServerConfig {
            max_body_bytes: 64,
            ..CaptureServerConfig::default()
        },
        store.clone(),
        ProviderDetector::with_defaults(),
    )
    .await
    .unwrap();

    let url = format!("http://{}/big", handle.addr());
    let response = reqwest::Client::new()
        .post(&url)
        .body(vec![b'x'; 65])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    assert!(store.list(None).await.unwrap().is_empty());

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn detected_provider_is_annotated() {
    let (_dir, store, handle) = running_server().await;
    let url = format!("http://{}/webhooks/github", handle.addr());

    reqwest::Client::new()
        .post(&url)
        .header("x-github-event", "push")
        .header("x-github-delivery", "d-1")
        .body(r#"{"ref":"refs/heads/main"}"#)
        .send()
        .await
        .unwrap();

    let listed = store.list(None).await.unwrap();
    assert_eq!(listed[0].capture.provider.as_deref(), Some("github"));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn subscribers_receive_each_capture() {
    let (_dir, _store, handle) = running_server().await;
    let mut events = handle.subscribe();

    let url = format!("http://{}/notify-me", handle.addr());
    reqwest::Client::new()
        .post(&url)
        .body("{}")
        .send()
        .await
        .unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
        .await
        .expect("subscriber should be notified")
        .unwrap();
    assert_eq!(event.capture.path, "/notify-me");
    assert!(event.file.ends_with(".json"));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn stop_shuts_the_listener_down() {
    let (_dir, _store, handle) = running_server().await;
    let addr = handle.addr();

    handle.stop().await.unwrap();

    let result = reqwest::Client::new()
        .post(format!("http://{}/after-stop", addr))
        .body("{}")
        .send()
        .await;
    assert!(result.is_err());
}
