//! Tests for the outbound executor.

use super::*;
use better_webhook_core::Headers;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn target_accepting_posts() -> MockServer {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("delivered"))
        .mount(&target)
        .await;
    target
}

async fn only_request(target: &MockServer) -> wiremock::Request {
    let mut requests = target.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    requests.remove(0)
}

fn received_headers(request: &wiremock::Request) -> Headers {
    Headers::from_pairs(request.headers.iter().map(|(name, value)| {
        (
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
    }))
}

#[tokio::test]
async fn json_body_is_encoded_with_content_type() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.body = Some(json!({"a": 1}));
    let outcome = Executor::new().send(request).await.unwrap();

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body_text, "delivered");

    let received = only_request(&target).await;
    assert_eq!(received.body, br#"{"a":1}"#.to_vec());
    assert_eq!(
        received.headers.get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn string_body_is_sent_verbatim() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.body = Some(Value::String("raw text payload".to_string()));
    Executor::new().send(request).await.unwrap();

    let received = only_request(&target).await;
    assert_eq!(received.body, b"raw text payload".to_vec());
}

#[tokio::test]
async fn github_baseline_headers_are_applied() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-github-event", "push"))
        .and(header_exists("x-github-delivery"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("github".to_string());
    request.body = Some(json!({"ref": "refs/heads/main"}));
    let outcome = Executor::new().send(request).await.unwrap();

    assert_eq!(outcome.status, 200);
}

#[tokio::test]
async fn caller_headers_override_the_baseline() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-github-event", "issues"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("github".to_string());
    request.headers = vec![HeaderPair::new("x-github-event", "issues")];
    request.body = Some(json!({"action": "opened"}));
    Executor::new().send(request).await.unwrap();
}

#[tokio::test]
async fn github_signature_verifies_against_the_sent_body() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("github".to_string());
    request.secret = Some("shhh".to_string());
    request.body = Some(json!({"ref": "refs/heads/main"}));
    Executor::new().send(request).await.unwrap();

    let received = only_request(&target).await;
    let headers = received_headers(&received);
    let scheme = SignatureScheme::github();

    assert!(scheme.verify(&received.body, &headers, "shhh", None));
    assert!(!scheme.verify(&received.body, &headers, "other", None));
}

#[tokio::test]
async fn svix_signature_uses_generated_id_and_timestamp() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("svix".to_string());
    request.secret = Some("shhh".to_string());
    request.body = Some(json!({"type": "user.created"}));
    Executor::new().send(request).await.unwrap();

    let received = only_request(&target).await;
    let headers = received_headers(&received);

    assert!(headers.contains("svix-id"));
    assert!(headers.contains("svix-timestamp"));
    assert!(SignatureScheme::svix().verify(&received.body, &headers, "shhh", None));
}

#[tokio::test]
async fn stripe_signature_carries_compound_header() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("stripe".to_string());
    request.secret = Some("whsec_test".to_string());
    request.body = Some(json!({"id": "evt_1", "type": "payment_intent.succeeded"}));
    Executor::new().send(request).await.unwrap();

    let received = only_request(&target).await;
    let headers = received_headers(&received);

    let value = headers.get("stripe-signature").unwrap();
    assert!(value.starts_with("t="));
    assert!(value.contains(",v1="));
    assert!(SignatureScheme::stripe().verify(&received.body, &headers, "whsec_test", None));
}

#[tokio::test]
async fn twilio_signature_signs_over_the_target_url() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("twilio".to_string());
    request.secret = Some("tok".to_string());
    request.body = Some(json!({"EventType": "com.twilio.messaging.inbound"}));
    let url = request.url.clone();
    Executor::new().send(request).await.unwrap();

    let received = only_request(&target).await;
    let headers = received_headers(&received);

    assert!(SignatureScheme::twilio().verify(&received.body, &headers, "tok", Some(&url)));
}

#[tokio::test]
async fn no_signature_without_a_secret() {
    let target = target_accepting_posts().await;

    let mut request = SendRequest::new(target.uri());
    request.provider = Some("github".to_string());
    request.body = Some(json!({"ref": "x"}));
    Executor::new().send(request).await.unwrap();

    let received = only_request(&target).await;
    assert!(received.headers.get("x-hub-signature-256").is_none());
}

#[tokio::test]
async fn transport_failure_surfaces_as_execution_error() {
    let mut request = SendRequest::new("http://127.0.0.1:9/unreachable");
    request.body = Some(json!({}));

    let err = Executor::new().send(request).await.unwrap_err();
    assert!(matches!(err, DispatchError::ExecutionFailed { .. }));
}
