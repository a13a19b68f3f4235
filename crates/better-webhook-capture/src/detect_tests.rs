//! Tests for provider detection.

use super::*;
use serde_json::json;

fn headers_from(pairs: Vec<(&str, &str)>) -> Headers {
    Headers::from_pairs(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

fn detect(headers: &Headers, body: Option<&Value>) -> Option<Detection> {
    ProviderDetector::with_defaults().detect(&DetectionInput {
        method: "POST",
        path: "/webhooks/x",
        headers,
        body,
    })
}

#[test]
fn header_markers_identify_common_providers() {
    let cases = vec![
        (vec![("x-github-event", "push")], "github"),
        (vec![("stripe-signature", "t=1,v1=a")], "stripe"),
        (vec![("x-shopify-topic", "orders/create")], "shopify"),
        (vec![("x-slack-signature", "v0=a")], "slack"),
        (vec![("linear-signature", "a")], "linear"),
        (vec![("x-twilio-signature", "a")], "twilio"),
        (vec![("x-signature-ed25519", "a")], "discord"),
        (
            vec![("x-twilio-email-event-webhook-signature", "a")],
            "sendgrid",
        ),
    ];

    for (pairs, expected) in cases {
        let headers = headers_from(pairs);
        let detection = detect(&headers, None).expect(expected);
        assert_eq!(detection.provider, expected);
    }
}

#[test]
fn no_markers_yields_none() {
    let headers = headers_from(vec![("content-type", "application/json")]);
    assert!(detect(&headers, Some(&json!({"hello": "world"}))).is_none());
}

#[test]
fn svix_with_recall_body_is_recall() {
    let headers = headers_from(vec![("svix-signature", "v1,a")]);
    let body = json!({"event": "bot.status_change", "data": {}});

    let detection = detect(&headers, Some(&body)).unwrap();
    assert_eq!(detection.provider, "recall");
}

#[test]
fn svix_with_transcript_event_is_recall() {
    let headers = headers_from(vec![
        ("webhook-signature", "v1,a"),
        ("webhook-id", "msg_1"),
    ]);
    let body = json!({"event": "transcript.done"});

    let detection = detect(&headers, Some(&body)).unwrap();
    assert_eq!(detection.provider, "recall");
}

#[test]
fn svix_with_clerk_body_is_clerk() {
    let headers = headers_from(vec![
        ("webhook-signature", "v1,a"),
        ("webhook-id", "msg_1"),
    ]);
    let body = json!({"object": "event", "type": "user.created", "data": {}});

    let detection = detect(&headers, Some(&body)).unwrap();
    assert_eq!(detection.provider, "clerk");
}

#[test]
fn unbranded_svix_without_discriminators_defaults_to_recall() {
    let headers = headers_from(vec![
        ("webhook-signature", "v1,a"),
        ("webhook-id", "msg_1"),
    ]);

    let detection = detect(&headers, Some(&json!({"something": 1}))).unwrap();
    assert_eq!(detection.provider, "recall");
    assert!(detection.confidence < 0.6);
}

#[test]
fn ragie_requires_envelope_shape() {
    let headers = headers_from(vec![("x-signature", "abc")]);

    let enveloped = json!({"type": "t", "payload": {}, "nonce": "n"});
    assert_eq!(detect(&headers, Some(&enveloped)).unwrap().provider, "ragie");

    let flat = json!({"type": "t"});
    assert!(detect(&headers, Some(&flat)).is_none());
}

#[test]
fn highest_confidence_wins() {
    // Both GitHub (0.95) and Linear (0.9) markers present.
    let headers = headers_from(vec![
        ("linear-signature", "a"),
        ("x-github-event", "push"),
    ]);

    let detection = detect(&headers, None).unwrap();
    assert_eq!(detection.provider, "github");
}

#[test]
fn registration_order_breaks_ties() {
    let mut detector = ProviderDetector::new();
    detector.register(|_| Some(Detection::new("first", 0.5)));
    detector.register(|_| Some(Detection::new("second", 0.5)));

    let headers = Headers::new();
    let detection = detector
        .detect(&DetectionInput {
            method: "POST",
            path: "/",
            headers: &headers,
            body: None,
        })
        .unwrap();

    assert_eq!(detection.provider, "first");
}

#[test]
fn custom_detector_extends_defaults() {
    let mut detector = ProviderDetector::with_defaults();
    detector.register(|input| {
        input
            .headers
            .contains("x-my-app-signature")
            .then(|| Detection::new("my-app", 0.99))
    });

    let headers = headers_from(vec![("x-my-app-signature", "sig")]);
    let detection = detector
        .detect(&DetectionInput {
            method: "POST",
            path: "/",
            headers: &headers,
            body: None,
        })
        .unwrap();

    assert_eq!(detection.provider, "my-app");
}
