//! Tests for the provider abstraction.

use super::*;
use serde_json::json;

fn headers_from(pairs: Vec<(&str, &str)>) -> Headers {
    Headers::from_pairs(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

fn minimal_spec(name: &str) -> ProviderSpec {
    ProviderSpec {
        name: name.to_string(),
        verification: VerificationMode::Disabled,
        ..ProviderSpec::default()
    }
}

// ============================================================================
// Spec validation
// ============================================================================

#[test]
fn empty_name_is_rejected() {
    let err = minimal_spec("").build().unwrap_err();
    assert!(matches!(err, ProviderConfigError::InvalidName { .. }));
}

#[test]
fn uppercase_name_is_rejected() {
    let err = minimal_spec("GitHub").build().unwrap_err();
    assert!(matches!(err, ProviderConfigError::InvalidName { .. }));
}

#[test]
fn required_verification_needs_a_scheme() {
    let spec = ProviderSpec {
        name: "custom".to_string(),
        verification: VerificationMode::Required,
        ..ProviderSpec::default()
    };

    let err = spec.build().unwrap_err();
    assert!(matches!(
        err,
        ProviderConfigError::MissingSignatureScheme { .. }
    ));
}

#[test]
fn empty_field_source_is_rejected() {
    let spec = ProviderSpec {
        event_type_sources: vec![FieldSource::header("")],
        ..minimal_spec("custom")
    };

    let err = spec.build().unwrap_err();
    assert!(matches!(err, ProviderConfigError::InvalidFieldSource { .. }));
}

// ============================================================================
// Field extraction
// ============================================================================

#[test]
fn header_source_extracts_case_insensitively() {
    let source = FieldSource::header("X-GitHub-Event");
    let headers = headers_from(vec![("x-github-event", "push")]);

    assert_eq!(source.extract(&headers, None), Some("push".to_string()));
}

#[test]
fn body_path_source_walks_nested_objects() {
    let source = FieldSource::body("event.type");
    let body = json!({"event": {"type": "message.created"}});

    assert_eq!(
        source.extract(&Headers::new(), Some(&body)),
        Some("message.created".to_string())
    );
}

#[test]
fn body_path_renders_numbers_as_strings() {
    let source = FieldSource::body("type");
    let body = json!({"type": 1});

    assert_eq!(source.extract(&Headers::new(), Some(&body)), Some("1".to_string()));
}

#[test]
fn body_path_returns_none_without_a_body() {
    let source = FieldSource::body("type");
    assert_eq!(source.extract(&Headers::new(), None), None);
}

#[test]
fn first_event_type_source_wins() {
    let provider = ProviderSpec {
        event_type_sources: vec![
            FieldSource::body("event.type"),
            FieldSource::body("type"),
        ],
        ..minimal_spec("multi")
    }
    .build()
    .unwrap();

    let nested = json!({"event": {"type": "inner"}, "type": "outer"});
    assert_eq!(
        provider.event_type(&Headers::new(), Some(&nested)),
        Some("inner".to_string())
    );

    let flat = json!({"type": "outer"});
    assert_eq!(
        provider.event_type(&Headers::new(), Some(&flat)),
        Some("outer".to_string())
    );
}

// ============================================================================
// Envelope unwrap
// ============================================================================

#[test]
fn envelope_unwraps_payload_and_merges_ambient_fields() {
    let rule = EnvelopeRule {
        payload_path: "payload".to_string(),
        merge_fields: vec!["nonce".to_string()],
    };
    let body = json!({
        "type": "document.ready",
        "nonce": "n-1",
        "payload": {"document_id": "doc-1"}
    });

    let unwrapped = rule.unwrap(&body).unwrap();
    assert_eq!(unwrapped["document_id"], "doc-1");
    assert_eq!(unwrapped["nonce"], "n-1");
}

#[test]
fn envelope_does_not_overwrite_existing_payload_fields() {
    let rule = EnvelopeRule {
        payload_path: "payload".to_string(),
        merge_fields: vec!["nonce".to_string()],
    };
    let body = json!({
        "nonce": "outer",
        "payload": {"nonce": "inner"}
    });

    let unwrapped = rule.unwrap(&body).unwrap();
    assert_eq!(unwrapped["nonce"], "inner");
}

#[test]
fn envelope_missing_payload_returns_none() {
    let rule = EnvelopeRule {
        payload_path: "payload".to_string(),
        merge_fields: vec![],
    };

    assert!(rule.unwrap(&json!({"type": "x"})).is_none());
}

// ============================================================================
// Verification and replay context
// ============================================================================

#[tokio::test]
async fn disabled_verification_always_passes() {
    let provider = minimal_spec("open").build().unwrap();

    assert!(provider.verify(b"{}", &Headers::new(), "ignored").await);
}

#[tokio::test]
async fn required_verification_delegates_to_scheme() {
    let provider = ProviderSpec {
        name: "signed".to_string(),
        verification: VerificationMode::Required,
        signature: Some(crate::signature::SignatureScheme::linear()),
        ..ProviderSpec::default()
    }
    .build()
    .unwrap();

    let body = br#"{"type":"Issue"}"#;
    let digest = crate::signature::compute_hmac(
        crate::signature::HmacAlgorithm::Sha256,
        b"secret",
        body,
    );
    let headers = headers_from(vec![("linear-signature", &hex::encode(digest))]);

    assert!(provider.verify(body, &headers, "secret").await);
    assert!(!provider.verify(body, &headers, "other").await);
}

#[test]
fn replay_context_collects_key_and_timestamp() {
    let provider = ProviderSpec {
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("x-delivery")),
            timestamp_source: Some(TimestampSource::Header {
                name: "x-timestamp".to_string(),
            }),
        }),
        ..minimal_spec("ctx")
    }
    .build()
    .unwrap();

    let headers = headers_from(vec![("x-delivery", "d-42"), ("x-timestamp", "1700000000")]);
    let hints = provider.replay_context(&headers, None).unwrap();

    assert_eq!(hints.replay_key.as_deref(), Some("d-42"));
    assert_eq!(hints.timestamp, Some(1_700_000_000));
}

#[test]
fn replay_context_none_when_no_material_present() {
    let provider = ProviderSpec {
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("x-delivery")),
            timestamp_source: None,
        }),
        ..minimal_spec("ctx")
    }
    .build()
    .unwrap();

    assert!(provider.replay_context(&Headers::new(), None).is_none());
}

#[test]
fn unparsable_timestamp_is_dropped() {
    let provider = ProviderSpec {
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("x-delivery")),
            timestamp_source: Some(TimestampSource::Header {
                name: "x-timestamp".to_string(),
            }),
        }),
        ..minimal_spec("ctx")
    }
    .build()
    .unwrap();

    let headers = headers_from(vec![("x-delivery", "d-1"), ("x-timestamp", "not-a-number")]);
    let hints = provider.replay_context(&headers, None).unwrap();

    assert_eq!(hints.replay_key.as_deref(), Some("d-1"));
    assert_eq!(hints.timestamp, None);
}
