//! Tests for signature primitives and provider schemes.

use super::*;

const SECRET: &str = "shhh";
const BODY: &[u8] = br#"{"ref":"refs/heads/main"}"#;

fn headers_from(pairs: Vec<(&str, &str)>) -> Headers {
    Headers::from_pairs(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

/// Sign with a scheme and feed the produced headers back through verify.
fn round_trip(scheme: &SignatureScheme, material: &SigningMaterial) -> Headers {
    let signed = scheme
        .sign(BODY, material, SECRET)
        .expect("signing material should be complete");
    Headers::from_pairs(signed)
}

// ============================================================================
// Primitives
// ============================================================================

#[test]
fn hmac_sha256_matches_known_vector() {
    // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
    let digest = compute_hmac(
        HmacAlgorithm::Sha256,
        b"key",
        b"The quick brown fox jumps over the lazy dog",
    );

    assert_eq!(
        hex::encode(digest),
        "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn digest_lengths_per_algorithm() {
    for (algorithm, len) in [
        (HmacAlgorithm::Sha1, 20),
        (HmacAlgorithm::Sha256, 32),
        (HmacAlgorithm::Sha384, 48),
        (HmacAlgorithm::Sha512, 64),
    ] {
        assert_eq!(algorithm.digest_len(), len);
        assert_eq!(compute_hmac(algorithm, b"k", b"m").len(), len);
    }
}

#[test]
fn constant_time_eq_rejects_unequal_lengths() {
    assert!(!constant_time_eq(b"abc", b"abcd"));
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
}

#[test]
fn decode_failure_returns_none() {
    assert!(decode_signature(SignatureEncoding::Hex, "not-hex!").is_none());
    assert!(decode_signature(SignatureEncoding::Base64, "!!!").is_none());
}

#[test]
fn timestamped_pairs_parse_t_and_v1() {
    let (ts, candidates) = parse_timestamped_pairs("t=1492774577,v1=abc,v0=legacy,v1=def");

    assert_eq!(ts, Some("1492774577"));
    assert_eq!(candidates, vec!["abc", "def"]);
}

// ============================================================================
// Scheme round trips
// ============================================================================

#[test]
fn github_sign_verify_round_trip() {
    let scheme = SignatureScheme::github();
    let headers = round_trip(&scheme, &SigningMaterial::default());

    assert!(headers
        .get("x-hub-signature-256")
        .unwrap()
        .starts_with("sha256="));
    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn stripe_sign_verify_round_trip() {
    let scheme = SignatureScheme::stripe();
    let material = SigningMaterial {
        timestamp: Some("1492774577".to_string()),
        ..Default::default()
    };
    let headers = round_trip(&scheme, &material);

    let value = headers.get("stripe-signature").unwrap();
    assert!(value.starts_with("t=1492774577,v1="));
    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn shopify_sign_verify_round_trip() {
    let scheme = SignatureScheme::shopify();
    let headers = round_trip(&scheme, &SigningMaterial::default());

    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn twilio_sign_verify_round_trip() {
    let scheme = SignatureScheme::twilio();
    let url = "https://example.com/webhooks/sms";
    let material = SigningMaterial {
        url: Some(url.to_string()),
        ..Default::default()
    };
    let headers = round_trip(&scheme, &material);

    assert!(scheme.verify(BODY, &headers, SECRET, Some(url)));
    // Verifying against a different URL must fail.
    assert!(!scheme.verify(BODY, &headers, SECRET, Some("https://other.example/hook")));
    // No configured URL means the base string cannot be composed.
    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn slack_sign_verify_round_trip() {
    let scheme = SignatureScheme::slack();
    let material = SigningMaterial {
        timestamp: Some("1531420618".to_string()),
        ..Default::default()
    };
    let headers = round_trip(&scheme, &material);

    assert!(headers.get("x-slack-signature").unwrap().starts_with("v0="));
    assert_eq!(headers.get("x-slack-request-timestamp"), Some("1531420618"));
    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn svix_sign_verify_round_trip() {
    let scheme = SignatureScheme::svix();
    let material = SigningMaterial {
        timestamp: Some("1614265330".to_string()),
        id: Some("msg_2KWPBgLlAfxdpx2AI54pPJ85f4W".to_string()),
        ..Default::default()
    };
    let headers = round_trip(&scheme, &material);

    assert!(headers.get("svix-signature").unwrap().starts_with("v1,"));
    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn svix_unbranded_uses_webhook_headers() {
    let scheme = SignatureScheme::svix_unbranded();
    let material = SigningMaterial {
        timestamp: Some("1614265330".to_string()),
        id: Some("msg_1".to_string()),
        ..Default::default()
    };
    let headers = round_trip(&scheme, &material);

    assert!(headers.contains("webhook-signature"));
    assert!(headers.contains("webhook-id"));
    assert!(headers.contains("webhook-timestamp"));
    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn sendgrid_sign_verify_round_trip() {
    let scheme = SignatureScheme::sendgrid();
    let material = SigningMaterial {
        timestamp: Some("1588788000".to_string()),
        ..Default::default()
    };
    let headers = round_trip(&scheme, &material);

    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn linear_sign_verify_round_trip() {
    let scheme = SignatureScheme::linear();
    let headers = round_trip(&scheme, &SigningMaterial::default());

    assert!(scheme.verify(BODY, &headers, SECRET, None));
}

// ============================================================================
// Rejection paths
// ============================================================================

#[test]
fn flipping_a_body_byte_fails_verification() {
    let scheme = SignatureScheme::github();
    let headers = round_trip(&scheme, &SigningMaterial::default());

    let mut tampered = BODY.to_vec();
    tampered[0] ^= 0x01;
    assert!(!scheme.verify(&tampered, &headers, SECRET, None));
}

#[test]
fn flipping_a_signature_nibble_fails_verification() {
    let scheme = SignatureScheme::github();
    let signed = scheme.sign(BODY, &SigningMaterial::default(), SECRET).unwrap();
    let (name, value) = &signed[0];

    let mut chars: Vec<char> = value.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == '0' { '1' } else { '0' };
    let tampered: String = chars.into_iter().collect();

    let headers = headers_from(vec![(name, &tampered)]);
    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn wrong_secret_fails_verification() {
    let scheme = SignatureScheme::shopify();
    let headers = round_trip(&scheme, &SigningMaterial::default());

    assert!(!scheme.verify(BODY, &headers, "wrong-secret", None));
}

#[test]
fn missing_prefix_fails_verification() {
    let scheme = SignatureScheme::github();
    let digest = compute_hmac(HmacAlgorithm::Sha256, SECRET.as_bytes(), BODY);
    // Correct digest but without the required "sha256=" prefix.
    let headers = headers_from(vec![("x-hub-signature-256", &hex::encode(digest))]);

    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn wrong_length_base64_signature_fails() {
    let scheme = SignatureScheme::shopify();
    // Valid base64, but decodes to fewer bytes than a SHA-256 digest.
    let headers = headers_from(vec![("x-shopify-hmac-sha256", "c2hvcnQ=")]);

    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn undecodable_signature_fails() {
    let scheme = SignatureScheme::github();
    let headers = headers_from(vec![("x-hub-signature-256", "sha256=zzzz-not-hex")]);

    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn missing_signature_header_fails() {
    let scheme = SignatureScheme::github();
    let headers = Headers::new();

    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn missing_timestamp_material_fails() {
    let scheme = SignatureScheme::slack();
    let digest = compute_hmac(HmacAlgorithm::Sha256, SECRET.as_bytes(), BODY);
    // Signature present but no x-slack-request-timestamp header.
    let value = format!("v0={}", hex::encode(digest));
    let headers = headers_from(vec![("x-slack-signature", &value)]);

    assert!(!scheme.verify(BODY, &headers, SECRET, None));
}

#[test]
fn stripe_accepts_any_matching_v1_candidate() {
    let scheme = SignatureScheme::stripe();
    let material = SigningMaterial {
        timestamp: Some("1492774577".to_string()),
        ..Default::default()
    };
    let signed = scheme.sign(BODY, &material, SECRET).unwrap();
    let good = signed[0].1.strip_prefix("t=1492774577,v1=").unwrap().to_string();

    // A rotated-key header carries an old v1 alongside the current one.
    let compound = format!("t=1492774577,v1={},v1={}", "00".repeat(32), good);
    let headers = headers_from(vec![("stripe-signature", &compound)]);

    assert!(scheme.verify(BODY, &headers, SECRET, None));
}
