//! Built-in provider catalog.
//!
//! Each constructor returns a [`ConfiguredProvider`] wired with the
//! provider's observed wire conventions: header names, signature scheme,
//! event-type location, envelope shape, and replay material. Constructors
//! panic only on programmer error (the built-in specs are valid by
//! construction and covered by tests).

use super::{
    ConfiguredProvider, EnvelopeRule, FieldSource, ProviderSpec, ReplayRule, TimestampSource,
    VerificationMode,
};
use crate::signature::SignatureScheme;

/// GitHub: event and delivery id in headers, `sha256=<hex>` signature.
pub fn github() -> ConfiguredProvider {
    ProviderSpec {
        name: "github".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::header("x-github-event")],
        delivery_id_header: Some("x-github-delivery".to_string()),
        signature: Some(SignatureScheme::github()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("x-github-delivery")),
            timestamp_source: None,
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in github spec is valid")
}

/// Stripe: event type and id in the body, compound `t=…,v1=…` signature.
pub fn stripe() -> ConfiguredProvider {
    ProviderSpec {
        name: "stripe".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("type")],
        signature: Some(SignatureScheme::stripe()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::body("id")),
            timestamp_source: Some(TimestampSource::SignaturePairs),
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in stripe spec is valid")
}

/// Shopify: topic header, base64-over-body signature.
pub fn shopify() -> ConfiguredProvider {
    ProviderSpec {
        name: "shopify".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::header("x-shopify-topic")],
        delivery_id_header: Some("x-shopify-webhook-id".to_string()),
        signature: Some(SignatureScheme::shopify()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("x-shopify-webhook-id")),
            timestamp_source: None,
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in shopify spec is valid")
}

/// Twilio: SHA-1 over `{url}{body}`.
///
/// The signed URL is receiver configuration; set it with
/// [`ConfiguredProvider::with_signed_url`] or verification cannot succeed.
pub fn twilio() -> ConfiguredProvider {
    ProviderSpec {
        name: "twilio".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("EventType")],
        delivery_id_header: Some("i-twilio-idempotency-token".to_string()),
        signature: Some(SignatureScheme::twilio()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("i-twilio-idempotency-token")),
            timestamp_source: None,
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in twilio spec is valid")
}

/// Slack: `v0=<hex>` over `v0:{ts}:{body}`, event type in the body.
pub fn slack() -> ConfiguredProvider {
    ProviderSpec {
        name: "slack".to_string(),
        verification: VerificationMode::Required,
        // Event callbacks nest the type under `event.type`; other callback
        // families (url_verification, interactive) carry a top-level `type`.
        event_type_sources: vec![FieldSource::body("event.type"), FieldSource::body("type")],
        signature: Some(SignatureScheme::slack()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::body("event_id")),
            timestamp_source: Some(TimestampSource::Header {
                name: "x-slack-request-timestamp".to_string(),
            }),
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in slack spec is valid")
}

/// Svix: `v1,<base64>` over `{id}.{ts}.{body}` with `svix-*` headers.
pub fn svix() -> ConfiguredProvider {
    ProviderSpec {
        name: "svix".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("type")],
        delivery_id_header: Some("svix-id".to_string()),
        signature: Some(SignatureScheme::svix()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("svix-id")),
            timestamp_source: Some(TimestampSource::Header {
                name: "svix-timestamp".to_string(),
            }),
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in svix spec is valid")
}

/// Clerk: Svix wire format under the `clerk` name.
pub fn clerk() -> ConfiguredProvider {
    let mut spec = svix().spec().clone();
    spec.name = "clerk".to_string();
    spec.build().expect("built-in clerk spec is valid")
}

/// Recall: Svix wire format with unbranded `webhook-*` headers; event name
/// lives under `event`.
pub fn recall() -> ConfiguredProvider {
    ProviderSpec {
        name: "recall".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("event")],
        delivery_id_header: Some("webhook-id".to_string()),
        signature: Some(SignatureScheme::svix_unbranded()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("webhook-id")),
            timestamp_source: Some(TimestampSource::Header {
                name: "webhook-timestamp".to_string(),
            }),
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in recall spec is valid")
}

/// SendGrid: base64 over `{ts}{body}` with event-webhook headers.
pub fn sendgrid() -> ConfiguredProvider {
    ProviderSpec {
        name: "sendgrid".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("event")],
        signature: Some(SignatureScheme::sendgrid()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::body("sg_event_id")),
            timestamp_source: Some(TimestampSource::Header {
                name: "x-twilio-email-event-webhook-timestamp".to_string(),
            }),
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in sendgrid spec is valid")
}

/// Linear: plain hex over the body, event type in the body.
pub fn linear() -> ConfiguredProvider {
    ProviderSpec {
        name: "linear".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("type")],
        delivery_id_header: Some("linear-delivery".to_string()),
        signature: Some(SignatureScheme::linear()),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::header("linear-delivery")),
            timestamp_source: None,
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in linear spec is valid")
}

/// Ragie: hex over the body, `{type, payload, nonce}` envelope. The
/// unwrapped payload keeps the ambient `nonce` for deduplication.
pub fn ragie() -> ConfiguredProvider {
    ProviderSpec {
        name: "ragie".to_string(),
        verification: VerificationMode::Required,
        event_type_sources: vec![FieldSource::body("type")],
        signature: Some(SignatureScheme::ragie()),
        envelope: Some(EnvelopeRule {
            payload_path: "payload".to_string(),
            merge_fields: vec!["nonce".to_string()],
        }),
        replay: Some(ReplayRule {
            key_source: Some(FieldSource::body("nonce")),
            timestamp_source: None,
        }),
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in ragie spec is valid")
}

/// Discord: event extraction only.
///
/// Discord signs with Ed25519 (`x-signature-ed25519`), which is outside
/// the HMAC scheme set, so verification is disabled here; gate Discord
/// traffic at the transport layer if authenticity matters.
pub fn discord() -> ConfiguredProvider {
    ProviderSpec {
        name: "discord".to_string(),
        verification: VerificationMode::Disabled,
        event_type_sources: vec![FieldSource::body("t"), FieldSource::body("type")],
        ..ProviderSpec::default()
    }
    .build()
    .expect("built-in discord spec is valid")
}

/// Look up a built-in provider by name.
pub fn by_name(name: &str) -> Option<ConfiguredProvider> {
    match name {
        "github" => Some(github()),
        "stripe" => Some(stripe()),
        "shopify" => Some(shopify()),
        "twilio" => Some(twilio()),
        "slack" => Some(slack()),
        "svix" => Some(svix()),
        "clerk" => Some(clerk()),
        "recall" => Some(recall()),
        "sendgrid" => Some(sendgrid()),
        "linear" => Some(linear()),
        "ragie" => Some(ragie()),
        "discord" => Some(discord()),
        _ => None,
    }
}

/// Names of every built-in provider, in catalog order.
pub fn names() -> &'static [&'static str] {
    &[
        "github", "stripe", "shopify", "twilio", "slack", "svix", "clerk", "recall", "sendgrid",
        "linear", "ragie", "discord",
    ]
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
