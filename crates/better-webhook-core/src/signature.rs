//! Webhook signature primitives.
//!
//! Implements HMAC computation over the base-string forms used by the
//! supported providers, signature encoding/decoding, and constant-time
//! comparison to prevent timing attacks.
//!
//! A [`SignatureScheme`] bundles an algorithm, a base-string form, an
//! encoding, and a wire format together with the header names the scheme
//! reads. The same scheme verifies inbound deliveries and, inversely,
//! signs outbound ones.
//!
//! # Security
//!
//! - Comparison uses the `subtle` crate and is constant-time over buffers
//!   of equal length; unequal lengths return `false` without comparing
//! - Any decoding failure verifies `false`
//! - Secrets never appear in logs or debug output

use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::headers::Headers;

// ============================================================================
// Algorithm, encoding, base string
// ============================================================================

/// HMAC hash function used by a signature scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HmacAlgorithm {
    /// Digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Wire encoding of the signature digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

/// The byte sequence actually fed into HMAC.
///
/// Providers compose the signed message differently; these are the forms
/// observed across the supported provider set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureBase {
    /// The raw body alone (GitHub, Shopify, Linear).
    Body,
    /// `{timestamp}.{body}` (Stripe).
    TimestampDotBody,
    /// `v0:{timestamp}:{body}` (Slack).
    VersionedTimestamp,
    /// `{id}.{timestamp}.{body}` (Svix, Clerk, Recall).
    IdTimestampBody,
    /// `{url}{body}` (Twilio).
    UrlBody,
    /// `{timestamp}{body}` (SendGrid).
    TimestampBody,
}

/// Wire format of the signature header value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureFormat {
    /// The encoded digest alone.
    Plain,
    /// A fixed prefix followed by the encoded digest, e.g. `sha256=` or `v1,`.
    Prefixed(String),
    /// Stripe-style `t={ts},v1={sig}` compound value. Multiple `v1` entries
    /// are accepted; any matching candidate verifies.
    TimestampedPairs,
}

// ============================================================================
// Primitives
// ============================================================================

/// Compute `HMAC-{algorithm}(secret, message)`.
pub fn compute_hmac(algorithm: HmacAlgorithm, secret: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail.
    match algorithm {
        HmacAlgorithm::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha384 => {
            let mut mac =
                Hmac::<Sha384>::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlgorithm::Sha512 => {
            let mut mac =
                Hmac::<Sha512>::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Encode a digest for the wire.
pub fn encode_signature(encoding: SignatureEncoding, digest: &[u8]) -> String {
    match encoding {
        SignatureEncoding::Hex => hex::encode(digest),
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(digest),
    }
}

/// Decode a wire signature. Returns `None` on any decoding failure.
pub fn decode_signature(encoding: SignatureEncoding, value: &str) -> Option<Vec<u8>> {
    match encoding {
        SignatureEncoding::Hex => hex::decode(value).ok(),
        SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(value)
            .ok(),
    }
}

/// Constant-time equality over byte buffers.
///
/// Length mismatch returns `false` without comparing further.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Parse a Stripe-style `t={ts},v1={sig},...` header value.
///
/// Returns the `t` component and every `v1` candidate. Unknown components
/// (e.g. `v0`) are ignored.
pub(crate) fn parse_timestamped_pairs(value: &str) -> (Option<&str>, Vec<&str>) {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in value.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => candidates.push(sig),
            _ => {}
        }
    }
    (timestamp, candidates)
}

// ============================================================================
// Signing material
// ============================================================================

/// Inputs a base string needs beyond the raw body.
///
/// On the verify side this is harvested from the request headers (and the
/// provider's configured URL for [`SignatureBase::UrlBody`]). On the sign
/// side the caller supplies or generates the values.
#[derive(Debug, Clone, Default)]
pub struct SigningMaterial {
    pub timestamp: Option<String>,
    pub id: Option<String>,
    pub url: Option<String>,
}

impl SigningMaterial {
    fn compose(&self, base: SignatureBase, raw_body: &[u8]) -> Option<Vec<u8>> {
        let mut message = Vec::new();
        match base {
            SignatureBase::Body => message.extend_from_slice(raw_body),
            SignatureBase::TimestampDotBody => {
                let ts = self.timestamp.as_deref()?;
                message.extend_from_slice(ts.as_bytes());
                message.push(b'.');
                message.extend_from_slice(raw_body);
            }
            SignatureBase::VersionedTimestamp => {
                let ts = self.timestamp.as_deref()?;
                message.extend_from_slice(b"v0:");
                message.extend_from_slice(ts.as_bytes());
                message.push(b':');
                message.extend_from_slice(raw_body);
            }
            SignatureBase::IdTimestampBody => {
                let id = self.id.as_deref()?;
                let ts = self.timestamp.as_deref()?;
                message.extend_from_slice(id.as_bytes());
                message.push(b'.');
                message.extend_from_slice(ts.as_bytes());
                message.push(b'.');
                message.extend_from_slice(raw_body);
            }
            SignatureBase::UrlBody => {
                let url = self.url.as_deref()?;
                message.extend_from_slice(url.as_bytes());
                message.extend_from_slice(raw_body);
            }
            SignatureBase::TimestampBody => {
                let ts = self.timestamp.as_deref()?;
                message.extend_from_slice(ts.as_bytes());
                message.extend_from_slice(raw_body);
            }
        }
        Some(message)
    }
}

// ============================================================================
// SignatureScheme
// ============================================================================

/// A complete provider signature convention.
///
/// Knows which headers to read, how the signed message is composed, and how
/// the digest appears on the wire.
///
/// # Examples
///
/// ```rust
/// use better_webhook_core::signature::SignatureScheme;
/// use better_webhook_core::Headers;
///
/// let scheme = SignatureScheme::github();
/// let headers = Headers::from_pairs([(
///     "x-hub-signature-256".to_string(),
///     "sha256=deadbeef".to_string(),
/// )]);
/// assert!(!scheme.verify(b"{}", &headers, "secret", None));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureScheme {
    pub algorithm: HmacAlgorithm,
    pub base: SignatureBase,
    pub encoding: SignatureEncoding,
    pub format: SignatureFormat,
    /// Header carrying the signature value.
    pub signature_header: String,
    /// Header carrying the timestamp, for bases that need one.
    pub timestamp_header: Option<String>,
    /// Header carrying the message id, for bases that need one.
    pub id_header: Option<String>,
}

impl SignatureScheme {
    /// GitHub: `sha256=<hex>` over the body.
    pub fn github() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::Body,
            encoding: SignatureEncoding::Hex,
            format: SignatureFormat::Prefixed("sha256=".to_string()),
            signature_header: "x-hub-signature-256".to_string(),
            timestamp_header: None,
            id_header: None,
        }
    }

    /// Stripe: `t=…,v1=<hex>` over `{t}.{body}`.
    pub fn stripe() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::TimestampDotBody,
            encoding: SignatureEncoding::Hex,
            format: SignatureFormat::TimestampedPairs,
            signature_header: "stripe-signature".to_string(),
            timestamp_header: None,
            id_header: None,
        }
    }

    /// Shopify: `<base64>` over the body.
    pub fn shopify() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::Body,
            encoding: SignatureEncoding::Base64,
            format: SignatureFormat::Plain,
            signature_header: "x-shopify-hmac-sha256".to_string(),
            timestamp_header: None,
            id_header: None,
        }
    }

    /// Twilio: `<base64>` over `{url}{body}` via SHA-1.
    pub fn twilio() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha1,
            base: SignatureBase::UrlBody,
            encoding: SignatureEncoding::Base64,
            format: SignatureFormat::Plain,
            signature_header: "x-twilio-signature".to_string(),
            timestamp_header: None,
            id_header: None,
        }
    }

    /// Slack: `v0=<hex>` over `v0:{ts}:{body}`.
    pub fn slack() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::VersionedTimestamp,
            encoding: SignatureEncoding::Hex,
            format: SignatureFormat::Prefixed("v0=".to_string()),
            signature_header: "x-slack-signature".to_string(),
            timestamp_header: Some("x-slack-request-timestamp".to_string()),
            id_header: None,
        }
    }

    /// Svix (also Clerk): `v1,<base64>` over `{id}.{ts}.{body}`.
    pub fn svix() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::IdTimestampBody,
            encoding: SignatureEncoding::Base64,
            format: SignatureFormat::Prefixed("v1,".to_string()),
            signature_header: "svix-signature".to_string(),
            timestamp_header: Some("svix-timestamp".to_string()),
            id_header: Some("svix-id".to_string()),
        }
    }

    /// Unbranded Svix headers (`webhook-*`), used by Recall.
    pub fn svix_unbranded() -> Self {
        Self {
            signature_header: "webhook-signature".to_string(),
            timestamp_header: Some("webhook-timestamp".to_string()),
            id_header: Some("webhook-id".to_string()),
            ..Self::svix()
        }
    }

    /// SendGrid: `<base64>` over `{ts}{body}`.
    pub fn sendgrid() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::TimestampBody,
            encoding: SignatureEncoding::Base64,
            format: SignatureFormat::Plain,
            signature_header: "x-twilio-email-event-webhook-signature".to_string(),
            timestamp_header: Some("x-twilio-email-event-webhook-timestamp".to_string()),
            id_header: None,
        }
    }

    /// Linear and generic hex-over-body schemes.
    pub fn linear() -> Self {
        Self {
            algorithm: HmacAlgorithm::Sha256,
            base: SignatureBase::Body,
            encoding: SignatureEncoding::Hex,
            format: SignatureFormat::Plain,
            signature_header: "linear-signature".to_string(),
            timestamp_header: None,
            id_header: None,
        }
    }

    /// Ragie: `<hex>` over the body in `x-signature`.
    pub fn ragie() -> Self {
        Self {
            signature_header: "x-signature".to_string(),
            ..Self::linear()
        }
    }

    /// Harvest the scheme's signing material from request headers.
    ///
    /// `url` comes from provider configuration, not the wire.
    pub fn material_from_headers(&self, headers: &Headers, url: Option<&str>) -> SigningMaterial {
        let timestamp = match &self.format {
            // Compound formats carry the timestamp inside the signature
            // value itself.
            SignatureFormat::TimestampedPairs => headers
                .get(&self.signature_header)
                .and_then(|v| parse_timestamped_pairs(v).0)
                .map(str::to_string),
            _ => self
                .timestamp_header
                .as_deref()
                .and_then(|h| headers.get(h))
                .map(str::to_string),
        };
        let id = self
            .id_header
            .as_deref()
            .and_then(|h| headers.get(h))
            .map(str::to_string);
        SigningMaterial {
            timestamp,
            id,
            url: url.map(str::to_string),
        }
    }

    /// Verify a signature against the raw body.
    ///
    /// Returns `false` on any missing header, missing base-string material,
    /// absent or mismatched prefix, or decoding failure. Never errors.
    pub fn verify(&self, raw_body: &[u8], headers: &Headers, secret: &str, url: Option<&str>) -> bool {
        let Some(header_value) = headers.get(&self.signature_header) else {
            return false;
        };

        let material = self.material_from_headers(headers, url);
        let Some(message) = material.compose(self.base, raw_body) else {
            return false;
        };
        let expected = compute_hmac(self.algorithm, secret.as_bytes(), &message);

        let candidates: Vec<&str> = match &self.format {
            SignatureFormat::Plain => vec![header_value],
            SignatureFormat::Prefixed(prefix) => match header_value.strip_prefix(prefix.as_str()) {
                Some(stripped) => vec![stripped],
                None => return false,
            },
            SignatureFormat::TimestampedPairs => parse_timestamped_pairs(header_value).1,
        };

        candidates.iter().any(|candidate| {
            decode_signature(self.encoding, candidate)
                .map(|decoded| constant_time_eq(&decoded, &expected))
                .unwrap_or(false)
        })
    }

    /// Produce the signature headers for an outbound delivery.
    ///
    /// The inverse of [`SignatureScheme::verify`]: given complete
    /// [`SigningMaterial`], returns every header the scheme sets, including
    /// timestamp and id headers when the base uses them. Returns `None`
    /// when required material is missing.
    pub fn sign(
        &self,
        raw_body: &[u8],
        material: &SigningMaterial,
        secret: &str,
    ) -> Option<Vec<(String, String)>> {
        let message = material.compose(self.base, raw_body)?;
        let digest = compute_hmac(self.algorithm, secret.as_bytes(), &message);
        let encoded = encode_signature(self.encoding, &digest);

        let value = match &self.format {
            SignatureFormat::Plain => encoded,
            SignatureFormat::Prefixed(prefix) => format!("{}{}", prefix, encoded),
            SignatureFormat::TimestampedPairs => {
                let ts = material.timestamp.as_deref()?;
                format!("t={},v1={}", ts, encoded)
            }
        };

        let mut out = vec![(self.signature_header.clone(), value)];
        if let Some(header) = &self.timestamp_header {
            if let Some(ts) = &material.timestamp {
                out.push((header.clone(), ts.clone()));
            }
        }
        if let Some(header) = &self.id_header {
            if let Some(id) = &material.id {
                out.push((header.clone(), id.clone()));
            }
        }
        Some(out)
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
