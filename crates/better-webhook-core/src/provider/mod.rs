//! Provider abstraction.
//!
//! A [`Provider`] turns provider-specific wire conventions (header names,
//! signature schemes, envelope shapes, replay metadata) into the uniform
//! input the receiver pipeline works with.
//!
//! Providers are configuration-driven: a [`ProviderSpec`] describes where
//! the event type and delivery id live, which [`SignatureScheme`] applies,
//! how to unwrap an envelope, and what replay material the provider
//! carries. [`ProviderSpec::build`] validates the configuration and
//! produces a [`ConfiguredProvider`]. The built-in catalog in
//! [`catalog`](crate::provider::catalog) covers the common providers;
//! custom sources use a spec directly.

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::headers::Headers;
use crate::secrets::SecretString;
use crate::signature::SignatureScheme;

pub mod catalog;

// ============================================================================
// Core contract
// ============================================================================

/// Whether the pipeline refuses to run handlers without a valid signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Signature must verify; missing secret or bad signature is a 401.
    Required,
    /// No verification; `verify` always succeeds.
    Disabled,
}

/// Provider-specific idempotency material extracted from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayHints {
    /// Candidate idempotency key (e.g. a delivery id header).
    pub replay_key: Option<String>,
    /// Delivery timestamp in unix seconds, when the provider carries one.
    pub timestamp: Option<i64>,
}

/// Capability bundle encapsulating one webhook source's wire conventions.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifier used for env-var lookup and observation.
    fn name(&self) -> &str;

    fn verification_mode(&self) -> VerificationMode;

    /// Inline secret configured on the provider, if any.
    fn secret(&self) -> Option<&SecretString> {
        None
    }

    /// Extract the event type from headers and, for providers that embed it
    /// there, the parsed body.
    fn event_type(&self, headers: &Headers, body: Option<&Value>) -> Option<String>;

    /// Extract the provider-assigned delivery id from headers.
    fn delivery_id(&self, headers: &Headers) -> Option<String>;

    /// Verify the request signature over the raw body.
    ///
    /// Must return `true` when verification is disabled.
    async fn verify(&self, raw_body: &[u8], headers: &Headers, secret: &str) -> bool;

    /// Unwrap an envelope, returning the true payload. `None` means the
    /// body is the payload.
    fn payload(&self, _body: &Value) -> Option<Value> {
        None
    }

    /// Extract replay-protection material. `None` means the provider
    /// carries none.
    fn replay_context(&self, _headers: &Headers, _body: Option<&Value>) -> Option<ReplayHints> {
        None
    }
}

// ============================================================================
// Field sources
// ============================================================================

/// Where to read a field value from an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// A request header, case-insensitive.
    Header { name: String },
    /// A dot-separated path into the parsed JSON body. String and numeric
    /// leaf values are accepted; numbers are rendered as strings.
    BodyPath { path: String },
    /// A fixed literal, independent of request content.
    Static { value: String },
}

impl FieldSource {
    /// Convenience constructor for a header source.
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into() }
    }

    /// Convenience constructor for a body-path source.
    pub fn body(path: impl Into<String>) -> Self {
        Self::BodyPath { path: path.into() }
    }

    /// Validate this source.
    pub fn validate(&self, context: &str) -> Result<(), ProviderConfigError> {
        let empty = match self {
            Self::Header { name } => name.is_empty(),
            Self::BodyPath { path } => path.is_empty(),
            Self::Static { value } => value.is_empty(),
        };
        if empty {
            return Err(ProviderConfigError::InvalidFieldSource {
                context: context.to_string(),
                message: "source value must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Extract the value from a request.
    pub fn extract(&self, headers: &Headers, body: Option<&Value>) -> Option<String> {
        match self {
            Self::Header { name } => headers.get(name).map(str::to_string),
            Self::BodyPath { path } => body.and_then(|b| lookup_path(b, path)),
            Self::Static { value } => Some(value.clone()),
        }
    }
}

/// Resolve a dot-separated path against a JSON value.
fn lookup_path(body: &Value, path: &str) -> Option<String> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// Envelope and replay rules
// ============================================================================

/// How to unwrap an enveloped payload.
///
/// The value at `payload_path` becomes the payload; each `merge_fields`
/// entry found on the outer object is copied into the unwrapped payload
/// when that payload is an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeRule {
    pub payload_path: String,
    pub merge_fields: Vec<String>,
}

impl EnvelopeRule {
    fn unwrap(&self, body: &Value) -> Option<Value> {
        let mut inner = body.get(&self.payload_path)?.clone();
        if let Value::Object(map) = &mut inner {
            for field in &self.merge_fields {
                if let Some(ambient) = body.get(field) {
                    map.entry(field.clone()).or_insert_with(|| ambient.clone());
                }
            }
        }
        Some(inner)
    }
}

/// Where a provider's replay timestamp comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampSource {
    /// A dedicated header carrying unix seconds.
    Header { name: String },
    /// The `t=` component of the compound signature header.
    SignaturePairs,
}

/// What replay-protection material a provider carries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayRule {
    pub key_source: Option<FieldSource>,
    pub timestamp_source: Option<TimestampSource>,
}

// ============================================================================
// Errors
// ============================================================================

/// Validation errors for a [`ProviderSpec`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderConfigError {
    /// The provider name is empty or contains invalid characters.
    #[error("invalid provider name: {message}")]
    InvalidName { message: String },

    /// Required verification needs a signature scheme.
    #[error("provider '{name}': verification is required but no signature scheme is configured")]
    MissingSignatureScheme { name: String },

    /// A field source value is invalid.
    #[error("{context}: {message}")]
    InvalidFieldSource { context: String, message: String },
}

// ============================================================================
// ProviderSpec
// ============================================================================

/// Declarative description of a provider's wire conventions.
///
/// # Examples
///
/// ```rust
/// use better_webhook_core::provider::{FieldSource, ProviderSpec, VerificationMode};
/// use better_webhook_core::signature::SignatureScheme;
///
/// let provider = ProviderSpec {
///     name: "my-app".to_string(),
///     verification: VerificationMode::Required,
///     event_type_sources: vec![FieldSource::header("x-my-app-event")],
///     delivery_id_header: Some("x-my-app-delivery".to_string()),
///     signature: Some(SignatureScheme::linear()),
///     ..ProviderSpec::default()
/// }
/// .build()
/// .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProviderSpec {
    /// URL-safe identifier (`[a-z0-9\-_]+`).
    pub name: String,

    pub verification: VerificationMode,

    /// Ordered candidate sources for the event type; the first that yields
    /// a value wins.
    pub event_type_sources: Vec<FieldSource>,

    /// Header carrying the provider's delivery id.
    pub delivery_id_header: Option<String>,

    /// Signature scheme; mandatory when verification is required.
    pub signature: Option<SignatureScheme>,

    /// Public URL the provider signs over, for URL-based schemes. Known
    /// only to the receiver's configuration, never read from the wire.
    pub signed_url: Option<String>,

    /// Envelope unwrap rule, when the provider wraps its payloads.
    pub envelope: Option<EnvelopeRule>,

    /// Replay-protection material, when the provider carries any.
    pub replay: Option<ReplayRule>,

    /// Inline webhook secret.
    pub secret: Option<SecretString>,
}

impl Default for VerificationMode {
    fn default() -> Self {
        Self::Required
    }
}

impl ProviderSpec {
    /// Validate the spec and construct the provider.
    pub fn build(self) -> Result<ConfiguredProvider, ProviderConfigError> {
        self.validate()?;
        Ok(ConfiguredProvider { spec: self })
    }

    /// Validate this spec for internal consistency.
    pub fn validate(&self) -> Result<(), ProviderConfigError> {
        if self.name.is_empty() {
            return Err(ProviderConfigError::InvalidName {
                message: "name must not be empty".to_string(),
            });
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ProviderConfigError::InvalidName {
                message: format!(
                    "name '{}' contains invalid characters; \
                     use lowercase alphanumeric, hyphens, or underscores",
                    self.name
                ),
            });
        }

        if self.verification == VerificationMode::Required && self.signature.is_none() {
            return Err(ProviderConfigError::MissingSignatureScheme {
                name: self.name.clone(),
            });
        }

        for source in &self.event_type_sources {
            source.validate("event_type_sources")?;
        }
        if let Some(rule) = &self.replay {
            if let Some(source) = &rule.key_source {
                source.validate("replay.key_source")?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// ConfiguredProvider
// ============================================================================

/// A provider built from a validated [`ProviderSpec`].
#[derive(Debug, Clone)]
pub struct ConfiguredProvider {
    spec: ProviderSpec,
}

impl ConfiguredProvider {
    /// The underlying spec.
    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    /// Return a copy with an inline secret configured.
    pub fn with_secret(mut self, secret: impl Into<SecretString>) -> Self {
        self.spec.secret = Some(secret.into());
        self
    }

    /// Return a copy with the signed public URL configured (URL-based
    /// schemes only; ignored otherwise).
    pub fn with_signed_url(mut self, url: impl Into<String>) -> Self {
        self.spec.signed_url = Some(url.into());
        self
    }

    /// Return a copy with verification disabled, for local development.
    pub fn with_verification_disabled(mut self) -> Self {
        self.spec.verification = VerificationMode::Disabled;
        self
    }
}

#[async_trait]
impl Provider for ConfiguredProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn verification_mode(&self) -> VerificationMode {
        self.spec.verification
    }

    fn secret(&self) -> Option<&SecretString> {
        self.spec.secret.as_ref()
    }

    fn event_type(&self, headers: &Headers, body: Option<&Value>) -> Option<String> {
        self.spec
            .event_type_sources
            .iter()
            .find_map(|source| source.extract(headers, body))
    }

    fn delivery_id(&self, headers: &Headers) -> Option<String> {
        self.spec
            .delivery_id_header
            .as_deref()
            .and_then(|name| headers.get(name))
            .map(str::to_string)
    }

    async fn verify(&self, raw_body: &[u8], headers: &Headers, secret: &str) -> bool {
        if self.spec.verification == VerificationMode::Disabled {
            return true;
        }
        let Some(scheme) = &self.spec.signature else {
            // Unreachable after validate(); refuse rather than accept.
            return false;
        };
        let ok = scheme.verify(raw_body, headers, secret, self.spec.signed_url.as_deref());
        trace!(provider = %self.spec.name, valid = ok, "signature verification");
        ok
    }

    fn payload(&self, body: &Value) -> Option<Value> {
        self.spec.envelope.as_ref().and_then(|rule| rule.unwrap(body))
    }

    fn replay_context(&self, headers: &Headers, body: Option<&Value>) -> Option<ReplayHints> {
        let rule = self.spec.replay.as_ref()?;

        let replay_key = rule
            .key_source
            .as_ref()
            .and_then(|source| source.extract(headers, body));
        let timestamp = match &rule.timestamp_source {
            Some(TimestampSource::Header { name }) => headers.get(name),
            Some(TimestampSource::SignaturePairs) => self
                .spec
                .signature
                .as_ref()
                .and_then(|scheme| headers.get(&scheme.signature_header))
                .and_then(|value| crate::signature::parse_timestamped_pairs(value).0),
            None => None,
        }
        .and_then(|raw| raw.parse::<i64>().ok());

        if replay_key.is_none() && timestamp.is_none() {
            return None;
        }
        Some(ReplayHints {
            replay_key,
            timestamp,
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
