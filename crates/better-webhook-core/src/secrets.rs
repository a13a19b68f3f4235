//! Webhook secret handling and resolution.
//!
//! Secrets are wrapped in [`SecretString`] so they are zeroized on drop and
//! never appear in debug output. Resolution walks a fixed chain:
//! explicit per-request secret, provider-inline secret, the provider's
//! environment variable, and finally the global `WEBHOOK_SECRET` fallback.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Name of the global fallback environment variable.
pub const GLOBAL_SECRET_ENV: &str = "WEBHOOK_SECRET";

/// A webhook secret held in memory.
///
/// # Security
///
/// - The backing buffer is zeroized when the value is dropped
/// - `Debug` output is redacted
/// - Call [`SecretString::expose_secret`] only at the point of use
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the secret for immediate use.
    ///
    /// # Security Warning
    ///
    /// The returned slice contains the actual secret value. Use it
    /// immediately and avoid storing it.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretString").field(&"[REDACTED]").finish()
    }
}

/// Where a resolved secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// Supplied on the request options.
    Explicit,
    /// Configured inline on the provider.
    Provider,
    /// Read from `{PROVIDER}_WEBHOOK_SECRET`.
    ProviderEnv,
    /// Read from the global `WEBHOOK_SECRET` fallback.
    GlobalEnv,
}

/// Environment variable name for a provider's webhook secret.
///
/// The provider name is uppercased with hyphens mapped to underscores:
/// `github` becomes `GITHUB_WEBHOOK_SECRET`, `my-app` becomes
/// `MY_APP_WEBHOOK_SECRET`.
pub fn provider_secret_env(provider: &str) -> String {
    let upper: String = provider
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();
    format!("{}_WEBHOOK_SECRET", upper)
}

/// Resolve the secret for a request.
///
/// Resolution order: `explicit` (request options), `inline` (provider
/// configuration), the provider environment variable, then the global
/// `WEBHOOK_SECRET` fallback. A missing secret is not an error here; the
/// pipeline decides whether one was required.
pub fn resolve_secret(
    provider: &str,
    explicit: Option<&str>,
    inline: Option<&SecretString>,
) -> Option<(SecretString, SecretSource)> {
    if let Some(value) = explicit {
        return Some((SecretString::new(value), SecretSource::Explicit));
    }
    if let Some(value) = inline {
        return Some((value.clone(), SecretSource::Provider));
    }
    if let Ok(value) = std::env::var(provider_secret_env(provider)) {
        return Some((SecretString::new(value), SecretSource::ProviderEnv));
    }
    if let Ok(value) = std::env::var(GLOBAL_SECRET_ENV) {
        return Some((SecretString::new(value), SecretSource::GlobalEnv));
    }
    None
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
