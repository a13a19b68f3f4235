//! Replay protection: idempotency key reservation.
//!
//! A [`ReplayStore`] provides three atomic operations over idempotency
//! keys: `reserve`, `commit`, and `release`. The pipeline reserves a key
//! before running handlers, commits it on success (200/204), and releases
//! it on any other terminal status, guaranteeing at-most-once handler
//! execution per key within the TTL window.
//!
//! [`MemoryReplayStore`] is the in-process reference implementation. It is
//! shared across concurrent requests; a mutex scoped to each operation
//! body provides the required atomicity.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

// ============================================================================
// Contract
// ============================================================================

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The key was free (or expired) and is now held by this caller.
    Reserved,
    /// A live entry already holds the key.
    Duplicate,
}

/// Errors from a replay store backend.
#[derive(Debug, thiserror::Error)]
pub enum ReplayStoreError {
    #[error("replay store backend failed: {message}")]
    Backend { message: String },
}

/// Atomic idempotency-key store.
///
/// All three operations must appear atomic to concurrent callers: when two
/// requests race on the same key, exactly one `reserve` returns
/// [`Reservation::Reserved`].
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Reserve `key` for `in_flight_ttl`.
    ///
    /// Returns [`Reservation::Reserved`] when no live entry exists (absent
    /// or expired), [`Reservation::Duplicate`] otherwise.
    async fn reserve(
        &self,
        key: &str,
        in_flight_ttl: Duration,
    ) -> Result<Reservation, ReplayStoreError>;

    /// Extend `key` to the full deduplication TTL after successful
    /// processing.
    async fn commit(&self, key: &str, ttl: Duration) -> Result<(), ReplayStoreError>;

    /// Remove `key`, allowing redelivery after a failed attempt.
    async fn release(&self, key: &str) -> Result<(), ReplayStoreError>;
}

// ============================================================================
// In-memory reference implementation
// ============================================================================

/// Tuning for [`MemoryReplayStore`].
#[derive(Debug, Clone)]
pub struct MemoryReplayStoreConfig {
    /// Hard cap on live entries; excess evicts soonest-to-expire.
    pub max_entries: usize,
    /// Maximum expired entries removed per opportunistic sweep.
    pub cleanup_batch_size: usize,
    /// Minimum interval between sweeps.
    pub cleanup_interval: Duration,
}

impl Default for MemoryReplayStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_batch_size: 64,
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

/// Configuration errors for replay components.
#[derive(Debug, thiserror::Error)]
pub enum ReplayConfigError {
    #[error("{parameter} must be positive")]
    NonPositive { parameter: &'static str },
}

impl MemoryReplayStoreConfig {
    fn validate(&self) -> Result<(), ReplayConfigError> {
        if self.max_entries == 0 {
            return Err(ReplayConfigError::NonPositive {
                parameter: "max_entries",
            });
        }
        if self.cleanup_batch_size == 0 {
            return Err(ReplayConfigError::NonPositive {
                parameter: "cleanup_batch_size",
            });
        }
        if self.cleanup_interval.is_zero() {
            return Err(ReplayConfigError::NonPositive {
                parameter: "cleanup_interval",
            });
        }
        Ok(())
    }
}

struct MemoryStoreInner {
    entries: HashMap<String, Instant>,
    last_sweep: Instant,
}

/// In-memory [`ReplayStore`].
///
/// Expired entries are swept opportunistically: at most
/// `cleanup_batch_size` removals per operation, no more often than
/// `cleanup_interval`. When the entry count exceeds `max_entries`, entries
/// are evicted in ascending expiry order.
pub struct MemoryReplayStore {
    config: MemoryReplayStoreConfig,
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryReplayStore {
    /// Create a store with default tuning.
    pub fn new() -> Self {
        Self::with_config(MemoryReplayStoreConfig::default())
            .expect("default replay store config is valid")
    }

    /// Create a store with explicit tuning.
    pub fn with_config(config: MemoryReplayStoreConfig) -> Result<Self, ReplayConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(MemoryStoreInner {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        })
    }

    /// Number of live (unexpired) entries. Test and diagnostics hook.
    pub async fn live_entries(&self) -> usize {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        inner.entries.values().filter(|exp| **exp > now).count()
    }

    fn sweep_expired(&self, inner: &mut MemoryStoreInner, now: Instant) {
        if now.duration_since(inner.last_sweep) < self.config.cleanup_interval {
            return;
        }
        inner.last_sweep = now;

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, exp)| **exp <= now)
            .take(self.config.cleanup_batch_size)
            .map(|(key, _)| key.clone())
            .collect();
        let removed = expired.len();
        for key in expired {
            inner.entries.remove(&key);
        }
        if removed > 0 {
            debug!(removed, "swept expired replay entries");
        }
    }

    fn enforce_capacity(&self, inner: &mut MemoryStoreInner) {
        while inner.entries.len() > self.config.max_entries {
            let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, exp)| **exp)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            inner.entries.remove(&victim);
            debug!(key = %victim, "evicted soonest-to-expire replay entry");
        }
    }
}

impl Default for MemoryReplayStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplayStore for MemoryReplayStore {
    async fn reserve(
        &self,
        key: &str,
        in_flight_ttl: Duration,
    ) -> Result<Reservation, ReplayStoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        self.sweep_expired(&mut inner, now);

        match inner.entries.get(key) {
            Some(expires_at) if *expires_at > now => Ok(Reservation::Duplicate),
            _ => {
                inner.entries.insert(key.to_string(), now + in_flight_ttl);
                self.enforce_capacity(&mut inner);
                Ok(Reservation::Reserved)
            }
        }
    }

    async fn commit(&self, key: &str, ttl: Duration) -> Result<(), ReplayStoreError> {
        let mut inner = self.inner.lock().await;
        inner.entries.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), ReplayStoreError> {
        let mut inner = self.inner.lock().await;
        inner.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// Policy
// ============================================================================

/// What to answer on a duplicate delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// 409 Conflict with a duplicate-delivery error.
    #[default]
    Conflict,
    /// 200 OK; the duplicate is acknowledged and dropped.
    Ignore,
}

/// Everything known about a delivery when deriving its replay key.
#[derive(Debug, Clone, Default)]
pub struct ReplayContext {
    pub provider: String,
    pub event_type: Option<String>,
    pub delivery_id: Option<String>,
    pub replay_key: Option<String>,
    pub timestamp: Option<i64>,
}

type KeyFn = Arc<dyn Fn(&ReplayContext) -> Option<String> + Send + Sync>;

/// Replay-protection policy: TTLs, freshness tolerance, duplicate
/// behavior, and key derivation.
#[derive(Clone)]
pub struct ReplayPolicy {
    in_flight_ttl: Duration,
    ttl: Duration,
    tolerance: Option<Duration>,
    on_duplicate: DuplicatePolicy,
    key_fn: Option<KeyFn>,
}

impl ReplayPolicy {
    /// Policy with explicit TTLs. Both must be positive.
    pub fn new(in_flight_ttl: Duration, ttl: Duration) -> Result<Self, ReplayConfigError> {
        if in_flight_ttl.is_zero() {
            return Err(ReplayConfigError::NonPositive {
                parameter: "in_flight_ttl",
            });
        }
        if ttl.is_zero() {
            return Err(ReplayConfigError::NonPositive { parameter: "ttl" });
        }
        Ok(Self {
            in_flight_ttl,
            ttl,
            tolerance: None,
            on_duplicate: DuplicatePolicy::default(),
            key_fn: None,
        })
    }

    /// Reject deliveries whose timestamp is farther than `tolerance` from
    /// the current time.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Set the duplicate-delivery answer.
    pub fn with_on_duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Override key derivation.
    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&ReplayContext) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn in_flight_ttl(&self) -> Duration {
        self.in_flight_ttl
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn tolerance(&self) -> Option<Duration> {
        self.tolerance
    }

    pub fn on_duplicate(&self) -> DuplicatePolicy {
        self.on_duplicate
    }

    /// Derive the canonical replay key for a delivery.
    ///
    /// The default strategy uses the provider's replay key, falling back to
    /// the delivery id, namespaced by provider. `None` means this delivery
    /// cannot be deduplicated and replay protection is skipped.
    pub fn key(&self, context: &ReplayContext) -> Option<String> {
        if let Some(key_fn) = &self.key_fn {
            return key_fn(context);
        }
        let raw = context
            .replay_key
            .as_deref()
            .or(context.delivery_id.as_deref())?;
        Some(format!("{}:{}", context.provider, raw))
    }
}

impl Default for ReplayPolicy {
    /// One minute in-flight, 24 hour deduplication window.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(24 * 60 * 60))
            .expect("default replay policy TTLs are positive")
    }
}

impl std::fmt::Debug for ReplayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayPolicy")
            .field("in_flight_ttl", &self.in_flight_ttl)
            .field("ttl", &self.ttl)
            .field("tolerance", &self.tolerance)
            .field("on_duplicate", &self.on_duplicate)
            .field("custom_key_fn", &self.key_fn.is_some())
            .finish()
    }
}

/// A replay store paired with its policy, as attached to a receiver.
#[derive(Clone)]
pub struct ReplayProtection {
    pub store: Arc<dyn ReplayStore>,
    pub policy: ReplayPolicy,
}

impl ReplayProtection {
    pub fn new(store: Arc<dyn ReplayStore>, policy: ReplayPolicy) -> Self {
        Self { store, policy }
    }

    /// In-memory protection with default tuning and policy.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryReplayStore::new()), ReplayPolicy::default())
    }
}

#[cfg(test)]
#[path = "replay_store_tests.rs"]
mod tests;
