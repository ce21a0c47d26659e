//! Write faults for the in-memory document store.
//!
//! A real backend is slow and sometimes says no. The in-memory store can
//! imitate that so the optimistic paths get exercised outside of unit
//! tests: each write may be delayed by a random latency, rejected, or
//! reported as timed out.
//!
//! Randomness comes from an injected [`RngProvider`]. A seeded provider
//! gives every write its own generator, keyed by the write's collection,
//! document and kind, so a seeded run fails the same writes no matter how
//! the runtime schedules them.

use std::hash::{Hash, Hasher};
use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip::SipHasher24;

use super::store::StoreError;
use crate::config::{ConfigError, env_lookup, parse_var};

const DEFAULT_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Fault Configuration
// =============================================================================

/// How unreliable store writes should be.
///
/// The default injects nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct FailInjectionConfig {
    /// Chance that a write is rejected with [`StoreError::InjectedFailure`].
    pub failure_rate: f64,
    /// Chance that a write is reported as [`StoreError::Timeout`].
    pub timeout_rate: f64,
    /// Milliseconds carried by simulated timeouts.
    pub timeout_ms: u64,
    /// Latency added before each write, drawn uniformly from this range.
    pub latency_ms: RangeInclusive<u64>,
}

impl Default for FailInjectionConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            timeout_rate: 0.0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            latency_ms: 0..=0,
        }
    }
}

impl FailInjectionConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`FailInjectionConfig::from_lookup`].
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, &env_lookup)
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Keys, each optional:
    ///
    /// - `{prefix}_FAILURE_RATE`, `{prefix}_TIMEOUT_RATE`: probabilities
    /// - `{prefix}_TIMEOUT_MS`: reported timeout
    /// - `{prefix}_LATENCY_MIN_MS`, `{prefix}_LATENCY_MAX_MS`: latency bounds
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable values or an invalid combination.
    pub fn from_lookup<L>(prefix: &str, lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let key = |suffix: &str| format!("{prefix}_{suffix}");
        let latency_min = parse_var(lookup, &key("LATENCY_MIN_MS"), 0_u64)?;
        let latency_max = parse_var(lookup, &key("LATENCY_MAX_MS"), latency_min)?;
        Self::default()
            .with_failure_rate(parse_var(lookup, &key("FAILURE_RATE"), 0.0)?)
            .with_timeouts(
                parse_var(lookup, &key("TIMEOUT_RATE"), 0.0)?,
                parse_var(lookup, &key("TIMEOUT_MS"), DEFAULT_TIMEOUT_MS)?,
            )
            .with_latency(latency_min..=latency_max)
            .validated()
    }

    /// Sets the rejection probability.
    #[must_use]
    pub const fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    /// Sets the timeout probability and the reported timeout.
    #[must_use]
    pub const fn with_timeouts(mut self, timeout_rate: f64, timeout_ms: u64) -> Self {
        self.timeout_rate = timeout_rate;
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the latency range.
    #[must_use]
    pub fn with_latency(mut self, latency_ms: RangeInclusive<u64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Returns `self` if [`FailInjectionConfig::validate`] accepts it.
    ///
    /// # Errors
    ///
    /// See [`FailInjectionConfig::validate`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map(|()| self)
    }

    /// Checks that both rates are probabilities and the latency range is
    /// not inverted.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probability = 0.0..=1.0;
        if !probability.contains(&self.failure_rate) {
            return Err(ConfigError::InvalidFailureRate(self.failure_rate));
        }
        if !probability.contains(&self.timeout_rate) {
            return Err(ConfigError::InvalidTimeoutRate(self.timeout_rate));
        }
        if self.latency_ms.is_empty() {
            return Err(ConfigError::InvalidLatencyRange {
                min: *self.latency_ms.start(),
                max: *self.latency_ms.end(),
            });
        }
        Ok(())
    }

    /// Returns `true` if any fault can occur.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.failure_rate > 0.0 || self.timeout_rate > 0.0 || *self.latency_ms.end() > 0
    }
}

// =============================================================================
// Randomness
// =============================================================================

/// Hands out one generator per store write.
#[derive(Debug, Clone, Copy, Default)]
pub struct RngProvider {
    seed: Option<u64>,
}

impl RngProvider {
    /// Generators seeded from the operating system.
    #[must_use]
    pub const fn new_random() -> Self {
        Self { seed: None }
    }

    /// Reproducible generators derived from `seed`.
    #[must_use]
    pub const fn new_seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    /// Returns the generator for one write.
    #[must_use]
    pub fn for_operation(&self, collection: &str, document: &str, operation: &str) -> ScopedRng {
        let Some(seed) = self.seed else {
            return ScopedRng(StdRng::from_os_rng());
        };
        let mut hasher = SipHasher24::new_with_keys(seed, 0);
        (collection, document, operation).hash(&mut hasher);
        ScopedRng(StdRng::seed_from_u64(hasher.finish()))
    }
}

/// The generator for a single write.
pub struct ScopedRng(StdRng);

impl ScopedRng {
    /// Returns `true` with probability `rate`.
    pub fn roll(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.0.random::<f64>() < rate
    }

    /// Draws a latency from `range`.
    pub fn latency(&mut self, range: &RangeInclusive<u64>) -> Duration {
        let millis = if range.start() == range.end() {
            *range.start()
        } else {
            self.0.random_range(range.clone())
        };
        Duration::from_millis(millis)
    }
}

// =============================================================================
// Injection
// =============================================================================

/// Waits out the injected latency, then decides whether the write fails.
///
/// # Errors
///
/// Returns [`StoreError::InjectedFailure`] or [`StoreError::Timeout`] when
/// the write is chosen to fail.
pub async fn apply_injection(
    config: &FailInjectionConfig,
    rng: &mut ScopedRng,
) -> Result<(), StoreError> {
    let latency = rng.latency(&config.latency_ms);
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    if rng.roll(config.failure_rate) {
        return Err(StoreError::InjectedFailure("write rejected".to_string()));
    }
    if rng.roll(config.timeout_rate) {
        return Err(StoreError::Timeout(config.timeout_ms));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn lookup_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[rstest]
    fn test_default_injects_nothing() {
        let config = FailInjectionConfig::default();
        assert!(!config.is_enabled());
        assert_eq!(config.validate(), Ok(()));
    }

    #[rstest]
    fn test_lookup_reads_prefixed_keys() {
        let config = FailInjectionConfig::from_lookup(
            "STORE",
            &lookup_from(&[
                ("STORE_FAILURE_RATE", "0.1"),
                ("STORE_LATENCY_MIN_MS", "5"),
                ("STORE_LATENCY_MAX_MS", "20"),
            ]),
        )
        .unwrap();
        assert!((config.failure_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.latency_ms, 5..=20);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[rstest]
    fn test_lone_latency_minimum_is_a_fixed_latency() {
        let config =
            FailInjectionConfig::from_lookup("STORE", &lookup_from(&[("STORE_LATENCY_MIN_MS", "7")]))
                .unwrap();
        assert_eq!(config.latency_ms, 7..=7);
        assert!(config.is_enabled());
    }

    #[rstest]
    #[case(FailInjectionConfig::default().with_failure_rate(1.5))]
    #[case(FailInjectionConfig::default().with_failure_rate(-0.1))]
    #[case(FailInjectionConfig::default().with_timeouts(2.0, 100))]
    #[case(FailInjectionConfig::default().with_latency(10..=5))]
    fn test_invalid_configurations_are_rejected(#[case] config: FailInjectionConfig) {
        assert!(config.validated().is_err());
    }

    #[rstest]
    fn test_seeded_generators_are_reproducible() {
        let provider = RngProvider::new_seeded(42);
        let mut first = provider.for_operation("tasks", "1", "update");
        let mut second = provider.for_operation("tasks", "1", "update");
        let range = 0..=1_000_000;
        assert_eq!(first.latency(&range), second.latency(&range));
    }

    #[rstest]
    fn test_seeded_generators_differ_by_document() {
        let provider = RngProvider::new_seeded(42);
        let range = 0..=u64::MAX / 2;
        let first = provider.for_operation("tasks", "1", "update").latency(&range);
        let second = provider.for_operation("tasks", "2", "update").latency(&range);
        assert_ne!(first, second);
    }

    #[rstest]
    #[tokio::test]
    async fn test_certain_failure_rejects() {
        let config = FailInjectionConfig::default().with_failure_rate(1.0);
        let mut rng = RngProvider::new_seeded(7).for_operation("tasks", "1", "set");
        let result = apply_injection(&config, &mut rng).await;
        assert!(matches!(result, Err(StoreError::InjectedFailure(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_certain_timeout_reports_configured_duration() {
        let config = FailInjectionConfig::default().with_timeouts(1.0, 250);
        let mut rng = RngProvider::new_seeded(7).for_operation("tasks", "1", "set");
        assert_eq!(
            apply_injection(&config, &mut rng).await,
            Err(StoreError::Timeout(250))
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_the_verdict() {
        let config = FailInjectionConfig::default().with_latency(40..=40);
        let mut rng = RngProvider::new_random().for_operation("tasks", "1", "set");
        let started = tokio::time::Instant::now();
        assert_eq!(apply_injection(&config, &mut rng).await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
