//! Policy-driven admission control facade.
//!
//! Resolves named policies from configuration and builds throttle and gate
//! instances against a shared store. Configuration can be swapped at
//! runtime, so an embedding service can hot-reload limits without touching
//! its handler state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use super::gate::Gate;
use super::throttle::Throttle;
use crate::clock::{Clock, SystemClock};
use crate::config::FloodgateConfig;
use crate::error::{FloodgateError, Result};
use crate::identity::Identity;
use crate::store::CounterStore;

/// Admission control over a set of named policies.
pub struct AdmissionControl {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    config: RwLock<FloodgateConfig>,
}

impl AdmissionControl {
    /// Create a facade with an empty configuration and the system clock.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_config(store, FloodgateConfig::new())
    }

    /// Create a facade with the given configuration and the system clock.
    pub fn with_config(store: Arc<dyn CounterStore>, config: FloodgateConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create a facade with an explicit clock. Primarily useful for tests.
    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        config: FloodgateConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config: RwLock::new(config),
        }
    }

    /// Replace the active configuration.
    pub fn set_config(&self, config: FloodgateConfig) {
        debug!(
            throttles = config.throttles.len(),
            gates = config.gates.len(),
            "Swapping admission control configuration"
        );
        let mut cfg = self.config.write();
        *cfg = config;
    }

    /// Get a clone of the active configuration.
    pub fn config(&self) -> FloodgateConfig {
        self.config.read().clone()
    }

    /// Build a throttle for a named policy and identity.
    pub fn throttle(&self, policy: &str, identity: &Identity) -> Result<Throttle> {
        let config = self.config.read();
        let rule = config.throttle_policy(policy).ok_or_else(|| {
            FloodgateError::Config(format!("Unknown throttle policy: {}", policy))
        })?;

        Ok(Throttle::with_prefix(
            self.store.clone(),
            self.clock.clone(),
            identity.clone(),
            rule.capacity,
            Duration::from_secs(rule.leak_window_secs),
            rule.prefix(policy),
        ))
    }

    /// Build a gate for a named policy and identity.
    pub fn gate(&self, policy: &str, identity: &Identity) -> Result<Gate> {
        let config = self.config.read();
        let rule = config
            .gate_policy(policy)
            .ok_or_else(|| FloodgateError::Config(format!("Unknown gate policy: {}", policy)))?;

        Ok(Gate::with_prefix(
            self.store.clone(),
            identity.clone(),
            rule.capacity,
            rule.prefix(policy),
        ))
    }

    /// Throttle decision with store failures resolved by the configured
    /// failure policy.
    ///
    /// Unknown policy names still surface as configuration errors; only
    /// store round-trip failures are subject to fail-open/fail-closed.
    pub async fn admit(&self, policy: &str, identity: &Identity, drops: u32) -> Result<bool> {
        let throttle = self.throttle(policy, identity)?;
        let failure_policy = self.config.read().failure_policy;
        Ok(throttle.try_admit_or(drops, failure_policy).await)
    }

    /// Gate acquisition with store failures resolved by the configured
    /// failure policy.
    pub async fn acquire(&self, policy: &str, identity: &Identity, requests: u32) -> Result<bool> {
        let gate = self.gate(policy, identity)?;
        let failure_policy = self.config.read().failure_policy;
        Ok(gate.acquire_or(requests, failure_policy).await)
    }

    /// Release slots previously acquired through [`acquire`](Self::acquire).
    pub async fn release(&self, policy: &str, identity: &Identity, requests: u32) -> Result<()> {
        self.gate(policy, identity)?.release(requests).await
    }
}
