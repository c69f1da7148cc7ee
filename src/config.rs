//! Configuration for admission policies.
//!
//! Policies are named so an embedding service can route each endpoint or
//! caller class to its own limits. Policy names double as default store key
//! prefixes, which keeps differently configured throttles from ever sharing
//! counters for the same identity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// Policy for resolving counter store failures at admission time.
///
/// Failing open favors availability; failing closed favors strict
/// enforcement. The failure itself is always logged, never silently
/// swallowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat a store failure as admitted.
    #[default]
    Open,
    /// Treat a store failure as rejected.
    Closed,
}

impl FailurePolicy {
    /// Whether a caller should be admitted when the store is unreachable.
    pub fn admit_on_failure(&self) -> bool {
        matches!(self, FailurePolicy::Open)
    }
}

/// A complete admission-control configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Named leaky-bucket throttle policies.
    #[serde(default)]
    pub throttles: HashMap<String, ThrottlePolicy>,

    /// Named concurrency gate policies.
    #[serde(default)]
    pub gates: HashMap<String, GatePolicy>,

    /// How to resolve store failures during admission.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Configuration for a single throttle policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlePolicy {
    /// Maximum drop units the bucket holds.
    pub capacity: u64,

    /// Seconds for a full bucket to empty.
    pub leak_window_secs: u64,

    /// Store key prefix override; defaults to the policy name.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl ThrottlePolicy {
    /// The store key prefix for this policy.
    pub fn prefix<'a>(&'a self, name: &'a str) -> &'a str {
        self.key_prefix.as_deref().unwrap_or(name)
    }
}

/// Configuration for a single gate policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Maximum concurrently held slots.
    pub capacity: u64,

    /// Store key prefix override; defaults to the policy name.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl GatePolicy {
    /// The store key prefix for this policy.
    pub fn prefix<'a>(&'a self, name: &'a str) -> &'a str {
        self.key_prefix.as_deref().unwrap_or(name)
    }
}

impl FloodgateConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission control configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse admission config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get a throttle policy by name.
    pub fn throttle_policy(&self, name: &str) -> Option<&ThrottlePolicy> {
        self.throttles.get(name)
    }

    /// Get a gate policy by name.
    pub fn gate_policy(&self, name: &str) -> Option<&GatePolicy> {
        self.gates.get(name)
    }

    /// Reject policies whose leak math or capacity would degenerate.
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in &self.throttles {
            if policy.capacity == 0 {
                return Err(FloodgateError::Config(format!(
                    "Throttle policy '{}' has zero capacity",
                    name
                )));
            }
            if policy.leak_window_secs == 0 {
                return Err(FloodgateError::Config(format!(
                    "Throttle policy '{}' has a zero-second leak window",
                    name
                )));
            }
        }
        for (name, policy) in &self.gates {
            if policy.capacity == 0 {
                return Err(FloodgateError::Config(format!(
                    "Gate policy '{}' has zero capacity",
                    name
                )));
            }
        }
        Ok(())
    }
}
