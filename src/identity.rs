//! Caller identity resolution.

use std::fmt;
use std::net::IpAddr;

/// The key under which a caller's rate and concurrency state is tracked.
///
/// An identity is an opaque fingerprint resolved by the embedding service,
/// commonly a client address or an API key. The string becomes part of the
/// shared store's key space verbatim, so it must be stable across all
/// processes enforcing the same limit. Callers that need anonymized
/// fingerprints should hash before constructing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from an opaque fingerprint.
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into())
    }

    /// Create an identity from a client address.
    pub fn from_addr(addr: IpAddr) -> Self {
        Self(format!("addr:{}", addr))
    }

    /// The raw fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
