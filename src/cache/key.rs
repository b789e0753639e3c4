//! Key Codec Module
//!
//! Request descriptors and the SHA-256 cache key derived from them.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Version tag mixed into every key; bump to invalidate all stored keys.
const KEY_DOMAIN: &[u8] = b"resource-cache/key/v1";

// == Request Descriptor ==
/// Identity of a cacheable request: a locator plus variant parameters.
///
/// Parameter order is kept as given (it is the query order used when
/// fetching) but never affects the derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    locator: String,
    params: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            params: Vec::new(),
        }
    }

    /// Adds a variant parameter such as a size or format hint.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_params<I, K, V>(locator: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            locator: locator.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Checks the descriptor's own constraints.
    pub fn validate(&self) -> Result<()> {
        if self.locator.trim().is_empty() {
            return Err(CacheError::InvalidDescriptor(
                "locator cannot be empty".to_string(),
            ));
        }
        if self.locator.chars().any(char::is_control) {
            return Err(CacheError::InvalidDescriptor(
                "locator contains control characters".to_string(),
            ));
        }
        if self.params.iter().any(|(name, _)| name.is_empty()) {
            return Err(CacheError::InvalidDescriptor(
                "parameter name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// == Cache Key ==
/// Fixed-length digest identifying a request. Rendered as 64 hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CacheError::InvalidDescriptor(format!("invalid cache key {s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

// == Compute Key ==
/// Derives the cache key for `descriptor`.
///
/// Pure and deterministic. Parameters are sorted before hashing and every
/// field is length-prefixed, so `("ab", "c")` and `("a", "bc")` never collide.
pub fn compute_key(descriptor: &RequestDescriptor) -> Result<CacheKey> {
    descriptor.validate()?;

    let mut params: Vec<&(String, String)> = descriptor.params.iter().collect();
    params.sort();

    let mut h = Sha256::new();
    h.update(KEY_DOMAIN);
    update_field(&mut h, descriptor.locator.as_bytes());
    h.update((params.len() as u64).to_le_bytes());
    for (name, value) in params {
        update_field(&mut h, name.as_bytes());
        update_field(&mut h, value.as_bytes());
    }

    Ok(CacheKey(h.finalize().into()))
}

fn update_field(h: &mut Sha256, field: &[u8]) {
    h.update((field.len() as u64).to_le_bytes());
    h.update(field);
}
