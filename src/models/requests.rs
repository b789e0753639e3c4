//! Request DTOs for the resource cache API
//!
//! Defines the structure of incoming HTTP request data.

use crate::cache::RequestDescriptor;
use crate::error::{CacheError, Result};

/// Query parameter carrying the resource locator
pub const LOCATOR_PARAM: &str = "locator";

/// Query of `GET /resolve`
///
/// `locator` names the resource; every other pair is a variant parameter
/// (size or format hints) forwarded to the fetch and folded into the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveQuery {
    pub locator: String,
    pub params: Vec<(String, String)>,
}

impl ResolveQuery {
    /// Splits raw query pairs into locator and variant parameters.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self> {
        let mut locator = None;
        let mut params = Vec::new();
        for (name, value) in pairs {
            if name == LOCATOR_PARAM {
                if locator.replace(value).is_some() {
                    return Err(CacheError::InvalidDescriptor(
                        "locator given more than once".to_string(),
                    ));
                }
            } else {
                params.push((name, value));
            }
        }

        let locator = locator.ok_or_else(|| {
            CacheError::InvalidDescriptor("missing locator query parameter".to_string())
        })?;
        Ok(Self { locator, params })
    }

    pub fn into_descriptor(self) -> RequestDescriptor {
        RequestDescriptor::with_params(self.locator, self.params)
    }
}
