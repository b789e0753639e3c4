//! Fetch Fallback Module
//!
//! The network retrieval used when the disk store has no usable entry.

mod http;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::RequestDescriptor;
use crate::error::FetchError;

pub use http::HttpFetcher;

/// Retrieves the payload a descriptor identifies.
///
/// Implementations must be safe to call again for the same descriptor. No
/// retry is expected from callers; any retry policy belongs here.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Bytes, FetchError>;
}
