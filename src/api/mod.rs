//! API Module
//!
//! Thin HTTP front door over the request coordinator.
//!
//! # Endpoints
//! - `GET /resolve?locator=...` - Resolve a resource through the cache
//! - `GET /fetch?locator=...` - Fetch straight from the network, uncached
//! - `DELETE /entries/:key` - Remove one stored entry
//! - `DELETE /entries` - Clear the store
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
