//! Request and Response models for the resource cache API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! parsing requests and serializing HTTP response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ResolveQuery, LOCATOR_PARAM};
pub use responses::{ClearResponse, ErrorResponse, HealthResponse, RemoveResponse, StatsResponse};
