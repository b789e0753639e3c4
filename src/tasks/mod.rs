//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Store maintenance: drops expired entries and flushes the index

mod cleanup;

pub use cleanup::{run_maintenance, spawn_cleanup_task};
