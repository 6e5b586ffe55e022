//! Shared utilities for designlink.
//!
//! This crate provides common utilities used across the designlink workspace:
//! - ULID-based identifier generation
//! - Logging setup with tracing
//! - RAII-based timing for operation measurement

pub mod id;
pub mod log;
pub mod timing;

pub use id::{IdPrefix, Identifier};
pub use timing::TimingGuard;
