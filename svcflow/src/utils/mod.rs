//! Utility functions for timestamps and generated names.

pub mod timestamps;

pub use timestamps::{generate_service_name, now_utc, unix_millis, Timestamp};

/// Prefix of generated service names.
pub const SERVICE_NAME_PREFIX: &str = "TestService";
