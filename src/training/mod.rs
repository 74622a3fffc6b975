//! Shared training helpers: rolling metric windows and divergence checks.

pub mod divergence;
pub mod metrics;
