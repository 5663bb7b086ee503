//! Utility functions for short path derivation and URL validation.
//!
//! - [`short_path`] - Deterministic short path generation and syntax checks
//! - [`target_url`] - Target URL validation

pub mod short_path;
pub mod target_url;
