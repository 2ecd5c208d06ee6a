//! Vigil Core - Indicator model and validation for threat-intel collection
//!
//! This crate provides the foundational primitives:
//! - Normalized indicators of compromise (IoCs)
//! - Indicator kinds (IP, domain, URL, email, hash, CVE, extensions)
//! - Validators that classify and normalize raw indicator values

pub mod indicator;
pub mod validators;

pub use indicator::*;
pub use validators::*;

/// Default confidence assigned to indicators without a provider score
pub const DEFAULT_CONFIDENCE: u8 = 50;

/// Minimum confidence score
pub const MIN_CONFIDENCE: u8 = 0;

/// Maximum confidence score
pub const MAX_CONFIDENCE: u8 = 100;
