//! Core pipeline for receiptscan
//!
//! This crate provides the fundamental data structures and processing
//! logic for turning a receipt image into structured data: validating
//! and normalizing the incoming image, and recovering the JSON object
//! a vision model produced for it.

pub mod extract;
pub mod intake;
pub mod types;

pub use extract::{extract_json_object, truncate_raw, ExtractError};
pub use intake::{IntakeError, IntakeLimits, NormalizedImage};
pub use types::*;
