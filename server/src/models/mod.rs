//! Data models for the timeline server
//!
//! These types are used for both database rows and JSON payloads.

mod types;

pub use types::*;
