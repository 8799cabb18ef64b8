//! Utility functions for common operations.
//!
//! Formatting helpers for hex strings and log-friendly ids, a wall-clock
//! timestamp helper, and serde adapters for big integers.

pub mod formatting;
pub mod helpers;
pub mod u256_decimal;

pub use formatting::{format_usd, truncate_id, with_0x_prefix, without_0x_prefix};
pub use helpers::current_timestamp;
