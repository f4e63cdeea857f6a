#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Re-exported so downstream crates format and parse dates with the same
// `chrono` version as the key derivation.
pub use chrono;
