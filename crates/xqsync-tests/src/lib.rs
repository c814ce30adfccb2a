//! XQSync test suite
//!
//! Shared fixtures for the cross-crate integration tests under `tests/`.

#![warn(clippy::all)]

/// Fixture builders used across test files
pub mod test_utils;
