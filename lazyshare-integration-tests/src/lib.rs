//! Integration tests for `lazyshare`
//!
//! This crate contains tests that drive `lazyshare` through its public API
//! only, with the `testing` feature enabled.

// This is a test-only crate
#![cfg(test)]
