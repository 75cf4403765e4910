//! Shared utilities.
//!
//! Hashing and filesystem helpers used across the crate, plus fake toolchains
//! for tests.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
