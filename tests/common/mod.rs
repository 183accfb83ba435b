//! Common test utilities for strata contract and scenario tests.
//!
//! This module provides:
//! - Fixtures: declaration bundles loaded from `tests/fixtures/*.yaml`
//! - Helpers to compile them and open a sandbox on the result

pub mod fixtures;

pub use fixtures::*;
