//! Contract tests for strata.
//!
//! Contracts pin guarantees every compile run must keep, whatever the
//! declarations contain.
//!
//! Run with: cargo test --test contracts

mod common;

#[path = "contracts/identity.rs"]
mod identity;

#[path = "contracts/determinism.rs"]
mod determinism;

#[path = "contracts/types.rs"]
mod types;

#[path = "contracts/config.rs"]
mod config;
