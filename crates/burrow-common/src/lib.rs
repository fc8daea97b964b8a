//! # burrow-common
//!
//! Shared types, error definitions, bundle configuration, and constants
//! used across the entire burrow workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the foundational primitives that all other
//! crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod outcome;
pub mod types;
