//! Tally CLI - operator surface
//!
//! This crate provides the `tally` binary and command orchestration.

pub mod commands;
pub mod context;

pub use context::AppContext;
