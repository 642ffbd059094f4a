//! Core infrastructure for the policy.
//!
//! - `config` - Policy options and defaults

pub mod config;

pub use config::*;
