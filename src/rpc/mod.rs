//! The RPC server policy and its supporting pieces.
//!
//! - `hfsm` - Hierarchical state encoding
//! - `topic` - Command topic builder and wildcard matcher
//! - `properties` - MQTT5 property containers
//! - `timer` - Subscribe-timeout control
//! - `server` - The policy itself

pub mod hfsm;
pub mod properties;
pub mod server;
pub mod timer;
pub mod topic;
