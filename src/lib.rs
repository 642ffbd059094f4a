#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some functions are inherently complex
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
// Variable naming: domain terms often similar
#![allow(clippy::similar_names)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Control flow style
#![allow(clippy::if_not_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::single_match_else)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::items_after_statements)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
// Self usage
#![allow(clippy::unused_self)]
// Option/Result patterns
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Large types
#![allow(clippy::large_enum_variant)]
#![allow(clippy::result_large_err)]
// Explicit returns
#![allow(clippy::needless_return)]
#![allow(clippy::semicolon_if_nothing_returned)]
// Iteration style
#![allow(clippy::explicit_iter_loop)]
// Closure style
#![allow(clippy::redundant_closure_for_method_calls)]
// Unit patterns
#![allow(clippy::ignored_unit_patterns)]
// Type defaults
#![allow(clippy::default_trait_access)]

//! MQTT5 RPC server policy.
//!
//! Turns an MQTT5 connection into a request/response command endpoint. A
//! caller publishes a command request to a server-owned topic; the policy
//! validates it, dispatches to application code, and publishes the reply to
//! the caller-supplied response topic with the correlation metadata
//! preserved.
//!
//! The policy is a hierarchical state machine driven by asynchronous MQTT
//! and timer events. It coordinates the subscription handshake with a
//! bounded timeout, classifies inbound publications, assembles
//! protocol-correct response publishes, and degrades to a permanent faulted
//! state on unrecoverable errors. The MQTT transport, broker client, and
//! platform timers are external collaborators reached through the
//! [`pipeline::edge::ConnectionEdge`] contract.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Policy options and defaults
//!
//! ## Pipeline
//! - `pipeline::events` - Inbound and outbound event model
//! - `pipeline::edge` - Connection boundary contract
//! - `pipeline::driver` - Tokio-backed reference pipeline
//!
//! ## Policy
//! - `rpc::hfsm` - Hierarchical state encoding
//! - `rpc::topic` - Command topic builder and wildcard matcher
//! - `rpc::properties` - MQTT5 property containers
//! - `rpc::timer` - Subscribe-timeout control
//! - `rpc::server` - The RPC server policy

pub mod core;
pub mod pipeline;
pub mod rpc;

pub use self::core::config::{RpcServerOptions, DEFAULT_SUBSCRIBE_TIMEOUT_SECS, RPC_QOS};
pub use pipeline::driver::{CommandCallback, PipelineDriver, TimerClock, TokioClock};
pub use pipeline::edge::{ConnectionEdge, ConnectionHandle, EdgeError, RecordingEdge};
pub use pipeline::events::{
    Event, ExecutionRequest, ExecutionResponse, OutboundRequest, PolicyErrorEvent,
    PublishReceived, PublishRequest, Qos, SubAck, SubscribeRequest, SubscriptionId, TimerHandle,
};
pub use rpc::hfsm::StateId;
pub use rpc::properties::{PropertyBag, UserProperties, UserProperty};
pub use rpc::server::{RpcServer, RpcServerError};
pub use rpc::topic::{topic_matches_filter, SubscriptionFilter, TopicError};
