//! Common test harness utilities for integration tests.
//!
//! Builders for request publishes and execution outcomes, plus a helper to
//! stand up a policy attached to a recording edge.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use bytes::Bytes;
use mqtt5_rpc::{
    Event, ExecutionResponse, PropertyBag, PublishReceived, RecordingEdge, RpcServer,
    RpcServerOptions,
};

/// Stand up a policy for `vehicles/m1/commands/c1/<command_name|+>` attached
/// to a fresh recording edge.
pub fn attached_server(command_name: &str) -> (RpcServer, RecordingEdge) {
    let edge = RecordingEdge::new();
    let server = RpcServer::new(
        Some(edge.handle()),
        PropertyBag::new(),
        "m1",
        "c1",
        command_name,
        None,
    )
    .expect("init rpc server");
    (server, edge)
}

/// Same as [`attached_server`] with explicit options.
pub fn attached_server_with_options(
    command_name: &str,
    options: RpcServerOptions,
) -> (RpcServer, RecordingEdge) {
    let edge = RecordingEdge::new();
    let server = RpcServer::new(
        Some(edge.handle()),
        PropertyBag::new(),
        "m1",
        "c1",
        command_name,
        Some(options),
    )
    .expect("init rpc server");
    (server, edge)
}

/// A well-formed inbound request publish carrying all required properties.
pub fn request_publish(
    topic: &str,
    correlation: &'static [u8],
    response_topic: &str,
    payload: &'static [u8],
) -> Event {
    Event::PublishReceived(PublishReceived {
        topic: topic.to_string(),
        payload: Bytes::from_static(payload),
        properties: PropertyBag::new()
            .with_response_topic(response_topic.to_string())
            .with_correlation_data(Bytes::from_static(correlation))
            .with_content_type("application/json".to_string()),
    })
}

/// A success outcome echoing the given correlation metadata.
pub fn success_response(
    correlation: &'static [u8],
    response_topic: &str,
    request_topic: &str,
    payload: &'static [u8],
) -> ExecutionResponse {
    ExecutionResponse {
        correlation_id: Bytes::from_static(correlation),
        response_topic: response_topic.to_string(),
        request_topic: request_topic.to_string(),
        status: 200,
        content_type: "text/plain".to_string(),
        payload: Bytes::from_static(payload),
        error_message: String::new(),
    }
}

/// A failure outcome echoing the given correlation metadata.
pub fn failure_response(
    correlation: &'static [u8],
    response_topic: &str,
    request_topic: &str,
    status: i32,
    error_message: &str,
) -> ExecutionResponse {
    ExecutionResponse {
        correlation_id: Bytes::from_static(correlation),
        response_topic: response_topic.to_string(),
        request_topic: request_topic.to_string(),
        status,
        content_type: String::new(),
        payload: Bytes::new(),
        error_message: error_message.to_string(),
    }
}

/// Install a fmt subscriber honoring RUST_LOG, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
