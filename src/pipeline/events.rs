//! Event model shared between the policy and its enclosing pipeline.
//!
//! Inbound [`Event`]s are delivered to the policy by the pipeline, one at a
//! time. Outbound [`OutboundRequest`]s are what the policy hands back for
//! the transport to carry out. The execution request/response pair crosses
//! the application boundary.

use bytes::Bytes;

use crate::rpc::properties::PropertyBag;

// ---------------------------------------------------------------------------
// Protocol Scalars
// ---------------------------------------------------------------------------

/// MQTT quality-of-service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Transport-assigned subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

impl SubscriptionId {
    /// Create a new subscription identifier.
    pub fn new(id: u32) -> Option<Self> {
        // Subscription identifiers must be 1 to 268,435,455 (variable byte integer)
        if id > 0 && id <= 268_435_455 {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Get the raw identifier value.
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Handle to a one-shot platform timer owned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Transport Payloads
// ---------------------------------------------------------------------------

/// Subscription acknowledgment from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAck {
    pub id: SubscriptionId,
}

/// An inbound publication delivered by the transport.
#[derive(Debug, Clone)]
pub struct PublishReceived {
    pub topic: String,
    pub payload: Bytes,
    pub properties: PropertyBag,
}

/// Outbound subscribe request; the transport assigns the subscription
/// identifier on submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topic_filter: String,
    pub qos: Qos,
}

/// Outbound publish request.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub properties: PropertyBag,
}

// ---------------------------------------------------------------------------
// Application Boundary
// ---------------------------------------------------------------------------

/// A command request handed to the application for execution.
///
/// Values are copied out of the inbound publish before the up-call, so the
/// application is free to retain them while it queues the work.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Opaque bytes chosen by the requester, echoed back in the response.
    pub correlation_id: Bytes,
    /// Topic the response publish must go to.
    pub response_topic: String,
    /// Concrete topic the request arrived on.
    pub request_topic: String,
    /// Request payload.
    pub request_data: Bytes,
    /// Content type of the request payload.
    pub content_type: String,
}

/// Outcome of application command execution.
///
/// `status` is HTTP-like: `200..=299` is the success path and carries
/// `payload`; any other value is the failure path and carries
/// `error_message`.
#[derive(Debug, Clone)]
pub struct ExecutionResponse {
    pub correlation_id: Bytes,
    pub response_topic: String,
    pub request_topic: String,
    pub status: i32,
    pub content_type: String,
    pub payload: Bytes,
    pub error_message: String,
}

impl ExecutionResponse {
    /// True when `status` is in the HTTP success range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Internal policy error surfaced as a pipeline event.
#[derive(Debug, Clone)]
pub struct PolicyErrorEvent {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Event Enums
// ---------------------------------------------------------------------------

/// Inbound events consumed by the policy.
#[derive(Debug, Clone)]
pub enum Event {
    /// The transport acknowledged a subscribe request.
    SubAck(SubAck),
    /// A publication arrived on the connection.
    PublishReceived(PublishReceived),
    /// The application finished executing a command.
    CommandCompleted(ExecutionResponse),
    /// A one-shot pipeline timer fired.
    Timeout(TimerHandle),
    /// An unrecoverable internal error travelling up the pipeline.
    Error(PolicyErrorEvent),
    /// Connection lifecycle noise, absorbed by the policy.
    PubAck,
    ConnectionOpenReq,
    ConnectRsp,
    ConnectionCloseReq,
    DisconnectRsp,
}

impl Event {
    pub fn label(&self) -> &'static str {
        match self {
            Event::SubAck(_) => "suback",
            Event::PublishReceived(_) => "publish_received",
            Event::CommandCompleted(_) => "command_completed",
            Event::Timeout(_) => "timeout",
            Event::Error(_) => "error",
            Event::PubAck => "puback",
            Event::ConnectionOpenReq => "connection_open_req",
            Event::ConnectRsp => "connect_rsp",
            Event::ConnectionCloseReq => "connection_close_req",
            Event::DisconnectRsp => "disconnect_rsp",
        }
    }
}

/// Outbound requests the policy emits toward the transport.
#[derive(Debug, Clone)]
pub enum OutboundRequest {
    Subscribe(SubscribeRequest),
    Publish(PublishRequest),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_range() {
        assert!(SubscriptionId::new(0).is_none()); // 0 is invalid
        assert!(SubscriptionId::new(1).is_some());
        assert!(SubscriptionId::new(268_435_455).is_some());
        assert!(SubscriptionId::new(268_435_456).is_none()); // Too large
    }

    #[test]
    fn test_execution_response_status_ranges() {
        let mut response = ExecutionResponse {
            correlation_id: Bytes::from_static(b"corr"),
            response_topic: "r/1".to_string(),
            request_topic: "vehicles/m1/commands/c1/get".to_string(),
            status: 200,
            content_type: "text/plain".to_string(),
            payload: Bytes::from_static(b"OK"),
            error_message: String::new(),
        };
        assert!(response.is_success());
        response.status = 299;
        assert!(response.is_success());
        response.status = 300;
        assert!(!response.is_success());
        response.status = 199;
        assert!(!response.is_success());
        response.status = 500;
        assert!(!response.is_success());
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(Event::PubAck.label(), "puback");
        assert_eq!(Event::Timeout(TimerHandle::new(1)).label(), "timeout");
        assert_eq!(Event::ConnectRsp.label(), "connect_rsp");
    }
}
