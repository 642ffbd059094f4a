//! The RPC server policy.
//!
//! One policy serves one subscription filter on one connection. The policy
//! consumes pipeline events, up-calls the application once per valid
//! command request, and publishes the application's execution outcome to
//! the caller-supplied response topic. A subscription handshake that
//! exceeds its bound faults the policy permanently.

use std::mem;

use bytes::Bytes;
use thiserror::Error;

use crate::core::config::RpcServerOptions;
use crate::pipeline::edge::{ConnectionHandle, EdgeError};
use crate::pipeline::events::{
    Event, ExecutionRequest, ExecutionResponse, PublishReceived, PublishRequest, SubAck,
    SubscribeRequest, SubscriptionId, TimerHandle,
};
use crate::rpc::hfsm::{parent, Outcome, StateId};
use crate::rpc::properties::PropertyBag;
use crate::rpc::timer::SubscribeTimer;
use crate::rpc::topic::{SubscriptionFilter, TopicError};

const STATUS_PROPERTY: &str = "status";
const STATUS_MESSAGE_PROPERTY: &str = "statusMessage";

/// Errors returned by the policy's synchronous API and event dispatch.
#[derive(Debug, Error)]
pub enum RpcServerError {
    /// Precondition violation at the API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    Topic(#[from] TopicError),
    /// The operation requires a connection and none is bound.
    #[error("policy is not attached to a connection")]
    NotAttached,
    /// A second subscription handshake was requested while one is pending.
    #[error("a subscribe is already in flight")]
    SubscribeInFlight,
    /// An inbound request publish lacked a required MQTT5 property; the
    /// publication is dropped and the policy continues.
    #[error("required publish property missing: {0}")]
    MissingProperty(&'static str),
    /// The policy is faulted and no longer accepts events.
    #[error("policy is faulted")]
    Faulted,
    /// A collaborator behind the connection edge failed.
    #[error(transparent)]
    Edge(#[from] EdgeError),
}

/// MQTT5 RPC server policy: one subscription filter, one connection.
#[derive(Debug)]
pub struct RpcServer {
    connection: Option<ConnectionHandle>,
    subscription_topic: SubscriptionFilter,
    property_bag: PropertyBag,
    options: RpcServerOptions,
    pending_subscription_id: Option<SubscriptionId>,
    timer: SubscribeTimer,
    state: StateId,
}

impl RpcServer {
    /// Create a policy for the command endpoint
    /// `vehicles/<model_id>/commands/<client_id>/<command_name|+>`.
    ///
    /// `connection` may be `None` at construction, but [`register`] and
    /// [`execution_finish`] fail until one is bound. The property bag is
    /// reused across response publishes and must start empty. The initial
    /// substate is `Waiting`.
    ///
    /// [`register`]: RpcServer::register
    /// [`execution_finish`]: RpcServer::execution_finish
    pub fn new(
        connection: Option<ConnectionHandle>,
        property_bag: PropertyBag,
        model_id: &str,
        client_id: &str,
        command_name: &str,
        options: Option<RpcServerOptions>,
    ) -> Result<Self, RpcServerError> {
        let options = options.unwrap_or_default();
        options.validate()?;
        if !property_bag.is_empty() {
            return Err(RpcServerError::InvalidArgument(
                "property bag must start empty",
            ));
        }
        let subscription_topic = SubscriptionFilter::for_command(model_id, client_id, command_name)?;

        Ok(Self {
            connection,
            subscription_topic,
            property_bag,
            options,
            pending_subscription_id: None,
            timer: SubscribeTimer::new(),
            state: StateId::Waiting,
        })
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn is_faulted(&self) -> bool {
        self.state == StateId::Faulted
    }

    pub fn subscription_topic(&self) -> &SubscriptionFilter {
        &self.subscription_topic
    }

    pub fn pending_subscription_id(&self) -> Option<SubscriptionId> {
        self.pending_subscription_id
    }

    pub fn subscribe_timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn property_bag(&self) -> &PropertyBag {
        &self.property_bag
    }

    pub fn options(&self) -> &RpcServerOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Start the subscription handshake: arm the subscribe timer and submit
    /// the subscribe request. The transport-assigned subscription id is
    /// retained until the matching ack (or matching traffic) arrives.
    pub fn register(&mut self) -> Result<(), RpcServerError> {
        let connection = self.connection.clone().ok_or(RpcServerError::NotAttached)?;
        if self.state == StateId::Faulted {
            return Err(RpcServerError::Faulted);
        }
        if self.pending_subscription_id.is_some() {
            return Err(RpcServerError::SubscribeInFlight);
        }

        self.timer
            .start(&connection, self.options.subscribe_timeout())?;

        let request = SubscribeRequest {
            topic_filter: self.subscription_topic.as_str().to_string(),
            qos: self.options.subscribe_qos,
        };
        let id = match connection.with(|edge| edge.send_subscribe(request)) {
            Ok(id) => id,
            Err(err) => {
                // the timer only runs while a subscribe is pending
                let _ = self.timer.stop(&connection);
                return Err(err.into());
            }
        };
        self.pending_subscription_id = Some(id);
        Ok(())
    }

    /// Post a finished execution onto the pipeline. The response returns to
    /// the policy as a `CommandCompleted` event and is published from
    /// there.
    pub fn execution_finish(&mut self, response: ExecutionResponse) -> Result<(), RpcServerError> {
        let connection = self.connection.clone().ok_or(RpcServerError::NotAttached)?;
        if response.correlation_id.is_empty() {
            return Err(RpcServerError::InvalidArgument(
                "correlation id must be nonempty",
            ));
        }
        if response.response_topic.is_empty() {
            return Err(RpcServerError::InvalidArgument(
                "response topic must be nonempty",
            ));
        }
        connection.with(|edge| edge.post_response(response))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event dispatch
    // -----------------------------------------------------------------------

    /// Deliver one pipeline event.
    ///
    /// The event goes to the current substate first; unhandled events
    /// escalate through `Root`, which absorbs lifecycle noise and ignores
    /// the rest.
    pub fn handle_event(&mut self, event: Event) -> Result<(), RpcServerError> {
        let mut current = self.state;
        loop {
            tracing::trace!(
                target: "mqtt5_rpc",
                state = current.label(),
                event = event.label(),
                "dispatch"
            );
            let outcome = match current {
                StateId::Waiting => self.on_waiting(&event)?,
                StateId::Faulted => return Err(RpcServerError::Faulted),
                StateId::Root => self.on_root(&event)?,
            };
            match outcome {
                Outcome::Handled => return Ok(()),
                Outcome::Superstate => match parent(current) {
                    Some(up) => current = up,
                    None => {
                        tracing::debug!(
                            target: "mqtt5_rpc",
                            event = event.label(),
                            "event unhandled at root, ignoring"
                        );
                        return Ok(());
                    }
                },
            }
        }
    }

    fn on_root(&mut self, event: &Event) -> Result<Outcome, RpcServerError> {
        match event {
            Event::Error(error) => {
                let forwarded = self
                    .connection
                    .as_ref()
                    .ok_or(EdgeError::Closed)
                    .and_then(|connection| {
                        connection.with(|edge| edge.forward_error(error.clone()))
                    });
                if let Err(err) = forwarded {
                    panic!("rpc server failed to surface internal error: {err}");
                }
                Ok(Outcome::Handled)
            }
            Event::PubAck
            | Event::ConnectionOpenReq
            | Event::ConnectRsp
            | Event::ConnectionCloseReq
            | Event::DisconnectRsp => Ok(Outcome::Handled),
            _ => Ok(Outcome::Superstate),
        }
    }

    fn on_waiting(&mut self, event: &Event) -> Result<Outcome, RpcServerError> {
        match event {
            Event::SubAck(ack) => {
                self.on_suback(*ack);
                Ok(Outcome::Handled)
            }
            Event::Timeout(handle) => {
                self.on_timeout(*handle);
                Ok(Outcome::Handled)
            }
            Event::PublishReceived(publish) => {
                self.on_publish(publish)?;
                Ok(Outcome::Handled)
            }
            Event::CommandCompleted(response) => {
                self.on_command_completed(response)?;
                Ok(Outcome::Handled)
            }
            Event::PubAck | Event::ConnectionOpenReq | Event::ConnectRsp => Ok(Outcome::Handled),
            _ => Ok(Outcome::Superstate),
        }
    }

    // -----------------------------------------------------------------------
    // Waiting-state handlers
    // -----------------------------------------------------------------------

    fn on_suback(&mut self, ack: SubAck) {
        if self.pending_subscription_id == Some(ack.id) {
            self.clear_pending_subscription();
        }
        // unrelated acks keep the handshake pending
    }

    fn on_timeout(&mut self, handle: TimerHandle) {
        if !self.timer.matches(handle) {
            // some other policy's timer
            return;
        }
        self.clear_pending_subscription();
        tracing::warn!(
            target: "mqtt5_rpc",
            filter = self.subscription_topic.as_str(),
            "subscription handshake timed out"
        );
        // subscription timeout is not recoverable at this layer
        self.transition_peer(StateId::Waiting, StateId::Faulted);
    }

    fn on_publish(&mut self, publish: &PublishReceived) -> Result<(), RpcServerError> {
        if !self.subscription_topic.matches(&publish.topic) {
            return Ok(());
        }

        // traffic on the filter proves the subscription is live even if the
        // ack never arrived
        if self.pending_subscription_id.is_some() {
            self.clear_pending_subscription();
        }

        let request = match self.parse_request(publish) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(
                    target: "mqtt5_rpc",
                    topic = publish.topic.as_str(),
                    error = %err,
                    "dropping request publish"
                );
                return Err(err);
            }
        };

        let connection = self.connection.clone().ok_or(RpcServerError::NotAttached)?;
        connection.with(|edge| edge.execute_command(request))?;
        Ok(())
    }

    fn on_command_completed(&mut self, response: &ExecutionResponse) -> Result<(), RpcServerError> {
        if !self.subscription_topic.matches(&response.request_topic) {
            // probably meant for a sibling policy sharing the pipeline
            tracing::debug!(
                target: "mqtt5_rpc",
                topic = response.request_topic.as_str(),
                "request topic outside subscription, ignoring"
            );
            return Ok(());
        }

        let publish = self.build_response(response);
        let connection = self.connection.clone().ok_or(RpcServerError::NotAttached)?;
        connection.with(|edge| edge.send_publish(publish))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn clear_pending_subscription(&mut self) {
        if let Some(connection) = self.connection.clone() {
            let _ = self.timer.stop(&connection);
        }
        self.pending_subscription_id = None;
    }

    /// Copy the correlation metadata out of an inbound request publish.
    /// Missing properties are protocol errors; the publication is dropped.
    fn parse_request(&self, publish: &PublishReceived) -> Result<ExecutionRequest, RpcServerError> {
        let properties = &publish.properties;
        let response_topic = properties
            .response_topic
            .clone()
            .ok_or(RpcServerError::MissingProperty("response_topic"))?;
        let correlation_id = properties
            .correlation_data
            .clone()
            .ok_or(RpcServerError::MissingProperty("correlation_data"))?;
        let content_type = properties
            .content_type
            .clone()
            .ok_or(RpcServerError::MissingProperty("content_type"))?;

        Ok(ExecutionRequest {
            correlation_id,
            response_topic,
            request_topic: publish.topic.clone(),
            request_data: publish.payload.clone(),
            content_type,
        })
    }

    /// Assemble the response publish from an execution outcome.
    ///
    /// Success carries the payload and its content type; failure carries an
    /// empty payload and the statusMessage user property. Both carry the
    /// status user property and the echoed correlation data. The bag moves
    /// into the publish, leaving the policy's slot empty for reuse.
    fn build_response(&mut self, response: &ExecutionResponse) -> PublishRequest {
        debug_assert!(
            self.property_bag.is_empty(),
            "property bag reused while occupied"
        );

        let payload = if response.is_success() {
            self.property_bag.content_type = Some(response.content_type.clone());
            response.payload.clone()
        } else {
            self.property_bag
                .user_properties
                .add(STATUS_MESSAGE_PROPERTY, response.error_message.clone());
            Bytes::new()
        };

        self.property_bag
            .user_properties
            .add(STATUS_PROPERTY, response.status.to_string());
        self.property_bag.correlation_data = Some(response.correlation_id.clone());

        PublishRequest {
            topic: response.response_topic.clone(),
            payload,
            qos: self.options.response_qos,
            properties: mem::take(&mut self.property_bag),
        }
    }

    /// Peer transition: exit the old substate, then enter the new one.
    fn transition_peer(&mut self, from: StateId, to: StateId) {
        debug_assert_eq!(self.state, from);
        self.on_exit(from);
        self.state = to;
        self.on_entry(to);
    }

    fn on_entry(&mut self, state: StateId) {
        tracing::debug!(target: "mqtt5_rpc", state = state.label(), "enter");
    }

    fn on_exit(&mut self, state: StateId) {
        tracing::debug!(target: "mqtt5_rpc", state = state.label(), "exit");
        if state == StateId::Root {
            panic!("rpc server root state must never exit");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
