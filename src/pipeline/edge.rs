//! Boundary contract between the policy and its enclosing connection.
//!
//! The policy never talks to the broker client, platform timers, or the
//! application directly; everything goes through [`ConnectionEdge`]. The
//! pipeline serializes delivery, so implementations are only ever called
//! from one task at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use super::events::{
    ExecutionRequest, ExecutionResponse, PolicyErrorEvent, PublishRequest, SubscribeRequest,
    SubscriptionId, TimerHandle,
};

/// Failures reported by the enclosing connection or transport.
#[derive(Debug, Clone, Error)]
pub enum EdgeError {
    #[error("pipeline is closed")]
    Closed,
    #[error("transport rejected the request: {0}")]
    Rejected(String),
    #[error("unknown timer handle")]
    UnknownTimer,
}

/// Operations the policy needs from its enclosing connection.
pub trait ConnectionEdge: Send {
    /// Submit a subscribe request; returns the transport-assigned id.
    fn send_subscribe(&mut self, request: SubscribeRequest) -> Result<SubscriptionId, EdgeError>;

    /// Submit a publish request.
    fn send_publish(&mut self, request: PublishRequest) -> Result<(), EdgeError>;

    /// Arm a one-shot timer; the pipeline delivers a `Timeout` event with
    /// the returned handle on expiry.
    fn start_timer(&mut self, delay: Duration) -> Result<TimerHandle, EdgeError>;

    /// Cancel a previously armed timer. Cancelling a timer that already
    /// fired is a no-op.
    fn cancel_timer(&mut self, timer: TimerHandle) -> Result<(), EdgeError>;

    /// Synchronous application up-call for a validated command request.
    fn execute_command(&mut self, request: ExecutionRequest) -> Result<(), EdgeError>;

    /// Post a finished execution onto the pipeline; it comes back to the
    /// policy as a `CommandCompleted` event.
    fn post_response(&mut self, response: ExecutionResponse) -> Result<(), EdgeError>;

    /// Forward an unrecoverable policy error to the connection's inbound
    /// edge.
    fn forward_error(&mut self, error: PolicyErrorEvent) -> Result<(), EdgeError>;
}

/// Shared handle to the enclosing connection.
///
/// The connection outlives its policies; sibling policies on the same
/// connection hold clones of the same handle.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<Mutex<dyn ConnectionEdge>>);

impl ConnectionHandle {
    pub fn new<E>(edge: E) -> Self
    where
        E: ConnectionEdge + 'static,
    {
        Self(Arc::new(Mutex::new(edge)))
    }

    /// Run `f` against the connection edge under the handle's lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn ConnectionEdge) -> R) -> R {
        f(&mut *self.0.lock())
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Recording Edge
// ---------------------------------------------------------------------------

/// Everything a [`RecordingEdge`] observed.
#[derive(Debug, Clone, Default)]
pub struct RecordingState {
    pub subscribes: Vec<SubscribeRequest>,
    pub publishes: Vec<PublishRequest>,
    pub executed: Vec<ExecutionRequest>,
    pub posted: Vec<ExecutionResponse>,
    pub forwarded_errors: Vec<PolicyErrorEvent>,
    pub armed_timers: Vec<TimerHandle>,
    next_subscription_id: u32,
    next_timer: u64,
    fail_subscribe: bool,
    fail_publish: bool,
    fail_forward_error: bool,
}

/// Recording connection edge for tests: captures outbound traffic and
/// auto-assigns subscription ids and timer handles. Timers never fire on
/// their own; tests inject `Timeout` events with a recorded handle.
#[derive(Debug, Clone, Default)]
pub struct RecordingEdge {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingEdge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a clone of this edge in a [`ConnectionHandle`], keeping this
    /// copy for inspection.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.clone())
    }

    pub fn snapshot(&self) -> RecordingState {
        self.state.lock().clone()
    }

    pub fn subscribes(&self) -> Vec<SubscribeRequest> {
        self.state.lock().subscribes.clone()
    }

    pub fn publishes(&self) -> Vec<PublishRequest> {
        self.state.lock().publishes.clone()
    }

    pub fn executed(&self) -> Vec<ExecutionRequest> {
        self.state.lock().executed.clone()
    }

    pub fn posted(&self) -> Vec<ExecutionResponse> {
        self.state.lock().posted.clone()
    }

    pub fn forwarded_errors(&self) -> Vec<PolicyErrorEvent> {
        self.state.lock().forwarded_errors.clone()
    }

    pub fn armed_timers(&self) -> Vec<TimerHandle> {
        self.state.lock().armed_timers.clone()
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.lock().fail_subscribe = fail;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn set_fail_forward_error(&self, fail: bool) {
        self.state.lock().fail_forward_error = fail;
    }
}

impl ConnectionEdge for RecordingEdge {
    fn send_subscribe(&mut self, request: SubscribeRequest) -> Result<SubscriptionId, EdgeError> {
        let mut state = self.state.lock();
        if state.fail_subscribe {
            return Err(EdgeError::Rejected("subscribe refused".to_string()));
        }
        state.next_subscription_id += 1;
        let id = SubscriptionId::new(state.next_subscription_id)
            .ok_or_else(|| EdgeError::Rejected("subscription id space exhausted".to_string()))?;
        state.subscribes.push(request);
        Ok(id)
    }

    fn send_publish(&mut self, request: PublishRequest) -> Result<(), EdgeError> {
        let mut state = self.state.lock();
        if state.fail_publish {
            return Err(EdgeError::Rejected("publish refused".to_string()));
        }
        state.publishes.push(request);
        Ok(())
    }

    fn start_timer(&mut self, _delay: Duration) -> Result<TimerHandle, EdgeError> {
        let mut state = self.state.lock();
        state.next_timer += 1;
        let handle = TimerHandle::new(state.next_timer);
        state.armed_timers.push(handle);
        Ok(handle)
    }

    fn cancel_timer(&mut self, timer: TimerHandle) -> Result<(), EdgeError> {
        self.state.lock().armed_timers.retain(|armed| *armed != timer);
        Ok(())
    }

    fn execute_command(&mut self, request: ExecutionRequest) -> Result<(), EdgeError> {
        self.state.lock().executed.push(request);
        Ok(())
    }

    fn post_response(&mut self, response: ExecutionResponse) -> Result<(), EdgeError> {
        self.state.lock().posted.push(response);
        Ok(())
    }

    fn forward_error(&mut self, error: PolicyErrorEvent) -> Result<(), EdgeError> {
        let mut state = self.state.lock();
        if state.fail_forward_error {
            return Err(EdgeError::Closed);
        }
        state.forwarded_errors.push(error);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
