//! Tokio-backed reference pipeline.
//!
//! Serializes event delivery to a single policy, assigns subscription ids,
//! schedules one-shot timers that re-enter the queue as `Timeout` events,
//! loops finished executions back to the policy, and surfaces
//! subscribe/publish requests on an outbound channel for a transport to
//! consume.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::pipeline::edge::{ConnectionEdge, ConnectionHandle, EdgeError};
use crate::pipeline::events::{
    Event, ExecutionRequest, ExecutionResponse, OutboundRequest, PolicyErrorEvent, PublishRequest,
    SubscribeRequest, SubscriptionId, TimerHandle,
};
use crate::rpc::server::{RpcServer, RpcServerError};

/// Synchronous application callback invoked once per valid command request.
pub type CommandCallback = Box<dyn FnMut(ExecutionRequest) + Send>;

/// Source of timer sleeps, substitutable in tests.
///
/// The driver only ever needs one-shot sleeps for the subscribe-timeout
/// timer, so that is all the seam carries.
pub trait TimerClock: Clone + Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> tokio::time::Sleep;
}

/// Tokio-backed clock used outside tests; paused-time test runtimes drive
/// it deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TimerClock for TokioClock {
    fn sleep(&self, duration: Duration) -> tokio::time::Sleep {
        tokio::time::sleep(duration)
    }
}

#[derive(Default)]
struct TimerTable {
    next: u64,
    tasks: HashMap<u64, JoinHandle<()>>,
}

/// Connection edge backed by tokio channels and timer tasks.
struct PipelineConnection<C: TimerClock> {
    inbound: mpsc::UnboundedSender<Event>,
    outbound: mpsc::UnboundedSender<OutboundRequest>,
    callback: CommandCallback,
    timers: Arc<Mutex<TimerTable>>,
    next_subscription_id: u32,
    clock: C,
}

impl<C: TimerClock> ConnectionEdge for PipelineConnection<C> {
    fn send_subscribe(&mut self, request: SubscribeRequest) -> Result<SubscriptionId, EdgeError> {
        self.next_subscription_id += 1;
        let id = SubscriptionId::new(self.next_subscription_id)
            .ok_or_else(|| EdgeError::Rejected("subscription id space exhausted".to_string()))?;
        self.outbound
            .send(OutboundRequest::Subscribe(request))
            .map_err(|_| EdgeError::Closed)?;
        Ok(id)
    }

    fn send_publish(&mut self, request: PublishRequest) -> Result<(), EdgeError> {
        self.outbound
            .send(OutboundRequest::Publish(request))
            .map_err(|_| EdgeError::Closed)
    }

    fn start_timer(&mut self, delay: Duration) -> Result<TimerHandle, EdgeError> {
        let mut timers = self.timers.lock();
        timers.next += 1;
        let raw = timers.next;
        let handle = TimerHandle::new(raw);

        let sleep = self.clock.sleep(delay);
        let inbound = self.inbound.clone();
        let table = Arc::clone(&self.timers);
        let task = tokio::spawn(async move {
            sleep.await;
            table.lock().tasks.remove(&raw);
            let _ = inbound.send(Event::Timeout(handle));
        });
        timers.tasks.insert(raw, task);
        Ok(handle)
    }

    fn cancel_timer(&mut self, timer: TimerHandle) -> Result<(), EdgeError> {
        // a fired one-shot already removed itself; cancelling it is a no-op
        if let Some(task) = self.timers.lock().tasks.remove(&timer.value()) {
            task.abort();
        }
        Ok(())
    }

    fn execute_command(&mut self, request: ExecutionRequest) -> Result<(), EdgeError> {
        (self.callback)(request);
        Ok(())
    }

    fn post_response(&mut self, response: ExecutionResponse) -> Result<(), EdgeError> {
        self.inbound
            .send(Event::CommandCompleted(response))
            .map_err(|_| EdgeError::Closed)
    }

    fn forward_error(&mut self, error: PolicyErrorEvent) -> Result<(), EdgeError> {
        // a full connection stack would tear the session down here
        tracing::error!(
            target: "mqtt5_rpc",
            message = error.message.as_str(),
            "policy error surfaced to connection"
        );
        Ok(())
    }
}

/// One pipeline serving one policy.
///
/// Inbound events (transport traffic, timer expiries, finished executions)
/// funnel through a single queue, so the policy's handler is never
/// re-entered.
pub struct PipelineDriver {
    connection: ConnectionHandle,
    inbound: mpsc::UnboundedSender<Event>,
    outbound: Option<mpsc::UnboundedReceiver<OutboundRequest>>,
    events: mpsc::UnboundedReceiver<Event>,
}

impl PipelineDriver {
    pub fn new(callback: CommandCallback) -> Self {
        Self::with_clock(TokioClock, callback)
    }

    pub fn with_clock<C: TimerClock>(clock: C, callback: CommandCallback) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(PipelineConnection {
            inbound: inbound_tx.clone(),
            outbound: outbound_tx,
            callback,
            timers: Arc::new(Mutex::new(TimerTable::default())),
            next_subscription_id: 0,
            clock,
        });
        Self {
            connection,
            inbound: inbound_tx,
            outbound: Some(outbound_rx),
            events: inbound_rx,
        }
    }

    /// Connection handle for constructing policies on this pipeline.
    pub fn connection(&self) -> ConnectionHandle {
        self.connection.clone()
    }

    /// Sender for transport-side inbound events.
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<Event> {
        self.inbound.clone()
    }

    /// Take the outbound request stream for the transport side.
    pub fn take_outbound(&mut self) -> Option<mpsc::UnboundedReceiver<OutboundRequest>> {
        self.outbound.take()
    }

    /// Receive the next serialized inbound event (manual drive mode).
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Register the policy and drive events until `shutdown` fires or the
    /// inbound side closes. Returns the policy so callers can inspect its
    /// final state.
    pub async fn serve(
        mut self,
        mut policy: RpcServer,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<RpcServer> {
        policy
            .register()
            .context("submit subscription handshake")?;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.events.recv() => match event {
                    Some(event) => dispatch(&mut policy, event),
                    None => break,
                },
            }
        }
        Ok(policy)
    }
}

fn dispatch(policy: &mut RpcServer, event: Event) {
    if let Err(err) = policy.handle_event(event) {
        match err {
            RpcServerError::Faulted => {
                tracing::warn!(target: "mqtt5_rpc", "faulted policy dropped an event");
            }
            other => {
                tracing::warn!(target: "mqtt5_rpc", error = %other, "event dispatch failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_parts() -> (
        PipelineConnection<TokioClock>,
        mpsc::UnboundedReceiver<Event>,
        mpsc::UnboundedReceiver<OutboundRequest>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connection = PipelineConnection {
            inbound: inbound_tx,
            outbound: outbound_tx,
            callback: Box::new(|_| {}),
            timers: Arc::new(Mutex::new(TimerTable::default())),
            next_subscription_id: 0,
            clock: TokioClock,
        };
        (connection, inbound_rx, outbound_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_self_removes() {
        let (mut connection, mut inbound, _outbound) = connection_parts();
        let handle = connection.start_timer(Duration::from_secs(1)).unwrap();

        let event = inbound.recv().await.expect("timeout event");
        assert!(matches!(event, Event::Timeout(fired) if fired == handle));
        assert!(connection.timers.lock().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let (mut connection, mut inbound, _outbound) = connection_parts();
        let handle = connection.start_timer(Duration::from_secs(60)).unwrap();

        connection.cancel_timer(handle).unwrap();
        assert!(connection.timers.lock().tasks.is_empty());
        assert!(inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscription_ids_are_monotonic() {
        let (mut connection, _inbound, mut outbound) = connection_parts();
        let request = SubscribeRequest {
            topic_filter: "vehicles/m1/commands/c1/+".to_string(),
            qos: crate::pipeline::events::Qos::AtLeastOnce,
        };

        let first = connection.send_subscribe(request.clone()).unwrap();
        let second = connection.send_subscribe(request).unwrap();
        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 2);
        assert!(matches!(
            outbound.try_recv(),
            Ok(OutboundRequest::Subscribe(_))
        ));
    }
}
