//! Subscribe-timeout timer control.

use std::time::Duration;

use crate::pipeline::edge::{ConnectionHandle, EdgeError};
use crate::pipeline::events::TimerHandle;

/// At most one one-shot subscription timer.
///
/// Armed when a subscribe is submitted, cancelled when the matching ack (or
/// matching traffic) arrives, consumed when it fires.
#[derive(Debug, Default)]
pub struct SubscribeTimer {
    armed: Option<TimerHandle>,
}

impl SubscribeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Arm the timer through the connection edge.
    pub fn start(
        &mut self,
        connection: &ConnectionHandle,
        delay: Duration,
    ) -> Result<(), EdgeError> {
        debug_assert!(self.armed.is_none(), "subscribe timer armed twice");
        let handle = connection.with(|edge| edge.start_timer(delay))?;
        self.armed = Some(handle);
        Ok(())
    }

    /// Cancel the timer if armed.
    pub fn stop(&mut self, connection: &ConnectionHandle) -> Result<(), EdgeError> {
        if let Some(handle) = self.armed.take() {
            connection.with(|edge| edge.cancel_timer(handle))?;
        }
        Ok(())
    }

    /// True when a timeout event carries this timer's handle.
    pub fn matches(&self, handle: TimerHandle) -> bool {
        self.armed == Some(handle)
    }
}
