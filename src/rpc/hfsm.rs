//! Hierarchical state encoding for the policy machine.
//!
//! Three states: `Root` is the superstate, `Waiting` and `Faulted` are peer
//! substates. Events are delivered to the current substate first; an
//! [`Outcome::Superstate`] result re-delivers to the parent. The only
//! runtime transition is `Waiting` to `Faulted` on subscribe timeout.

/// States of the policy machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    /// Superstate: absorbs lifecycle noise and surfaces internal errors.
    Root,
    /// Normal operation: awaiting the subscription ack, command requests,
    /// and execution completions.
    Waiting,
    /// Terminal failure state: every event is rejected, nothing is emitted.
    Faulted,
}

impl StateId {
    /// Log label for the state.
    pub fn label(self) -> &'static str {
        match self {
            StateId::Root => "rpc_server",
            StateId::Waiting => "rpc_server/waiting",
            StateId::Faulted => "rpc_server/faulted",
        }
    }
}

/// Parent lookup: `Root` has none; both substates escalate to `Root`.
pub fn parent(state: StateId) -> Option<StateId> {
    match state {
        StateId::Root => None,
        StateId::Waiting | StateId::Faulted => Some(StateId::Root),
    }
}

/// Outcome of delivering an event to one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The state consumed the event.
    Handled,
    /// Re-deliver the event to the parent state.
    Superstate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_chain() {
        assert_eq!(parent(StateId::Waiting), Some(StateId::Root));
        assert_eq!(parent(StateId::Faulted), Some(StateId::Root));
        assert_eq!(parent(StateId::Root), None);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(StateId::Root.label(), "rpc_server");
        assert_eq!(StateId::Waiting.label(), "rpc_server/waiting");
        assert_eq!(StateId::Faulted.label(), "rpc_server/faulted");
    }
}
