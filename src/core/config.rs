//! Policy configuration.
//!
//! Options for a single RPC server policy instance: the QoS levels used for
//! the subscribe and the response publishes, and the bound on the
//! subscription handshake.

use serde::Deserialize;
use std::time::Duration;

use crate::pipeline::events::Qos;
use crate::rpc::server::RpcServerError;

/// QoS level used by default for the RPC subscribe and response publishes.
pub const RPC_QOS: Qos = Qos::AtLeastOnce;

/// Default bound on the subscription handshake, in seconds.
pub const DEFAULT_SUBSCRIBE_TIMEOUT_SECS: u64 = 10;

fn default_qos() -> Qos {
    RPC_QOS
}

fn default_subscribe_timeout_secs() -> u64 {
    DEFAULT_SUBSCRIBE_TIMEOUT_SECS
}

/// Options for one RPC server policy instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcServerOptions {
    /// QoS requested when subscribing to the command topic.
    #[serde(default = "default_qos")]
    pub subscribe_qos: Qos,
    /// QoS used for response publishes.
    #[serde(default = "default_qos")]
    pub response_qos: Qos,
    /// Bound on the subscription handshake, in seconds. The policy faults
    /// permanently when no ack (and no matching traffic) arrives in time.
    #[serde(default = "default_subscribe_timeout_secs")]
    pub subscribe_timeout_secs: u64,
}

impl Default for RpcServerOptions {
    fn default() -> Self {
        Self {
            subscribe_qos: RPC_QOS,
            response_qos: RPC_QOS,
            subscribe_timeout_secs: DEFAULT_SUBSCRIBE_TIMEOUT_SECS,
        }
    }
}

impl RpcServerOptions {
    /// The handshake bound as a [`Duration`].
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_secs)
    }

    /// Reject option values the policy cannot run with.
    pub fn validate(&self) -> Result<(), RpcServerError> {
        if self.subscribe_timeout_secs == 0 {
            return Err(RpcServerError::InvalidArgument(
                "subscribe timeout must be nonzero",
            ));
        }
        Ok(())
    }
}
