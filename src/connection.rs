//! The bounded-retry connect sequence.

use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::convention::Naming;

/// Retry budget for confirming a requested connection.
///
/// The remote stack may take several seconds to complete link establishment,
/// so an accepted connect action is followed by polling the device's live
/// `Connected` property: up to `attempts` reads, sleeping `interval` before
/// each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of confirmation reads.
    pub attempts: u32,
    /// Sleep before each read.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            attempts: 6,
            interval: Duration::from_millis(500),
        }
    }
}

/// Observable states of the connect sequence.
///
/// `Idle → ConnectRequested → Polling(1..) → Connected | Failed`. A `Failed`
/// terminal state only means the connection was not confirmed within the
/// budget; the remote side may still connect later, which a registry refresh
/// would pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connect in progress.
    Idle,
    /// The connect action has been issued.
    ConnectRequested,
    /// Waiting for confirmation, on the given attempt.
    Polling(u32),
    /// The device confirmed the connection.
    Connected,
    /// The action was rejected or the polling budget ran out.
    Failed,
}

/// Drives one connect sequence to a terminal state.
pub fn establish(
    bus: &mut dyn Bus,
    naming: &Naming,
    device_path: &str,
    policy: &PollPolicy,
    clock: &mut dyn Clock,
) -> ConnectionState {
    debug!(path = device_path, "requesting connection");
    if bus
        .call(&naming.service, device_path, &naming.device_interface, "Connect", &[])
        .is_none()
    {
        warn!(path = device_path, "connect action rejected");
        return ConnectionState::Failed;
    }
    for attempt in 1..=policy.attempts {
        let state = ConnectionState::Polling(attempt);
        clock.sleep(policy.interval);
        if bus.get_bool_property(&naming.service, device_path, &naming.device_interface, "Connected") {
            debug!(path = device_path, ?state, "connection confirmed");
            return ConnectionState::Connected;
        }
    }
    warn!(
        path = device_path,
        attempts = policy.attempts,
        "connection not confirmed within polling budget"
    );
    ConnectionState::Failed
}
