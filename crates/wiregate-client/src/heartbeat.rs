//! Heartbeat controller
//!
//! The gateway expects a heartbeat envelope on a server-chosen interval,
//! announced in the Hello payload. The controller stays dormant until it
//! learns that interval, then ticks until shutdown, folding in on-demand
//! requests (server-sent Heartbeat opcode) and reconfigurations.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::Payload;
use crate::ratelimit::Limiter;
use crate::transport::Outbound;

/// Last sequence number seen on any Dispatch envelope
///
/// Updates are a monotonic max; an envelope arriving out of order never
/// moves the counter backwards.
#[derive(Debug)]
pub struct SequenceTracker {
    last: Mutex<i64>,
}

impl SequenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Mutex::new(-1),
        }
    }

    pub fn update(&self, seq: i64) {
        let mut last = self.last.lock();
        if seq > *last {
            *last = seq;
        }
    }

    /// The stored sequence, `None` before the first update
    #[must_use]
    pub fn last(&self) -> Option<i64> {
        let last = *self.last.lock();
        (last >= 0).then_some(last)
    }

    /// The stored sequence, 0 before the first update (heartbeat form)
    #[must_use]
    pub fn last_or_zero(&self) -> i64 {
        (*self.last.lock()).max(0)
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller lifecycle, observable through a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// No interval received yet; nothing ticks
    Uninitialized,
    /// Ticking on the announced interval
    Running,
    /// Loop exited; does not restart
    Stopped,
}

/// Requests from the dispatcher to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatCommand {
    /// Replace the tick interval (Hello, or a mid-session change)
    Reconfigure(Duration),
    /// Emit one heartbeat immediately (server-requested)
    SendNow,
}

/// Periodic heartbeat emitter
pub struct Heartbeater {
    commands: mpsc::Receiver<HeartbeatCommand>,
    sequence: Arc<SequenceTracker>,
    limiter: Arc<Limiter>,
    outbound: Outbound,
    state: watch::Sender<HeartbeatState>,
}

impl Heartbeater {
    pub fn new(
        commands: mpsc::Receiver<HeartbeatCommand>,
        sequence: Arc<SequenceTracker>,
        limiter: Arc<Limiter>,
        outbound: Outbound,
    ) -> (Self, watch::Receiver<HeartbeatState>) {
        let (state, state_rx) = watch::channel(HeartbeatState::Uninitialized);
        (
            Self {
                commands,
                sequence,
                limiter,
                outbound,
                state,
            },
            state_rx,
        )
    }

    /// Run until shutdown or until the command channel closes
    pub async fn run(mut self, shutdown: CancellationToken) {
        // Dormant until the first interval arrives. Cancellation here
        // means the connection never completed its handshake.
        let period = loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    self.enter(HeartbeatState::Stopped);
                    return;
                }
                command = self.commands.recv() => match command {
                    Some(HeartbeatCommand::Reconfigure(period)) => break period,
                    Some(HeartbeatCommand::SendNow) => self.beat(&shutdown).await,
                    None => {
                        self.enter(HeartbeatState::Stopped);
                        return;
                    }
                }
            }
        };

        let mut ticker = Self::ticker(period);
        self.enter(HeartbeatState::Running);
        debug!(period_ms = period.as_millis() as u64, "heartbeat running");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.beat(&shutdown).await,
                command = self.commands.recv() => match command {
                    Some(HeartbeatCommand::Reconfigure(period)) => {
                        debug!(period_ms = period.as_millis() as u64, "heartbeat reconfigured");
                        ticker = Self::ticker(period);
                    }
                    Some(HeartbeatCommand::SendNow) => self.beat(&shutdown).await,
                    None => break,
                }
            }
        }

        self.enter(HeartbeatState::Stopped);
    }

    fn enter(&self, state: HeartbeatState) {
        let _ = self.state.send(state);
    }

    // First tick lands one full period out; interval() would tick
    // immediately and double-send right after Hello.
    fn ticker(period: Duration) -> Interval {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn beat(&self, shutdown: &CancellationToken) {
        if self.limiter.wait(shutdown).await.is_err() {
            return;
        }

        let seq = self.sequence.last_or_zero();
        match Payload::heartbeat(seq as i32).to_bytes() {
            Ok(frame) => {
                if self.outbound.send_binary(frame).await.is_err() {
                    warn!("outbound queue closed, heartbeat dropped");
                } else {
                    trace!(seq, "heartbeat sent");
                }
            }
            Err(error) => warn!(%error, "heartbeat encoding failed"),
        }
    }
}
