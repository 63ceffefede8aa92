//! Manual / autonomous arbitration.
//!
//! The override trigger is a depth-1 queue. Any number of clones of [`OverrideTrigger`]
//! can request an override from any thread; while one request is pending further requests
//! coalesce into it. The arbiter consumes at most one request per tick, and only while the
//! vehicle is in autonomous mode.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    Manual,
    Autonomous,
}

// Pending manual override
#[derive(Debug, Clone, Copy)]
pub struct OverrideRequest {
    pub requested_at: DateTime<Local>,
}

/// Handle for requesting a manual override, e.g. when the driver grabs the wheel.
#[derive(Debug, Clone)]
pub struct OverrideTrigger {
    sender: mpsc::Sender<OverrideRequest>,
}

impl OverrideTrigger {
    /// Returns true if this call queued a new request, false if one was already pending
    /// or the input subsystem is gone.
    pub fn request(&self) -> bool {
        let request = OverrideRequest {
            requested_at: Local::now(),
        };
        match self.sender.try_send(request) {
            Ok(()) => {
                info!(
                    "Manual override requested at {}",
                    request.requested_at.format("%H:%M:%S.%3f")
                );
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Manual override already pending, request coalesced");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Manual override requested after wheel input shut down");
                false
            }
        }
    }
}

/// Outcome of one arbitration tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterDecision {
    /// Manual input should be sampled and applied this tick
    pub sample: bool,
    /// A pending override was consumed this tick
    pub overridden: bool,
}

impl ArbiterDecision {
    pub const MANUAL: ArbiterDecision = ArbiterDecision {
        sample: true,
        overridden: false,
    };
    pub const OVERRIDE: ArbiterDecision = ArbiterDecision {
        sample: true,
        overridden: true,
    };
    pub const HOLD: ArbiterDecision = ArbiterDecision {
        sample: false,
        overridden: false,
    };
}

#[derive(Debug)]
pub struct ModeArbiter {
    override_sender: mpsc::Sender<OverrideRequest>,
    override_receiver: mpsc::Receiver<OverrideRequest>,
}

impl Default for ModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeArbiter {
    pub fn new() -> Self {
        let (override_sender, override_receiver) = mpsc::channel(1);
        Self {
            override_sender,
            override_receiver,
        }
    }

    pub fn trigger(&self) -> OverrideTrigger {
        OverrideTrigger {
            sender: self.override_sender.clone(),
        }
    }

    pub fn override_pending(&self) -> bool {
        !self.override_receiver.is_empty()
    }

    /// Decides what this tick does. In manual mode a pending override stays queued; it
    /// is only consumed by an autonomous tick.
    pub fn decide(&mut self, mode: ControlMode) -> ArbiterDecision {
        match mode {
            ControlMode::Manual => ArbiterDecision::MANUAL,
            ControlMode::Autonomous => match self.override_receiver.try_recv() {
                Ok(request) => {
                    let latency = Local::now() - request.requested_at;
                    info!(
                        "Manual override taken during autonomous mode ({} ms after request)",
                        latency.num_milliseconds()
                    );
                    ArbiterDecision::OVERRIDE
                }
                Err(_) => ArbiterDecision::HOLD,
            },
        }
    }
}
