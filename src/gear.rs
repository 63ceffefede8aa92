use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// Gear sequence, Parking at the bottom and Drive at the top
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gear {
    #[default]
    Parking,
    Reverse,
    Neutral,
    Drive,
}

impl Gear {
    pub fn shifted_up(self) -> Self {
        match self {
            Gear::Parking => Gear::Reverse,
            Gear::Reverse => Gear::Neutral,
            Gear::Neutral => Gear::Drive,
            Gear::Drive => Gear::Drive,
        }
    }

    pub fn shifted_down(self) -> Self {
        match self {
            Gear::Drive => Gear::Neutral,
            Gear::Neutral => Gear::Reverse,
            Gear::Reverse => Gear::Parking,
            Gear::Parking => Gear::Parking,
        }
    }
}

/// Rising-edge detector over a sampled button.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    /// Records `pressed` as the new previous state and reports whether it was a
    /// not-pressed to pressed transition.
    pub fn rising(&mut self, pressed: bool) -> bool {
        let edge = pressed && !self.previous;
        self.previous = pressed;
        edge
    }
}

/// Paddle shifter driven gear state.
#[derive(Debug, Clone, Default)]
pub struct GearStateMachine {
    gear: Gear,
    paddle_up: EdgeDetector,
    paddle_down: EdgeDetector,
}

impl GearStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gear(gear: Gear) -> Self {
        Self {
            gear,
            ..Self::default()
        }
    }

    pub fn gear(&self) -> Gear {
        self.gear
    }

    /// Feeds one tick of raw paddle state. Both edge detectors are updated every call.
    /// When both paddles rise in the same tick the up shift is applied first.
    pub fn update(&mut self, paddle_up: bool, paddle_down: bool) -> Gear {
        let up_edge = self.paddle_up.rising(paddle_up);
        let down_edge = self.paddle_down.rising(paddle_down);

        if up_edge {
            self.shift(self.gear.shifted_up(), "up");
        }
        if down_edge {
            self.shift(self.gear.shifted_down(), "down");
        }

        self.gear
    }

    fn shift(&mut self, next: Gear, direction: &str) {
        if next == self.gear {
            debug!("Shift {} ignored at {:?}", direction, self.gear);
            return;
        }
        info!("Gear shift {}: {:?} -> {:?}", direction, self.gear, next);
        self.gear = next;
    }
}
