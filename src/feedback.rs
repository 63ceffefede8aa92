use crate::config::InputConfiguration;
use crate::normalize::{derive_torque_gains, TorqueGains};
use crate::pid::Pid;
use std::time::Instant;
use tracing::debug;

/// Below this speed (m/s) the vehicle counts as stationary.
pub const STATIONARY_SPEED_MS: f32 = 0.1;

// Commands smaller than this are treated as no torque at all
const TORQUE_EPSILON: f32 = 1e-3;

/// Self-aligning torque for the force-feedback actuator.
///
/// While moving, the PID correction toward center is scaled by a speed factor that
/// saturates at `1 - exp(-speed / speed_gain)` and divided by the steer gain. While
/// stationary, a fixed resistance opposes wheel motion instead. Non-zero commands below the
/// actuator's minimum torque are raised to it, keeping their sign.
#[derive(Debug, Clone)]
pub struct SelfAligningTorque {
    pid: Pid,
    gains: TorqueGains,
    min_normalized_torque: f32,
    stationary_resistance: f32,
    previous_position: Option<f32>,
}

impl SelfAligningTorque {
    pub fn new(
        pid: Pid,
        gains: TorqueGains,
        min_normalized_torque: f32,
        stationary_resistance: f32,
    ) -> Self {
        Self {
            pid,
            gains,
            min_normalized_torque: min_normalized_torque.clamp(0.0, 1.0),
            stationary_resistance: stationary_resistance.max(0.0),
            previous_position: None,
        }
    }

    pub fn from_config(config: &InputConfiguration) -> Self {
        let gains = derive_torque_gains(config.self_aligning_torque_coeff);
        debug!(
            "Self-aligning torque gains: speed={:.2}, steer={:.2}",
            gains.speed, gains.steer
        );
        Self::new(
            config.pid.build(),
            gains,
            config.min_normalized_steering_torque,
            config.stationary_steering_resistance,
        )
    }

    pub fn gains(&self) -> TorqueGains {
        self.gains
    }

    /// Normalized torque in [-1, 1] for the given wheel position (-1..1) and vehicle speed.
    /// Positive torque pushes toward positive positions.
    pub fn compute(&mut self, position: f32, speed: f32, now: Instant) -> f32 {
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(-1.0, 1.0)
        };

        // the controller runs every tick so its state follows the wheel while stationary
        let correction = self.pid.update_at(0.0, position, now);
        let wheel_motion = self
            .previous_position
            .map(|previous| position - previous)
            .unwrap_or(0.0);
        self.previous_position = Some(position);

        let speed = if speed.is_nan() { 0.0 } else { speed.abs() };

        let torque = if speed < STATIONARY_SPEED_MS {
            if wheel_motion.abs() > f32::EPSILON {
                -wheel_motion.signum() * self.stationary_resistance
            } else {
                0.0
            }
        } else if self.gains.is_disabled() {
            0.0
        } else {
            let speed_factor = 1.0 - (-speed / self.gains.speed).exp();
            correction * speed_factor / self.gains.steer
        };

        compensate_dead_band(torque, self.min_normalized_torque).clamp(-1.0, 1.0)
    }
}

fn compensate_dead_band(torque: f32, min_torque: f32) -> f32 {
    if torque.abs() < TORQUE_EPSILON {
        0.0
    } else if torque.abs() < min_torque {
        min_torque.copysign(torque)
    } else {
        torque
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn feedback(feel: f32) -> SelfAligningTorque {
        SelfAligningTorque::new(
            Pid::new(5.0, 0.0, 0.0).with_output_limit(1.0),
            derive_torque_gains(feel),
            0.17,
            0.1,
        )
    }

    #[test]
    fn torque_opposes_deflection_when_moving() {
        let mut ffb = feedback(1.0);
        let now = Instant::now();

        let right = ffb.compute(0.3, 20.0, now);
        assert!(right < 0.0);

        let left = ffb.compute(-0.3, 20.0, now + Duration::from_millis(20));
        assert!(left > 0.0);
    }

    #[test]
    fn centered_wheel_gets_no_torque() {
        let mut ffb = feedback(1.0);
        assert_eq!(ffb.compute(0.0, 20.0, Instant::now()), 0.0);
    }

    #[test]
    fn torque_grows_with_speed() {
        let start = Instant::now();
        let mut slow = feedback(0.5);
        let mut fast = feedback(0.5);

        let slow_torque = slow.compute(0.5, 1.0, start).abs();
        let fast_torque = fast.compute(0.5, 15.0, start).abs();
        assert!(fast_torque > slow_torque);
    }

    #[test]
    fn small_commands_are_raised_to_minimum() {
        let mut ffb = feedback(0.1);
        let torque = ffb.compute(0.05, 0.5, Instant::now());
        assert_eq!(torque, -0.17);
    }

    #[test]
    fn zero_feel_disables_aligning_torque() {
        let mut ffb = feedback(0.0);
        assert_eq!(ffb.compute(0.8, 30.0, Instant::now()), 0.0);
    }

    #[test]
    fn stationary_wheel_resists_motion() {
        let mut ffb = SelfAligningTorque::new(
            Pid::new(5.0, 0.0, 0.0),
            derive_torque_gains(1.0),
            0.0,
            0.1,
        );
        let start = Instant::now();

        assert_eq!(ffb.compute(0.2, 0.0, start), 0.0);
        let turning_right = ffb.compute(0.3, 0.0, start + Duration::from_millis(20));
        assert_eq!(turning_right, -0.1);
        let turning_left = ffb.compute(0.1, 0.0, start + Duration::from_millis(40));
        assert_eq!(turning_left, 0.1);
        let holding = ffb.compute(0.1, 0.0, start + Duration::from_millis(60));
        assert_eq!(holding, 0.0);
    }

    #[test]
    fn output_stays_normalized() {
        let mut ffb = SelfAligningTorque::new(
            Pid::new(50.0, 0.0, 0.0),
            derive_torque_gains(1.0),
            0.17,
            0.1,
        );
        let torque = ffb.compute(1.0, 100.0, Instant::now());
        assert_eq!(torque, -1.0);
        let torque = ffb.compute(5.0, 100.0, Instant::now());
        assert_eq!(torque, -1.0);
    }
}
