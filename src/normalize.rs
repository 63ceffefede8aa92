//! Pedal normalization, torque gain derivation and control signal composition.

/// Raw readings closer to zero than this are treated as exactly zero.
pub const PEDAL_DEAD_ZONE: f32 = 0.02;

/// Readings below this are taken from a centered axis that rests at -1.
pub const CENTERED_AXIS_THRESHOLD: f32 = -0.1;

const SPEED_GAIN_RANGE: (f32, f32) = (10.0, 4.0);
const STEER_GAIN_RANGE: (f32, f32) = (5.0, 1.0);

/// Maps a raw pedal axis reading into a 0..1 depression value.
///
/// Axes resting at 0 and axes resting at -1 both end up on the same scale. A remapped
/// value that lands inside the dead zone is zeroed as well, so the result is stable
/// under repeated normalization.
pub fn normalize_pedal(raw: f32) -> f32 {
    if raw.is_nan() || raw.abs() < PEDAL_DEAD_ZONE {
        return 0.0;
    }

    let depression = if raw < CENTERED_AXIS_THRESHOLD {
        (raw + 1.0) * 0.5
    } else {
        raw
    }
    .clamp(0.0, 1.0);

    if depression < PEDAL_DEAD_ZONE {
        0.0
    } else {
        depression
    }
}

/// The two physical gains of the self-aligning torque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorqueGains {
    pub speed: f32,
    pub steer: f32,
}

impl TorqueGains {
    pub const DISABLED: TorqueGains = TorqueGains {
        speed: 0.0,
        steer: 0.0,
    };

    pub fn is_disabled(&self) -> bool {
        self.speed <= 0.0 || self.steer <= 0.0
    }
}

/// Derives the speed and steer gains from the single 0..1 feel coefficient.
///
/// A coefficient of exactly zero disables the self-aligning torque. Anything else
/// interpolates the speed gain from 10 down to 4 and the steer gain from 5 down to 1.
pub fn derive_torque_gains(feel: f32) -> TorqueGains {
    let feel = if feel.is_nan() {
        0.0
    } else {
        feel.clamp(0.0, 1.0)
    };

    if feel == 0.0 {
        return TorqueGains::DISABLED;
    }

    TorqueGains {
        speed: lerp(SPEED_GAIN_RANGE.0, SPEED_GAIN_RANGE.1, feel),
        steer: lerp(STEER_GAIN_RANGE.0, STEER_GAIN_RANGE.1, feel),
    }
}

/// Net acceleration request from throttle and brake depression.
pub fn compose_acceleration(
    max_acceleration: f32,
    max_deceleration: f32,
    throttle: f32,
    brake: f32,
    throttle_multiplier: f32,
    brake_multiplier: f32,
) -> f32 {
    max_acceleration * throttle * throttle_multiplier
        - max_deceleration * brake * brake_multiplier
}

pub fn compose_steer(max_steer_angle: f32, steering: f32) -> f32 {
    max_steer_angle * steering
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pedal_boundaries() {
        assert_eq!(normalize_pedal(0.0), 0.0);
        assert_eq!(normalize_pedal(-1.0), 0.0);
        assert_eq!(normalize_pedal(1.0), 1.0);
        assert_eq!(normalize_pedal(0.015), 0.0);
        assert_eq!(normalize_pedal(-0.015), 0.0);
    }

    #[test]
    fn centered_axis_is_remapped() {
        assert_eq!(normalize_pedal(-0.5), 0.25);
        assert!((normalize_pedal(-0.2) - 0.4).abs() < 1e-6);
        // between the dead zone and the centered threshold the value clamps to zero
        assert_eq!(normalize_pedal(-0.05), 0.0);
    }

    #[test]
    fn resting_axis_is_clamped() {
        assert_eq!(normalize_pedal(0.5), 0.5);
        assert_eq!(normalize_pedal(1.8), 1.0);
        assert_eq!(normalize_pedal(f32::NAN), 0.0);
        assert_eq!(normalize_pedal(f32::INFINITY), 1.0);
        assert_eq!(normalize_pedal(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn pedal_normalization_is_idempotent() {
        let mut raw = -1.5;
        while raw <= 1.5 {
            let once = normalize_pedal(raw);
            assert_eq!(normalize_pedal(once), once, "raw = {}", raw);
            assert!((0.0..=1.0).contains(&once));
            raw += 0.001;
        }
    }

    #[test]
    fn zero_feel_disables_gains() {
        let gains = derive_torque_gains(0.0);
        assert_eq!(gains, TorqueGains::DISABLED);
        assert!(gains.is_disabled());
        assert_eq!(derive_torque_gains(-0.3), TorqueGains::DISABLED);
    }

    #[test]
    fn feel_endpoints() {
        let full = derive_torque_gains(1.0);
        assert_eq!(full.speed, 4.0);
        assert_eq!(full.steer, 1.0);

        let clamped = derive_torque_gains(7.0);
        assert_eq!(clamped, full);

        let tuned = derive_torque_gains(0.8);
        assert!((tuned.speed - 5.2).abs() < 1e-5);
        assert!((tuned.steer - 1.8).abs() < 1e-5);
    }

    #[test]
    fn gains_do_not_increase_with_feel() {
        let mut previous = derive_torque_gains(0.001);
        assert!((previous.speed - 10.0).abs() < 0.01);
        assert!((previous.steer - 5.0).abs() < 0.01);

        for step in 2..=1000 {
            let gains = derive_torque_gains(step as f32 / 1000.0);
            assert!(gains.speed <= previous.speed);
            assert!(gains.steer <= previous.steer);
            previous = gains;
        }
    }

    #[test]
    fn acceleration_composition() {
        let accel = compose_acceleration(3.0, 8.0, normalize_pedal(0.5), 0.0, 1.0, 1.0);
        assert_eq!(accel, 1.5);

        let braking = compose_acceleration(3.0, 8.0, 0.0, 0.5, 1.0, 2.0);
        assert_eq!(braking, -8.0);

        assert_eq!(compose_steer(0.6, -0.5), -0.3);
    }
}
