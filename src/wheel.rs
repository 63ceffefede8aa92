//! Per-tick orchestration of the wheel input subsystem.
//!
//! [`WheelInput::update_inputs`] is called once per simulation tick from a single control
//! thread. It checks the device connection, asks the [`ModeArbiter`] whether manual input
//! applies this tick, samples and normalizes the device, runs the gear and light
//! switches, drives force feedback and finally publishes a [`ControlSignals`] snapshot on a
//! `watch` channel.

use crate::arbiter::{ControlMode, ModeArbiter, OverrideTrigger};
use crate::config::{ActuatorFeedback, InputConfiguration, Platform};
use crate::device::{open_backend, InputAxis, WheelDevice};
use crate::feedback::SelfAligningTorque;
use crate::gear::{Gear, GearStateMachine};
use crate::normalize::{compose_acceleration, compose_steer, normalize_pedal};
use crate::signals::{ControlSignals, LightSwitches};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Physical limits exposed by the vehicle model, read once per tick.
pub trait ReadOnlyVehicle {
    fn max_steer_tire_angle_input(&self) -> f32;
    fn max_acceleration_input(&self) -> f32;
    fn max_deceleration_input(&self) -> f32;

    /// Current speed in m/s, used for force feedback only
    fn speed(&self) -> f32 {
        0.0
    }
}

/// Plain snapshot of the vehicle limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleLimits {
    pub max_steer_tire_angle: f32,
    pub max_acceleration: f32,
    pub max_deceleration: f32,
    pub speed: f32,
}

impl Default for VehicleLimits {
    fn default() -> Self {
        Self {
            max_steer_tire_angle: 35.0,
            max_acceleration: 1.5,
            max_deceleration: 1.5,
            speed: 0.0,
        }
    }
}

impl ReadOnlyVehicle for VehicleLimits {
    fn max_steer_tire_angle_input(&self) -> f32 {
        self.max_steer_tire_angle
    }

    fn max_acceleration_input(&self) -> f32 {
        self.max_acceleration
    }

    fn max_deceleration_input(&self) -> f32 {
        self.max_deceleration
    }

    fn speed(&self) -> f32 {
        self.speed
    }
}

impl<T: ReadOnlyVehicle> ReadOnlyVehicle for watch::Receiver<T> {
    fn max_steer_tire_angle_input(&self) -> f32 {
        self.borrow().max_steer_tire_angle_input()
    }

    fn max_acceleration_input(&self) -> f32 {
        self.borrow().max_acceleration_input()
    }

    fn max_deceleration_input(&self) -> f32 {
        self.borrow().max_deceleration_input()
    }

    fn speed(&self) -> f32 {
        self.borrow().speed()
    }
}

/// Current external control mode, read once per tick.
pub trait ControlModeSource {
    fn control_mode(&self) -> ControlMode;
}

impl ControlModeSource for ControlMode {
    fn control_mode(&self) -> ControlMode {
        *self
    }
}

impl ControlModeSource for watch::Receiver<ControlMode> {
    fn control_mode(&self) -> ControlMode {
        *self.borrow()
    }
}

pub struct WheelInput<V, M> {
    config: InputConfiguration,
    device: Box<dyn WheelDevice>,
    vehicle: V,
    mode: M,
    arbiter: ModeArbiter,
    gears: GearStateMachine,
    lights: LightSwitches,
    feedback: SelfAligningTorque,
    signals: watch::Sender<ControlSignals>,
    connected: bool,
    last_torque: f32,
}

impl<V: ReadOnlyVehicle, M: ControlModeSource> WheelInput<V, M> {
    /// Builds the configured backend and opens the device.
    pub fn initialize(config: InputConfiguration, vehicle: V, mode: M) -> Self {
        let config = config.sanitized();
        let device = open_backend(&config);
        Self::with_device(config, device, vehicle, mode)
    }

    /// Uses an already constructed backend. The device is initialized here.
    pub fn with_device(
        config: InputConfiguration,
        mut device: Box<dyn WheelDevice>,
        vehicle: V,
        mode: M,
    ) -> Self {
        let connected = device.initialize();
        if connected {
            info!("Wheel input connected: {}", device.name());
        } else {
            warn!(
                "Wheel input not connected ({}), all ticks will be skipped",
                device.name()
            );
        }

        let initial = ControlSignals {
            connected,
            ..ControlSignals::default()
        };
        let (signals, _) = watch::channel(initial);
        let feedback = SelfAligningTorque::from_config(&config);

        Self {
            config,
            device,
            vehicle,
            mode,
            arbiter: ModeArbiter::new(),
            gears: GearStateMachine::new(),
            lights: LightSwitches::default(),
            feedback,
            signals,
            connected,
            last_torque: 0.0,
        }
    }

    /// Runs one tick. Returns true only on the tick that consumed a manual override.
    pub fn update_inputs(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        if !self.device.is_connected() {
            warn!("Wheel device {} lost, input disabled", self.device.name());
            self.connected = false;
            self.device.close();
            self.signals.send_if_modified(|signals| {
                let changed = signals.connected;
                signals.connected = false;
                changed
            });
            return false;
        }

        self.device.poll();

        let mode = self.mode.control_mode();
        let decision = self.arbiter.decide(mode);

        if self.feedback_enabled() {
            self.apply_force_feedback();
        }

        if !decision.sample {
            return false;
        }

        let next = self.sample_signals();
        self.signals.send_if_modified(|signals| {
            if *signals == next {
                false
            } else {
                *signals = next;
                true
            }
        });

        decision.overridden
    }

    fn sample_signals(&mut self) -> ControlSignals {
        let steering = if self.device.has_position_sensor() {
            self.device.sample_position()
        } else {
            self.device.sample_axis(InputAxis::Steering)
        };
        let steering = if steering.is_nan() {
            0.0
        } else {
            steering.clamp(-1.0, 1.0)
        };
        let throttle = normalize_pedal(self.device.sample_axis(InputAxis::Throttle));
        let brake = normalize_pedal(self.device.sample_axis(InputAxis::Brake));

        let acceleration = compose_acceleration(
            self.vehicle.max_acceleration_input(),
            self.vehicle.max_deceleration_input(),
            throttle,
            brake,
            self.config.throttle_multiplier,
            self.config.brake_multiplier,
        );
        let steer_angle = compose_steer(self.vehicle.max_steer_tire_angle_input(), steering);

        let paddle_up = self.device.is_button_pressed(self.config.paddle_up_button);
        let paddle_down = self.device.is_button_pressed(self.config.paddle_down_button);
        let gear = self.gears.update(paddle_up, paddle_down);

        let buttons = self.config.buttons.clone();
        let left = self.pressed(buttons.turn_left);
        let right = self.pressed(buttons.turn_right);
        let hazard = self.pressed(buttons.hazard);
        let current = self.signals.borrow().clone();
        let (turn_indicators, hazard_lights) = self.lights.update(
            left,
            right,
            hazard,
            current.turn_indicators,
            current.hazard_lights,
        );

        debug!(
            "Sampled steering={:.3} throttle={:.3} brake={:.3}",
            steering, throttle, brake
        );

        ControlSignals {
            acceleration,
            steer_angle,
            gear,
            turn_indicators,
            hazard_lights,
            switch_autonomous: false,
            connected: true,
        }
    }

    fn pressed(&mut self, button: Option<u8>) -> bool {
        button.is_some_and(|index| self.device.is_button_pressed(index))
    }

    fn feedback_enabled(&self) -> bool {
        match self.config.actuator_feedback {
            ActuatorFeedback::Disabled => false,
            ActuatorFeedback::DeviceFileOnly => self.device.platform() == Platform::DeviceFile,
            ActuatorFeedback::Always => true,
        }
    }

    fn apply_force_feedback(&mut self) {
        let position = if self.device.has_position_sensor() {
            self.device.sample_position()
        } else {
            self.device.sample_axis(InputAxis::Steering)
        };
        let torque = self
            .feedback
            .compute(position, self.vehicle.speed(), Instant::now());
        self.device.send_torque(torque);
        self.last_torque = torque;
    }

    /// Latest published control snapshot.
    pub fn signals(&self) -> ControlSignals {
        self.signals.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSignals> {
        self.signals.subscribe()
    }

    /// Handle for requesting a manual override from any thread.
    pub fn override_trigger(&self) -> OverrideTrigger {
        self.arbiter.trigger()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn gear(&self) -> Gear {
        self.gears.gear()
    }

    /// Last torque command sent to the actuator.
    pub fn last_torque(&self) -> f32 {
        self.last_torque
    }

    pub fn config(&self) -> &InputConfiguration {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Releases the actuator and closes the device. Later ticks do nothing.
    pub fn close(&mut self) {
        if self.connected && self.feedback_enabled() {
            self.device.send_torque(0.0);
            self.last_torque = 0.0;
        }
        self.device.close();
        if self.connected {
            info!("Wheel input closed");
        }
        self.connected = false;
        self.signals.send_if_modified(|signals| {
            let changed = signals.connected;
            signals.connected = false;
            changed
        });
    }
}
