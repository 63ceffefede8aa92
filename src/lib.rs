//! Force-feedback steering wheel input for drive-by-wire simulation vehicles.
//!
//! Reads a physical steering wheel and pedals, turns them into vehicle control signals,
//! arbitrates between manual and autonomous control and drives a self-aligning torque
//! back into the wheel's force-feedback actuator.

pub mod arbiter;
pub mod config;
pub mod device;
pub mod error;
pub mod feedback;
pub mod gear;
pub mod normalize;
pub mod pid;
pub mod signals;
pub mod wheel;

pub use arbiter::{ControlMode, OverrideTrigger};
pub use config::{ActuatorFeedback, InputConfiguration, Platform};
pub use device::{InputAxis, WheelDevice};
pub use error::{ConfigError, WheelError};
pub use gear::Gear;
pub use signals::{ControlSignals, HazardLights, TurnIndicators};
pub use wheel::{ControlModeSource, ReadOnlyVehicle, VehicleLimits, WheelInput};
