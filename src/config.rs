//! # Wheel Input Configuration
//!
//! Holds everything captured once at initialization: the device identifier, the
//! self-aligning torque feel, PID gains, axis and button bindings, pedal multipliers and
//! the backend selection.
//!
//! Configuration is stored as TOML. Every struct uses `#[serde(default)]`, so a partial
//! file only needs the keys that differ from the defaults:
//!
//! ```toml
//! device_path = "/dev/input/event4"
//! self_aligning_torque_coeff = 0.6
//!
//! [pid]
//! kp = 4.0
//! ```
//!
//! Values outside their documented ranges are clamped by [`InputConfiguration::sanitized`]
//! with a warning instead of failing the load.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "ffwheel";
const CONFIG_FILE: &str = "wheel_config.toml";

pub const MULTIPLIER_RANGE: (f32, f32) = (0.1, 3.0);
pub const STATIONARY_RESISTANCE_RANGE: (f32, f32) = (0.0, 0.1);

/// Which device backend the wheel is read through.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Raw evdev device file (Linux only)
    DeviceFile,
    /// Generic polled gamepad axes via gilrs
    Generic,
}

impl Platform {
    /// Backend matching the platform this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(target_os = "linux") {
            Platform::DeviceFile
        } else {
            Platform::Generic
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

/// When the computed self-aligning torque is written to the actuator.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorFeedback {
    /// Never drive the actuator
    Disabled,
    /// Only on the device-file backend, which owns a force-feedback channel
    #[default]
    DeviceFileOnly,
    /// On every backend; backends without an actuator ignore the command
    Always,
}

/// Gains for the steering torque PID controller.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Absolute bound on the integral accumulator
    pub integral_limit: f32,
    /// Absolute bound on the controller output
    pub output_limit: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 5.0,
            ki: 0.2,
            kd: 0.05,
            integral_limit: 2.0,
            output_limit: 1.0,
        }
    }
}

/// Optional buttons for lights. Unbound by default.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AuxButtons {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_left: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_right: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hazard: Option<u8>,
}

/// Raw event codes and ranges used by the device-file backend.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceFileConfig {
    /// Absolute axis code of the steering position (ABS_X)
    pub steer_code: u16,
    pub position_min: i32,
    pub position_max: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brake_code: Option<u16>,
    pub pedal_min: i32,
    pub pedal_max: i32,
    /// Pedals that report their maximum when released
    pub invert_pedals: bool,
    /// Key code of button index 0 (BTN_TRIGGER)
    pub button_base: u16,
    pub invert_torque: bool,
}

impl Default for DeviceFileConfig {
    fn default() -> Self {
        Self {
            steer_code: 0x00,
            position_min: 0,
            position_max: 65535,
            throttle_code: None,
            brake_code: None,
            pedal_min: 0,
            pedal_max: 255,
            invert_pedals: true,
            button_base: 0x120,
            invert_torque: false,
        }
    }
}

/// Immutable configuration of the wheel input subsystem.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfiguration {
    /// Device file path on the device-file backend, gamepad name filter on the generic one
    pub device_path: String,
    /// Single 0..1 "feel" knob for the self-aligning torque
    pub self_aligning_torque_coeff: f32,
    pub pid: PidGains,
    pub min_normalized_steering_torque: f32,
    pub stationary_steering_resistance: f32,
    pub steer_axis: String,
    pub throttle_axis: String,
    pub brake_axis: String,
    pub paddle_up_button: u8,
    pub paddle_down_button: u8,
    pub throttle_multiplier: f32,
    pub brake_multiplier: f32,
    pub platform: Platform,
    pub actuator_feedback: ActuatorFeedback,
    pub buttons: AuxButtons,
    pub device_file: DeviceFileConfig,
}

impl Default for InputConfiguration {
    fn default() -> Self {
        Self {
            device_path: "/dev/input/event6".to_string(),
            self_aligning_torque_coeff: 0.8,
            pid: PidGains::default(),
            min_normalized_steering_torque: 0.17,
            stationary_steering_resistance: 0.1,
            steer_axis: "LeftStickX".to_string(),
            throttle_axis: "RightZ".to_string(),
            brake_axis: "LeftZ".to_string(),
            paddle_up_button: 4,
            paddle_down_button: 5,
            throttle_multiplier: 1.0,
            brake_multiplier: 1.0,
            platform: Platform::default(),
            actuator_feedback: ActuatorFeedback::default(),
            buttons: AuxButtons::default(),
            device_file: DeviceFileConfig::default(),
        }
    }
}

impl InputConfiguration {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config.sanitized())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads and sanitizes a configuration file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading wheel configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded wheel configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let content = self.to_toml_string()?;
        tokio::fs::write(path, content).await.map_err(io_error)?;
        debug!("Saved wheel configuration to {}", path.display());
        Ok(())
    }

    /// Writes the default configuration to `path` unless a file already exists there.
    pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            info!("No wheel configuration at {}, writing defaults", path.display());
            Self::default().save(path).await?;
        }
        Ok(())
    }

    /// Returns a copy with every ranged value clamped into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.self_aligning_torque_coeff = clamp_logged(
            "self_aligning_torque_coeff",
            self.self_aligning_torque_coeff,
            0.0,
            1.0,
        );
        self.throttle_multiplier = clamp_logged(
            "throttle_multiplier",
            self.throttle_multiplier,
            MULTIPLIER_RANGE.0,
            MULTIPLIER_RANGE.1,
        );
        self.brake_multiplier = clamp_logged(
            "brake_multiplier",
            self.brake_multiplier,
            MULTIPLIER_RANGE.0,
            MULTIPLIER_RANGE.1,
        );
        self.stationary_steering_resistance = clamp_logged(
            "stationary_steering_resistance",
            self.stationary_steering_resistance,
            STATIONARY_RESISTANCE_RANGE.0,
            STATIONARY_RESISTANCE_RANGE.1,
        );
        self.min_normalized_steering_torque = clamp_logged(
            "min_normalized_steering_torque",
            self.min_normalized_steering_torque,
            0.0,
            1.0,
        );
        self.pid.integral_limit = self.pid.integral_limit.abs();
        self.pid.output_limit = self.pid.output_limit.abs();
        self
    }
}

/// Default location: `<config dir>/ffwheel/wheel_config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

fn clamp_logged(name: &str, value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        warn!("{} is NaN, using {}", name, min);
        return min;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(
            "{} = {} outside [{}, {}], clamped to {}",
            name, value, min, max, clamped
        );
    }
    clamped
}
