//! Device interface for steering wheels and pedals
//!
//! Two interchangeable backends implement [`WheelDevice`]:
//!
//! 1. [`device_file`] - raw evdev device file with a reader thread and force-feedback
//!    channel (Linux only)
//! 2. [`generic`] - polled virtual axes through gilrs, no actuator
//!
//! # Architecture
//!
//! ```text
//! /dev/input/eventN ──► reader thread ──► watch cell ──► sample_*()  (device file)
//! gilrs events ──────► poll() ──────────► axis state ──► sample_*()  (generic)
//! ```
//!
//! The backend is picked from [`Platform`] in the configuration. Sampling never fails;
//! missing devices and unbound axes read as neutral.

#[cfg(target_os = "linux")]
pub mod device_file;
pub mod generic;

use crate::config::{InputConfiguration, Platform};
use tracing::{info, warn};

// Analog inputs a backend can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAxis {
    Steering,
    Throttle,
    Brake,
}

/// Capability interface of a wheel/pedal device.
pub trait WheelDevice {
    fn name(&self) -> &str;

    /// Backend kind, used to decide where force feedback is sent.
    fn platform(&self) -> Platform;

    /// Opens the device. Returns the connected state; a failure is not an error.
    fn initialize(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    /// Drains pending device events. Called once per tick before sampling.
    fn poll(&mut self) {}

    /// Whether [`WheelDevice::sample_position`] reads a real steering position sensor.
    fn has_position_sensor(&self) -> bool {
        false
    }

    /// Absolute steering position in [-1, 1], 0 when unavailable.
    fn sample_position(&mut self) -> f32 {
        0.0
    }

    /// Raw axis value, 0 when the axis is unbound or the device is unavailable.
    fn sample_axis(&mut self, axis: InputAxis) -> f32;

    fn is_button_pressed(&mut self, index: u8) -> bool;

    /// Best-effort normalized torque command in [-1, 1].
    fn send_torque(&mut self, _torque: f32) {}

    /// Closes the session. Safe to call repeatedly; later samples read neutral.
    fn close(&mut self);
}

/// Builds the backend selected by the configuration. The returned device is not yet
/// initialized.
pub fn open_backend(config: &InputConfiguration) -> Box<dyn WheelDevice> {
    match config.platform {
        Platform::DeviceFile => device_file_backend(config),
        Platform::Generic => {
            info!("Using generic gamepad backend");
            Box::new(generic::GenericWheel::new(config))
        }
    }
}

#[cfg(target_os = "linux")]
fn device_file_backend(config: &InputConfiguration) -> Box<dyn WheelDevice> {
    info!("Using device file backend at {}", config.device_path);
    Box::new(device_file::DeviceFileWheel::new(config))
}

#[cfg(not(target_os = "linux"))]
fn device_file_backend(config: &InputConfiguration) -> Box<dyn WheelDevice> {
    warn!("Device file backend is only available on Linux, falling back to generic gamepad backend");
    Box::new(generic::GenericWheel::new(config))
}

/// Maps a raw reading from `[min, max]` onto [-1, 1]. A degenerate range reads as 0.
pub fn normalize_range(raw: i32, min: i32, max: i32) -> f32 {
    if max <= min {
        warn!("Degenerate axis range [{}, {}]", min, max);
        return 0.0;
    }
    let span = (max as f64) - (min as f64);
    let unit = ((raw as f64) - (min as f64)) / span;
    ((unit * 2.0 - 1.0) as f32).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_maps_to_unit_interval() {
        assert_eq!(normalize_range(0, 0, 65535), -1.0);
        assert_eq!(normalize_range(65535, 0, 65535), 1.0);
        assert!(normalize_range(32767, 0, 65535).abs() < 1e-4);
        assert_eq!(normalize_range(-500, -250, 250), -1.0);
        assert_eq!(normalize_range(128, 0, 255).signum(), 1.0);
    }

    #[test]
    fn degenerate_range_is_neutral() {
        assert_eq!(normalize_range(10, 5, 5), 0.0);
        assert_eq!(normalize_range(10, 20, 5), 0.0);
    }

    #[test]
    fn generic_platform_builds_generic_backend() {
        let config = InputConfiguration {
            platform: Platform::Generic,
            ..InputConfiguration::default()
        };
        let device = open_backend(&config);
        assert_eq!(device.platform(), Platform::Generic);
        assert!(!device.is_connected());
    }
}
