use crate::config::{InputConfiguration, Platform};
use crate::device::{InputAxis, WheelDevice};
use crate::error::WheelError;
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use tracing::{debug, error, info, trace, warn};

// Button index → gilrs button, in joystick button order
const BUTTON_TABLE: [Button; 17] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::Mode,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

/// Generic backend reading virtual gamepad axes through gilrs.
///
/// Initialization is optimistic: the backend reports connected even when gilrs or the
/// gamepad is missing, and every read of a missing axis yields 0.
pub struct GenericWheel {
    name: String,
    gamepad_filter: String,
    gilrs: Option<Gilrs>,
    active_gamepad: Option<GamepadId>,
    steer_axis: Option<Axis>,
    throttle_axis: Option<Axis>,
    brake_axis: Option<Axis>,
    connected: bool,
}

impl GenericWheel {
    pub fn new(config: &InputConfiguration) -> Self {
        Self {
            name: "Steering wheel (generic gamepad input)".to_string(),
            gamepad_filter: config.device_path.to_lowercase(),
            gilrs: None,
            active_gamepad: None,
            steer_axis: bind_axis("steer", &config.steer_axis),
            throttle_axis: bind_axis("throttle", &config.throttle_axis),
            brake_axis: bind_axis("brake", &config.brake_axis),
            connected: false,
        }
    }

    // Picks the gamepad whose name matches the configured identifier, else the first one
    fn select_gamepad(&mut self) {
        let Some(gilrs) = self.gilrs.as_ref() else {
            return;
        };

        let gamepads: Vec<(GamepadId, String)> = gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            debug!("No gamepad connected yet");
            return;
        }

        info!("Found {} gamepads:", gamepads.len());
        for (idx, (id, name)) in gamepads.iter().enumerate() {
            info!("  [{}] ID: {}, Name: {}", idx, id, name);
        }

        let selected = gamepads
            .iter()
            .find(|(_, name)| {
                !self.gamepad_filter.is_empty()
                    && name.to_lowercase().contains(&self.gamepad_filter)
            })
            .unwrap_or(&gamepads[0]);

        info!("Selected gamepad: {} ({})", selected.1, selected.0);
        self.active_gamepad = Some(selected.0);
    }

    fn read_axis(&self, axis: InputAxis) -> Result<f32, WheelError> {
        let bound = match axis {
            InputAxis::Steering => self.steer_axis,
            InputAxis::Throttle => self.throttle_axis,
            InputAxis::Brake => self.brake_axis,
        }
        .ok_or_else(|| WheelError::AxisUnbound(format!("{:?} has no axis binding", axis)))?;

        let gamepad = self.active_gamepad()?;
        gamepad
            .axis_data(bound)
            .map(|data| data.value())
            .ok_or_else(|| WheelError::AxisUnbound(format!("{:?} not reported by gamepad", bound)))
    }

    fn active_gamepad(&self) -> Result<gilrs::Gamepad<'_>, WheelError> {
        let gilrs = self
            .gilrs
            .as_ref()
            .ok_or_else(|| WheelError::AxisUnbound("gilrs unavailable".to_string()))?;
        let id = self
            .active_gamepad
            .ok_or_else(|| WheelError::AxisUnbound("no active gamepad".to_string()))?;
        gilrs
            .connected_gamepad(id)
            .ok_or_else(|| WheelError::AxisUnbound(format!("gamepad {} disconnected", id)))
    }
}

impl WheelDevice for GenericWheel {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::Generic
    }

    fn initialize(&mut self) -> bool {
        info!("Initializing gilrs controller interface");
        match Gilrs::new() {
            Ok(gilrs) => {
                info!("Successfully initialized gilrs");
                self.gilrs = Some(gilrs);
                self.select_gamepad();
            }
            Err(e) => {
                let e = WheelError::BackendInitialization(e.to_string());
                error!("{}, all axes will read as neutral", e);
            }
        }
        self.connected = true;
        self.connected
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) {
        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };

        let mut reselect = false;
        while let Some(Event { id, event, .. }) = gilrs.next_event() {
            match event {
                EventType::Connected => {
                    info!("Gamepad {} connected", id);
                    if self.active_gamepad.is_none() {
                        reselect = true;
                    }
                }
                EventType::Disconnected => {
                    if self.active_gamepad == Some(id) {
                        warn!("Active gamepad {} disconnected", id);
                        self.active_gamepad = None;
                        reselect = true;
                    }
                }
                _ => trace!("Gamepad event: {:?}", event),
            }
        }

        if reselect {
            self.select_gamepad();
        }
    }

    fn sample_axis(&mut self, axis: InputAxis) -> f32 {
        if !self.connected {
            return 0.0;
        }
        self.read_axis(axis).unwrap_or_else(|e| {
            trace!("{}, reading 0", e);
            0.0
        })
    }

    fn is_button_pressed(&mut self, index: u8) -> bool {
        if !self.connected {
            return false;
        }
        let Some(button) = BUTTON_TABLE.get(index as usize).copied() else {
            trace!("Button index {} outside button table", index);
            return false;
        };
        self.active_gamepad()
            .map(|gamepad| gamepad.is_pressed(button))
            .unwrap_or(false)
    }

    fn send_torque(&mut self, torque: f32) {
        trace!("Generic backend has no actuator, torque {:.3} ignored", torque);
    }

    fn close(&mut self) {
        if self.connected {
            info!("Closing generic gamepad backend");
        }
        self.gilrs = None;
        self.active_gamepad = None;
        self.connected = false;
    }
}

fn bind_axis(role: &str, name: &str) -> Option<Axis> {
    let axis = parse_axis(name);
    if axis.is_none() {
        warn!("Unknown {} axis name '{}', it will read as 0", role, name);
    }
    axis
}

/// Parses a gilrs axis name, ignoring case, spaces and underscores.
pub fn parse_axis(name: &str) -> Option<Axis> {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match key.as_str() {
        "leftstickx" => Some(Axis::LeftStickX),
        "leftsticky" => Some(Axis::LeftStickY),
        "leftz" => Some(Axis::LeftZ),
        "rightstickx" => Some(Axis::RightStickX),
        "rightsticky" => Some(Axis::RightStickY),
        "rightz" => Some(Axis::RightZ),
        "dpadx" => Some(Axis::DPadX),
        "dpady" => Some(Axis::DPadY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(steer: &str) -> InputConfiguration {
        InputConfiguration {
            platform: Platform::Generic,
            steer_axis: steer.to_string(),
            ..InputConfiguration::default()
        }
    }

    #[test]
    fn axis_names_parse_loosely() {
        assert_eq!(parse_axis("LeftStickX"), Some(Axis::LeftStickX));
        assert_eq!(parse_axis("left_stick_x"), Some(Axis::LeftStickX));
        assert_eq!(parse_axis("Right Z"), Some(Axis::RightZ));
        assert_eq!(parse_axis("DPadY"), Some(Axis::DPadY));
        assert_eq!(parse_axis("Joy 3"), None);
        assert_eq!(parse_axis(""), None);
    }

    #[test]
    fn unbound_axis_reads_zero() {
        let mut wheel = GenericWheel::new(&config("not an axis"));
        wheel.connected = true;
        assert!(matches!(
            wheel.read_axis(InputAxis::Steering),
            Err(WheelError::AxisUnbound(_))
        ));
        assert_eq!(wheel.sample_axis(InputAxis::Steering), 0.0);
    }

    #[test]
    fn missing_context_reads_neutral() {
        let mut wheel = GenericWheel::new(&config("LeftStickX"));
        wheel.connected = true;
        assert_eq!(wheel.sample_axis(InputAxis::Steering), 0.0);
        assert_eq!(wheel.sample_axis(InputAxis::Throttle), 0.0);
        assert!(!wheel.is_button_pressed(4));
        assert!(!wheel.is_button_pressed(200));
        assert!(!wheel.has_position_sensor());
        assert_eq!(wheel.sample_position(), 0.0);
    }

    #[test]
    fn close_is_idempotent() {
        let mut wheel = GenericWheel::new(&config("LeftStickX"));
        wheel.connected = true;
        wheel.close();
        wheel.close();
        assert!(!wheel.is_connected());
        assert_eq!(wheel.sample_axis(InputAxis::Brake), 0.0);
    }
}
