use crate::gear::{EdgeDetector, Gear};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnIndicators {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardLights {
    #[default]
    Disable,
    Enable,
}

/// Control snapshot published once per tick. The default value is the neutral,
/// disconnected state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSignals {
    pub acceleration: f32,
    pub steer_angle: f32,
    pub gear: Gear,
    pub turn_indicators: TurnIndicators,
    pub hazard_lights: HazardLights,
    pub switch_autonomous: bool,
    pub connected: bool,
}

/// Edge-triggered light toggles.
#[derive(Debug, Clone, Default)]
pub struct LightSwitches {
    turn_left: EdgeDetector,
    turn_right: EdgeDetector,
    hazard: EdgeDetector,
}

impl LightSwitches {
    /// Applies one tick of raw button state to the current light outputs. Pressing the
    /// active indicator again switches it off.
    pub fn update(
        &mut self,
        left: bool,
        right: bool,
        hazard: bool,
        indicators: TurnIndicators,
        hazards: HazardLights,
    ) -> (TurnIndicators, HazardLights) {
        let mut indicators = indicators;
        let mut hazards = hazards;

        if self.turn_left.rising(left) {
            indicators = toggle_indicator(indicators, TurnIndicators::Left);
        }
        if self.turn_right.rising(right) {
            indicators = toggle_indicator(indicators, TurnIndicators::Right);
        }
        if self.hazard.rising(hazard) {
            hazards = match hazards {
                HazardLights::Disable => HazardLights::Enable,
                HazardLights::Enable => HazardLights::Disable,
            };
            info!("Hazard lights: {:?}", hazards);
        }

        (indicators, hazards)
    }
}

fn toggle_indicator(current: TurnIndicators, pressed: TurnIndicators) -> TurnIndicators {
    let next = if current == pressed {
        TurnIndicators::None
    } else {
        pressed
    };
    info!("Turn indicators: {:?} -> {:?}", current, next);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_signals_are_neutral() {
        let signals = ControlSignals::default();
        assert_eq!(signals.acceleration, 0.0);
        assert_eq!(signals.steer_angle, 0.0);
        assert_eq!(signals.gear, Gear::Parking);
        assert_eq!(signals.turn_indicators, TurnIndicators::None);
        assert_eq!(signals.hazard_lights, HazardLights::Disable);
        assert!(!signals.switch_autonomous);
        assert!(!signals.connected);
    }

    #[test]
    fn indicators_toggle_on_edges() {
        let mut switches = LightSwitches::default();
        let off = (TurnIndicators::None, HazardLights::Disable);

        let state = switches.update(true, false, false, off.0, off.1);
        assert_eq!(state.0, TurnIndicators::Left);

        // holding the button does not toggle again
        let state = switches.update(true, false, false, state.0, state.1);
        assert_eq!(state.0, TurnIndicators::Left);

        let state = switches.update(false, true, false, state.0, state.1);
        assert_eq!(state.0, TurnIndicators::Right);

        let state = switches.update(false, false, false, state.0, state.1);
        let state = switches.update(false, true, false, state.0, state.1);
        assert_eq!(state.0, TurnIndicators::None);
    }

    #[test]
    fn hazards_toggle_independently() {
        let mut switches = LightSwitches::default();
        let state = switches.update(false, false, true, TurnIndicators::Left, HazardLights::Disable);
        assert_eq!(state, (TurnIndicators::Left, HazardLights::Enable));

        let state = switches.update(false, false, false, state.0, state.1);
        let state = switches.update(false, false, true, state.0, state.1);
        assert_eq!(state, (TurnIndicators::Left, HazardLights::Disable));
    }
}
