//! Device-file backend.
//!
//! The event file is read by a dedicated reader thread that folds input events into a
//! [`WheelSample`] and overwrites a single-slot `watch` cell. The tick thread only ever
//! borrows the freshest sample, so sampling never blocks. Force feedback goes through a
//! second handle on the same file holding one uploaded constant-force effect.

use crate::config::{DeviceFileConfig, InputConfiguration, Platform};
use crate::device::{normalize_range, InputAxis, WheelDevice};
use crate::error::WheelError;
use chrono::{DateTime, Local};
use evdev::{
    Device, EventType, FFEffect, FFEffectData, FFEffectKind, FFEnvelope, FFReplay, FFTrigger,
    InputEvent,
};
use statum::{machine, state};
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

const FF_AUTOCENTER: u16 = 0x61;
// Effect direction along the wheel axis
const FF_DIRECTION: u16 = 0x4000;
const READER_BACKOFF: Duration = Duration::from_millis(2);

/// Latest state of the wheel as folded from the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSample {
    /// Steering position in [-1, 1]
    pub position: f32,
    /// Pedal depressions in [0, 1]
    pub throttle: f32,
    pub brake: f32,
    /// Bit `n` set while button index `n` is held
    pub buttons: u64,
    pub captured_at: Option<DateTime<Local>>,
}

impl WheelSample {
    pub fn is_pressed(&self, index: u8) -> bool {
        index < 64 && self.buttons & (1u64 << index) != 0
    }
}

/// Event code to sample field mapping.
#[derive(Debug, Clone)]
pub struct AxisMapping {
    config: DeviceFileConfig,
}

impl AxisMapping {
    pub fn new(config: &DeviceFileConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Folds one event into the sample. Returns true if the sample changed.
    pub fn apply(&self, sample: &mut WheelSample, event: &InputEvent) -> bool {
        let event_type = event.event_type();
        if event_type == EventType::ABSOLUTE {
            self.apply_absolute(sample, event.code(), event.value())
        } else if event_type == EventType::KEY {
            self.apply_key(sample, event.code(), event.value())
        } else {
            false
        }
    }

    fn apply_absolute(&self, sample: &mut WheelSample, code: u16, value: i32) -> bool {
        let config = &self.config;
        let previous = *sample;

        if code == config.steer_code {
            sample.position = normalize_range(value, config.position_min, config.position_max);
        } else if Some(code) == config.throttle_code {
            sample.throttle = self.pedal(value);
        } else if Some(code) == config.brake_code {
            sample.brake = self.pedal(value);
        } else {
            return false;
        }

        *sample != previous
    }

    fn apply_key(&self, sample: &mut WheelSample, code: u16, value: i32) -> bool {
        let Some(index) = code.checked_sub(self.config.button_base) else {
            return false;
        };
        if index >= 64 {
            return false;
        }

        let previous = sample.buttons;
        // value 2 is autorepeat, still held
        if value != 0 {
            sample.buttons |= 1u64 << index;
        } else {
            sample.buttons &= !(1u64 << index);
        }
        sample.buttons != previous
    }

    fn pedal(&self, value: i32) -> f32 {
        let unit = (normalize_range(value, self.config.pedal_min, self.config.pedal_max) + 1.0) * 0.5;
        if self.config.invert_pedals {
            1.0 - unit
        } else {
            unit
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Uninitialized,
    Connected,
    Disconnected,
}

#[machine]
pub struct DeviceSession<S: SessionState> {
    path: String,
    mapping: AxisMapping,
    // Single-slot holding cell written by the reader thread
    samples: Option<watch::Receiver<WheelSample>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    actuator: Option<Device>,
    effect: Option<FFEffect>,
    invert_torque: bool,
    last_level: i16,
}

impl<S: SessionState> DeviceSession<S> {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl DeviceSession<Uninitialized> {
    pub fn create(config: &InputConfiguration) -> Self {
        debug!("Creating device session for {}", config.device_path);
        Self::new(
            config.device_path.clone(),
            AxisMapping::new(&config.device_file),
            None,
            Arc::new(AtomicBool::new(false)),
            None,
            None,
            None,
            config.device_file.invert_torque,
            0,
        )
    }

    /// Opens the device file and starts the reader thread.
    pub fn connect(mut self) -> Result<DeviceSession<Connected>, WheelError> {
        info!("Opening wheel device file {}", self.path);
        let device = Device::open(&self.path).map_err(|e| WheelError::DeviceUnavailable {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        // the reader must come back to check the running flag on an idle wheel
        device
            .set_nonblocking(true)
            .map_err(|e| WheelError::Reader(e.to_string()))?;
        info!(
            "Opened {} ({})",
            self.path,
            device.name().unwrap_or("unnamed device")
        );

        let (sender, receiver) = watch::channel(WheelSample::default());
        self.running.store(true, Ordering::Release);

        let running = self.running.clone();
        let mapping = self.mapping.clone();
        let reader = thread::Builder::new()
            .name("wheel-reader".to_string())
            .spawn(move || {
                let mut device = device;
                let fetch = move || {
                    device
                        .fetch_events()
                        .map(|events| events.collect::<Vec<_>>())
                };
                run_reader(fetch, mapping, sender, running)
            })
            .map_err(|e| WheelError::Reader(e.to_string()))?;
        self.reader = Some(reader);
        self.samples = Some(receiver);

        match open_actuator(&self.path) {
            Ok((actuator, effect)) => {
                info!("Force feedback ready on {}", self.path);
                self.actuator = Some(actuator);
                self.effect = Some(effect);
            }
            Err(e) => warn!("{}, continuing without force feedback", e),
        }

        Ok(self.transition())
    }
}

impl DeviceSession<Connected> {
    /// Freshest sample from the reader thread; neutral until the first event arrives.
    pub fn sample(&self) -> WheelSample {
        self.samples
            .as_ref()
            .map(|samples| *samples.borrow())
            .unwrap_or_default()
    }

    pub fn is_alive(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn send_torque(&mut self, torque: f32) -> Result<(), WheelError> {
        let Some(effect) = self.effect.as_mut() else {
            return Ok(());
        };

        let mut level = torque_level(torque);
        if self.invert_torque {
            level = level.saturating_neg();
        }
        if level == self.last_level {
            return Ok(());
        }

        effect
            .update(constant_force(level))
            .map_err(|e| WheelError::ForceFeedback(e.to_string()))?;
        trace!("Torque level {} -> {}", self.last_level, level);
        self.last_level = level;
        Ok(())
    }

    /// Stops the reader and releases the actuator.
    pub fn close(mut self) -> DeviceSession<Disconnected> {
        info!("Closing wheel device {}", self.path);
        self.running.store(false, Ordering::Release);
        if let Some(effect) = self.effect.as_mut() {
            if let Err(e) = effect.update(constant_force(0)) {
                debug!("Failed to zero force feedback on close: {}", e);
            }
        }
        self.effect = None;
        self.actuator = None;
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Wheel reader thread for {} panicked", self.path);
            }
        }
        self.samples = None;
        self.transition()
    }
}

// Polls `fetch` until `running` clears or the source fails. `fetch` must not block.
fn run_reader<F>(
    mut fetch: F,
    mapping: AxisMapping,
    cell: watch::Sender<WheelSample>,
    running: Arc<AtomicBool>,
) where
    F: FnMut() -> io::Result<Vec<InputEvent>>,
{
    debug!("Wheel reader thread started");
    let mut sample = WheelSample::default();

    while running.load(Ordering::Acquire) {
        match fetch() {
            Ok(events) => {
                let mut changed = false;
                for event in events {
                    changed |= mapping.apply(&mut sample, &event);
                }
                if changed {
                    sample.captured_at = Some(Local::now());
                    cell.send_replace(sample);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(READER_BACKOFF);
            }
            Err(e) => {
                error!("{}", WheelError::Reader(e.to_string()));
                break;
            }
        }
    }

    running.store(false, Ordering::Release);
    debug!("Wheel reader thread stopped");
}

fn open_actuator(path: &str) -> Result<(Device, FFEffect), WheelError> {
    let mut actuator = Device::open(path).map_err(|e| WheelError::ForceFeedback(e.to_string()))?;

    if !actuator
        .supported_events()
        .contains(EventType::FORCEFEEDBACK)
    {
        return Err(WheelError::ForceFeedback(format!(
            "{} has no force feedback support",
            path
        )));
    }

    // The built-in spring would fight the aligning torque
    let autocenter_off = InputEvent::new(EventType::FORCEFEEDBACK.0, FF_AUTOCENTER, 0);
    if let Err(e) = actuator.send_events(&[autocenter_off]) {
        debug!("Could not disable autocenter: {}", e);
    }

    let mut effect = actuator
        .upload_ff_effect(constant_force(0))
        .map_err(|e| WheelError::ForceFeedback(e.to_string()))?;
    effect
        .play(1)
        .map_err(|e| WheelError::ForceFeedback(e.to_string()))?;

    Ok((actuator, effect))
}

/// Maps a normalized torque onto a constant-force level. Positive torque pushes toward
/// positive positions.
pub fn torque_level(torque: f32) -> i16 {
    let torque = if torque.is_nan() {
        0.0
    } else {
        torque.clamp(-1.0, 1.0)
    };
    (-torque * i16::MAX as f32).round() as i16
}

fn constant_force(level: i16) -> FFEffectData {
    FFEffectData {
        direction: FF_DIRECTION,
        trigger: FFTrigger {
            button: 0,
            interval: 0,
        },
        // zero length plays until stopped
        replay: FFReplay {
            length: 0,
            delay: 0,
        },
        kind: FFEffectKind::Constant {
            level,
            envelope: FFEnvelope {
                attack_length: 0,
                attack_level: 0,
                fade_length: 0,
                fade_level: 0,
            },
        },
    }
}

enum SessionSlot {
    Idle(DeviceSession<Uninitialized>),
    Open(DeviceSession<Connected>),
    Closed(DeviceSession<Disconnected>),
    Failed,
}

/// Steering wheel on a raw evdev device file.
pub struct DeviceFileWheel {
    name: String,
    slot: SessionSlot,
}

impl DeviceFileWheel {
    pub fn new(config: &InputConfiguration) -> Self {
        Self {
            name: format!("Steering wheel ({})", config.device_path),
            slot: SessionSlot::Idle(DeviceSession::create(config)),
        }
    }

    fn session(&self) -> Option<&DeviceSession<Connected>> {
        match &self.slot {
            SessionSlot::Open(session) => Some(session),
            _ => None,
        }
    }

    fn sample(&self) -> WheelSample {
        self.session()
            .map(DeviceSession::sample)
            .unwrap_or_default()
    }
}

impl WheelDevice for DeviceFileWheel {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> Platform {
        Platform::DeviceFile
    }

    fn initialize(&mut self) -> bool {
        self.slot = match mem::replace(&mut self.slot, SessionSlot::Failed) {
            SessionSlot::Idle(session) => match session.connect() {
                Ok(session) => SessionSlot::Open(session),
                Err(e) => {
                    error!("{}", e);
                    SessionSlot::Failed
                }
            },
            other => {
                warn!("Wheel device already initialized");
                other
            }
        };
        self.is_connected()
    }

    fn is_connected(&self) -> bool {
        self.session().is_some_and(DeviceSession::is_alive)
    }

    fn has_position_sensor(&self) -> bool {
        true
    }

    fn sample_position(&mut self) -> f32 {
        self.sample().position
    }

    fn sample_axis(&mut self, axis: InputAxis) -> f32 {
        let sample = self.sample();
        match axis {
            InputAxis::Steering => sample.position,
            InputAxis::Throttle => sample.throttle,
            InputAxis::Brake => sample.brake,
        }
    }

    fn is_button_pressed(&mut self, index: u8) -> bool {
        self.sample().is_pressed(index)
    }

    fn send_torque(&mut self, torque: f32) {
        if let SessionSlot::Open(session) = &mut self.slot {
            if let Err(e) = session.send_torque(torque) {
                debug!("{}", e);
            }
        }
    }

    fn close(&mut self) {
        self.slot = match mem::replace(&mut self.slot, SessionSlot::Failed) {
            SessionSlot::Open(session) => SessionSlot::Closed(session.close()),
            SessionSlot::Idle(_) | SessionSlot::Failed => SessionSlot::Failed,
            SessionSlot::Closed(session) => {
                debug!("Wheel device {} already closed", session.path());
                SessionSlot::Closed(session)
            }
        };
    }
}

impl Drop for DeviceFileWheel {
    fn drop(&mut self) {
        self.close();
    }
}
