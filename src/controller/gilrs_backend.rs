//! Input backend on top of gilrs
//!
//! gilrs delivers one event queue for all pads. This backend pumps that queue
//! whenever it is touched, keeps the events of the acquired pad in a bounded
//! FIFO and re-expresses them in the buffered offset/value model the capture
//! session works with:
//!
//! | gilrs                       | offset                      | value                    |
//! |-----------------------------|-----------------------------|--------------------------|
//! | face/shoulder/menu buttons  | `Buttons0..Buttons14`       | 128 pressed, 0 released  |
//! | unnamed buttons (joysticks) | `Buttons15..`, first seen   | 128 pressed, 0 released  |
//! | D-pad buttons or axes       | `PointOfViewControllers0`   | 0..31500 by 4500, -1     |
//! | left stick                  | `X`, `Y`                    | 0..=65535, 0 = left/up   |
//! | right stick                 | `RotationX`, `RotationY`    | 0..=65535, 0 = left/up   |
//! | analog Z axes               | `Z`, `RotationZ`            | 0..=65535                |
//!
//! Devices without a gilrs mapping report their buttons as `Button::Unknown`
//! and their hat as the `DPadX`/`DPadY` axes; both are covered above.

use crate::controller::classifier::{
    BUTTON_PRESSED_VALUE, POV_DOWN_VALUE, POV_LEFT_VALUE, POV_RIGHT_VALUE, POV_UP_VALUE,
};
use crate::controller::device::{
    BackendError, DeviceCategory, DeviceDescriptor, DeviceHandle, DeviceId, InputBackend,
    JoystickOffset, RawUpdate, BUTTON_COUNT,
};
use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs, MappingSource};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Value of a centred hat
pub const POV_CENTERED_VALUE: i32 = -1;

/// First `Buttons` index handed to buttons gilrs has no name for
pub const FIRST_UNNAMED_BUTTON: u8 = 15;

const DEFAULT_BUFFER_SIZE: usize = 128;

// Axis deflection at which a DPad axis counts as pressed
const DPAD_AXIS_THRESHOLD: f32 = 0.5;

/// Held directions of the hat, fed by D-pad buttons or DPad axes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct HatState {
    up: bool,
    right: bool,
    down: bool,
    left: bool,
}

impl HatState {
    /// Returns false if `button` is not part of the D-pad
    fn set_button(&mut self, button: Button, pressed: bool) -> bool {
        match button {
            Button::DPadUp => self.up = pressed,
            Button::DPadRight => self.right = pressed,
            Button::DPadDown => self.down = pressed,
            Button::DPadLeft => self.left = pressed,
            _ => return false,
        }
        true
    }

    /// Returns false if `axis` is not a DPad axis
    fn set_axis(&mut self, axis: Axis, value: f32) -> bool {
        let negative = value <= -DPAD_AXIS_THRESHOLD;
        let positive = value >= DPAD_AXIS_THRESHOLD;
        match axis {
            Axis::DPadX => {
                self.left = negative;
                self.right = positive;
            }
            // Up is positive, like the sticks
            Axis::DPadY => {
                self.down = negative;
                self.up = positive;
            }
            _ => return false,
        }
        true
    }

    /// Hat angle in hundredths of a degree, clockwise from up
    fn value(&self) -> i32 {
        let vertical = i8::from(self.up) - i8::from(self.down);
        let horizontal = i8::from(self.right) - i8::from(self.left);
        match (vertical, horizontal) {
            (1, 0) => POV_UP_VALUE,
            (1, 1) => 4500,
            (0, 1) => POV_RIGHT_VALUE,
            (-1, 1) => 13500,
            (-1, 0) => POV_DOWN_VALUE,
            (-1, -1) => 22500,
            (0, -1) => POV_LEFT_VALUE,
            (1, -1) => 31500,
            _ => POV_CENTERED_VALUE,
        }
    }
}

/// `Buttons` indices for unnamed buttons, assigned in order of first use
#[derive(Debug)]
struct UnnamedButtons {
    assigned: HashMap<u32, u8>,
    next: u8,
}

impl Default for UnnamedButtons {
    fn default() -> Self {
        Self {
            assigned: HashMap::new(),
            next: FIRST_UNNAMED_BUTTON,
        }
    }
}

impl UnnamedButtons {
    fn index_for(&mut self, code: u32) -> Option<u8> {
        if let Some(index) = self.assigned.get(&code) {
            return Some(*index);
        }
        if i32::from(self.next) >= BUTTON_COUNT {
            debug!("No Buttons slot left for code {}", code);
            return None;
        }
        let index = self.next;
        self.next += 1;
        self.assigned.insert(code, index);
        Some(index)
    }
}

/// Per-device translation of gilrs events into raw updates
#[derive(Debug, Default)]
struct InputTranslator {
    hat: HatState,
    unnamed: UnnamedButtons,
}

impl InputTranslator {
    fn translate(&mut self, event: EventType, timestamp: DateTime<Local>) -> Option<RawUpdate> {
        match event {
            EventType::ButtonPressed(button, code) => {
                self.button(button, code.into_u32(), true, timestamp)
            }
            EventType::ButtonReleased(button, code) => {
                self.button(button, code.into_u32(), false, timestamp)
            }
            EventType::AxisChanged(axis, value, _) => self.axis(axis, value, timestamp),
            _ => None,
        }
    }

    fn button(
        &mut self,
        button: Button,
        code: u32,
        pressed: bool,
        timestamp: DateTime<Local>,
    ) -> Option<RawUpdate> {
        let before = self.hat;
        if self.hat.set_button(button, pressed) {
            return self.hat_update(before, timestamp);
        }

        let index = match button_index(button) {
            Some(index) => index,
            None if button == Button::Unknown => self.unnamed.index_for(code)?,
            None => return None,
        };
        let value = if pressed { BUTTON_PRESSED_VALUE } else { 0 };
        Some(RawUpdate::at(JoystickOffset::Button(index), value, timestamp))
    }

    fn axis(&mut self, axis: Axis, value: f32, timestamp: DateTime<Local>) -> Option<RawUpdate> {
        let before = self.hat;
        if self.hat.set_axis(axis, value) {
            return self.hat_update(before, timestamp);
        }
        axis_update(axis, value, timestamp)
    }

    // Only actual direction changes are reported
    fn hat_update(&self, before: HatState, timestamp: DateTime<Local>) -> Option<RawUpdate> {
        let value = self.hat.value();
        if value == before.value() {
            return None;
        }
        Some(RawUpdate::at(JoystickOffset::PointOfView(0), value, timestamp))
    }
}

#[derive(Debug)]
struct AcquiredGamepad {
    token: u64,
    device: DeviceId,
    gamepad: GamepadId,
    buffer: VecDeque<RawUpdate>,
    capacity: usize,
    disconnected: bool,
    translator: InputTranslator,
}

impl AcquiredGamepad {
    // Oldest entries are dropped on overflow
    fn push(&mut self, update: RawUpdate) {
        while self.buffer.len() >= self.capacity.max(1) {
            self.buffer.pop_front();
        }
        self.buffer.push_back(update);
    }
}

struct GilrsState {
    gilrs: Gilrs,
    known: HashMap<DeviceId, GamepadId>,
    acquired: Option<AcquiredGamepad>,
    next_token: u64,
}

pub struct GilrsBackend {
    state: Mutex<GilrsState>,
}

impl GilrsBackend {
    pub fn new() -> Result<Self, BackendError> {
        info!("Initializing gilrs controller interface");
        let gilrs = usable_gilrs(Gilrs::new())?;

        Ok(Self {
            state: Mutex::new(GilrsState {
                gilrs,
                known: HashMap::new(),
                acquired: None,
                next_token: 1,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GilrsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// gilrs hands back a working (if device-less) instance when the platform has
// no input support
fn usable_gilrs(result: Result<Gilrs, gilrs::Error>) -> Result<Gilrs, BackendError> {
    match result {
        Ok(gilrs) => {
            info!("Successfully initialized gilrs");
            Ok(gilrs)
        }
        Err(gilrs::Error::NotImplemented(gilrs)) => {
            warn!("Gamepads are not supported on this platform, no controller will be found");
            Ok(gilrs)
        }
        Err(e) => {
            error!("Failed to initialize gilrs: {}", e);
            Err(BackendError::Platform(e.to_string()))
        }
    }
}

impl GilrsState {
    // Drains the gilrs queue, keeping what belongs to the acquired pad
    fn pump(&mut self) {
        while let Some(Event { id, event, time, .. }) = self.gilrs.next_event() {
            let Some(acquired) = self.acquired.as_mut() else {
                continue;
            };
            if id != acquired.gamepad {
                continue;
            }

            if matches!(event, EventType::Disconnected) {
                warn!("Gamepad {} disconnected", acquired.device);
                acquired.disconnected = true;
                continue;
            }

            let timestamp = DateTime::<Local>::from(time);
            if let Some(update) = acquired.translator.translate(event, timestamp) {
                acquired.push(update);
            }
        }
    }

    fn acquired_for(&mut self, handle: &DeviceHandle) -> Result<&mut AcquiredGamepad, BackendError> {
        match self.acquired.as_mut() {
            Some(acquired) if acquired.token == handle.token() => Ok(acquired),
            _ => Err(BackendError::InvalidHandle),
        }
    }

    fn check_connected(&mut self, handle: &DeviceHandle) -> Result<GamepadId, BackendError> {
        let (gamepad, disconnected, device) = {
            let acquired = self.acquired_for(handle)?;
            (acquired.gamepad, acquired.disconnected, acquired.device.clone())
        };
        if disconnected || self.gilrs.connected_gamepad(gamepad).is_none() {
            return Err(BackendError::Disconnected(device));
        }
        Ok(gamepad)
    }
}

fn device_id(gamepad_id: GamepadId, uuid: [u8; 16]) -> DeviceId {
    let uuid: String = uuid.iter().map(|b| format!("{:02x}", b)).collect();
    DeviceId::new(format!("{}:{}", uuid, gamepad_id))
}

fn category_of(source: MappingSource) -> DeviceCategory {
    match source {
        MappingSource::None => DeviceCategory::Joystick,
        _ => DeviceCategory::Gamepad,
    }
}

// Only pads connected at the last enumeration can be acquired
fn known_devices<K>(connected: Vec<(DeviceId, K)>) -> HashMap<DeviceId, K> {
    connected.into_iter().collect()
}

impl InputBackend for GilrsBackend {
    fn list_devices(
        &self,
        category: DeviceCategory,
    ) -> Result<Vec<DeviceDescriptor>, BackendError> {
        let mut state = self.lock();
        state.pump();

        let mut found = Vec::new();
        let mut connected = Vec::new();
        for (id, gamepad) in state.gilrs.gamepads() {
            if !gamepad.is_connected() {
                continue;
            }
            let device = device_id(id, gamepad.uuid());
            connected.push((device.clone(), id));
            if category_of(gamepad.mapping_source()) == category {
                debug!("  {:?} {}: {}", category, device, gamepad.name());
                found.push(DeviceDescriptor::new(device, gamepad.name()));
            }
        }
        state.known = known_devices(connected);

        Ok(found)
    }

    fn acquire(&self, device: &DeviceId) -> Result<DeviceHandle, BackendError> {
        let mut state = self.lock();
        state.pump();

        if let Some(current) = &state.acquired {
            return Err(BackendError::Refused {
                device: device.clone(),
                reason: format!("{} is already acquired", current.device),
            });
        }

        let gamepad = *state
            .known
            .get(device)
            .ok_or_else(|| BackendError::NotFound(device.clone()))?;
        if state.gilrs.connected_gamepad(gamepad).is_none() {
            return Err(BackendError::NotFound(device.clone()));
        }

        let token = state.next_token;
        state.next_token += 1;
        state.acquired = Some(AcquiredGamepad {
            token,
            device: device.clone(),
            gamepad,
            buffer: VecDeque::with_capacity(DEFAULT_BUFFER_SIZE),
            capacity: DEFAULT_BUFFER_SIZE,
            disconnected: false,
            translator: InputTranslator::default(),
        });

        info!("Acquired gamepad {} as {}", gamepad, device);
        Ok(DeviceHandle::new(device.clone(), token))
    }

    fn set_buffer_size(&self, handle: &DeviceHandle, size: usize) -> Result<(), BackendError> {
        if size == 0 {
            return Err(BackendError::Platform("buffer size must not be zero".into()));
        }
        let mut state = self.lock();
        let acquired = state.acquired_for(handle)?;
        acquired.capacity = size;
        while acquired.buffer.len() > size {
            acquired.buffer.pop_front();
        }
        Ok(())
    }

    fn probe(&self, handle: &DeviceHandle) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.check_connected(handle).map(|_| ())
    }

    fn poll(&self, handle: &DeviceHandle) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.acquired_for(handle)?;
        state.pump();
        state.check_connected(handle).map(|_| ())
    }

    fn drain(&self, handle: &DeviceHandle) -> Result<Vec<RawUpdate>, BackendError> {
        let mut state = self.lock();
        let acquired = state.acquired_for(handle)?;
        Ok(acquired.buffer.drain(..).collect())
    }

    fn release(&self, handle: DeviceHandle) {
        let mut state = self.lock();
        if state
            .acquired
            .as_ref()
            .is_some_and(|acquired| acquired.token == handle.token())
        {
            state.acquired = None;
            info!("Released gamepad {}", handle.device());
        } else {
            debug!("Ignoring release of stale handle for {}", handle.device());
        }
    }

    fn shutdown(&self) {
        let mut state = self.lock();
        state.acquired = None;
        state.known.clear();
        info!("Gilrs backend shut down");
    }
}

/// Button index in the classic pad layout (A, B, X, Y, LB, RB, Back, Start, ...)
fn button_index(button: Button) -> Option<u8> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::LeftTrigger => Some(4),
        Button::RightTrigger => Some(5),
        Button::Select => Some(6),
        Button::Start => Some(7),
        Button::LeftThumb => Some(8),
        Button::RightThumb => Some(9),
        Button::Mode => Some(10),
        Button::LeftTrigger2 => Some(11),
        Button::RightTrigger2 => Some(12),
        Button::C => Some(13),
        Button::Z => Some(14),
        _ => None,
    }
}

fn axis_update(axis: Axis, value: f32, timestamp: DateTime<Local>) -> Option<RawUpdate> {
    // gilrs reports up as positive, the buffered model reports up as 0
    let (offset, inverted) = match axis {
        Axis::LeftStickX => (JoystickOffset::X, false),
        Axis::LeftStickY => (JoystickOffset::Y, true),
        Axis::LeftZ => (JoystickOffset::Z, false),
        Axis::RightStickX => (JoystickOffset::RotationX, false),
        Axis::RightStickY => (JoystickOffset::RotationY, true),
        Axis::RightZ => (JoystickOffset::RotationZ, false),
        _ => return None,
    };
    Some(RawUpdate::at(offset, axis_to_raw(value, inverted), timestamp))
}

/// Maps -1.0..=1.0 onto 0..=65535
fn axis_to_raw(value: f32, inverted: bool) -> i32 {
    let value = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    let value = if inverted { -value } else { value };
    ((value + 1.0) / 2.0 * 65535.0).round() as i32
}
