//! Platform boundary for joystick input
//!
//! Everything the capture session knows about hardware goes through the
//! [`InputBackend`] trait: enumerate, acquire, configure, probe, poll, drain and
//! release. The types here mirror the buffered-input model of classic joystick
//! APIs: each change on the device is reported as a [`RawUpdate`] carrying a
//! byte offset into the joystick state block and an integer value.
//!
//! # Offset layout
//!
//! ```text
//!  0  X            16 RotationY     32 PointOfViewControllers0
//!  4  Y            20 RotationZ     36..44 PointOfViewControllers1..3
//!  8  Z            24 Sliders0      48..=175 Buttons0..Buttons127
//! 12  RotationX    28 Sliders1
//! ```

use chrono::{DateTime, Local};
use std::fmt;

/// Byte offset of the first digital button
pub const BUTTONS_OFFSET: i32 = 48;

/// Number of digital buttons a device can report
pub const BUTTON_COUNT: i32 = 128;

/// Byte offset of the first POV/hat controller
pub const POV_OFFSET: i32 = 32;

/// Stable identifier of an attached device
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id is reported by some drivers for half-initialised devices
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Device category queried during enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceCategory {
    Gamepad,
    Joystick,
}

/// Snapshot of one attached device as reported by enumeration
#[derive(Clone, Debug)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for DeviceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceDescriptor {}

/// Token for an acquired device, handed out by [`InputBackend::acquire`]
///
/// The token is only meaningful to the backend that issued it. Once released,
/// a backend must reject it (and every copy of it) with
/// [`BackendError::InvalidHandle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    device: DeviceId,
    token: u64,
}

impl DeviceHandle {
    pub fn new(device: DeviceId, token: u64) -> Self {
        Self { device, token }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Semantic name of a raw state offset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoystickOffset {
    X,
    Y,
    Z,
    RotationX,
    RotationY,
    RotationZ,
    Slider(u8),
    PointOfView(u8),
    Button(u8),
}

impl JoystickOffset {
    /// Resolves a raw byte offset, `None` for offsets outside the state block
    pub fn from_raw(raw: i32) -> Option<Self> {
        if (BUTTONS_OFFSET..BUTTONS_OFFSET + BUTTON_COUNT).contains(&raw) {
            return Some(Self::Button((raw - BUTTONS_OFFSET) as u8));
        }
        if raw < 0 || raw % 4 != 0 {
            return None;
        }
        match raw {
            0 => Some(Self::X),
            4 => Some(Self::Y),
            8 => Some(Self::Z),
            12 => Some(Self::RotationX),
            16 => Some(Self::RotationY),
            20 => Some(Self::RotationZ),
            24 | 28 => Some(Self::Slider(((raw - 24) / 4) as u8)),
            32..=44 => Some(Self::PointOfView(((raw - POV_OFFSET) / 4) as u8)),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::X => 0,
            Self::Y => 4,
            Self::Z => 8,
            Self::RotationX => 12,
            Self::RotationY => 16,
            Self::RotationZ => 20,
            Self::Slider(n) => 24 + 4 * i32::from(n),
            Self::PointOfView(n) => POV_OFFSET + 4 * i32::from(n),
            Self::Button(n) => BUTTONS_OFFSET + i32::from(n),
        }
    }

    pub fn is_button(self) -> bool {
        matches!(self, Self::Button(n) if i32::from(n) < BUTTON_COUNT)
    }
}

impl fmt::Display for JoystickOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("X"),
            Self::Y => f.write_str("Y"),
            Self::Z => f.write_str("Z"),
            Self::RotationX => f.write_str("RotationX"),
            Self::RotationY => f.write_str("RotationY"),
            Self::RotationZ => f.write_str("RotationZ"),
            Self::Slider(n) => write!(f, "Sliders{}", n),
            Self::PointOfView(n) => write!(f, "PointOfViewControllers{}", n),
            Self::Button(n) => write!(f, "Buttons{}", n),
        }
    }
}

/// One buffered change record drained from an acquired device
#[derive(Clone, Debug)]
pub struct RawUpdate {
    pub offset: JoystickOffset,
    pub value: i32,
    pub timestamp: DateTime<Local>,
}

impl RawUpdate {
    pub fn new(offset: JoystickOffset, value: i32) -> Self {
        Self::at(offset, value, Local::now())
    }

    pub fn at(offset: JoystickOffset, value: i32, timestamp: DateTime<Local>) -> Self {
        Self {
            offset,
            value,
            timestamp,
        }
    }

    pub fn raw_offset(&self) -> i32 {
        self.offset.raw()
    }

    pub fn offset_name(&self) -> String {
        self.offset.to_string()
    }
}

/// Errors reported by an [`InputBackend`]
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Device not found: {0}")]
    NotFound(DeviceId),

    #[error("Acquisition refused for {device}: {reason}")]
    Refused { device: DeviceId, reason: String },

    #[error("Device disconnected: {0}")]
    Disconnected(DeviceId),

    #[error("Device handle is no longer valid")]
    InvalidHandle,

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Device input subsystem used by the capture session
///
/// Implementations synchronise internally; every method takes `&self` so a
/// single backend can be shared between the scan and poll loops.
pub trait InputBackend: Send + Sync {
    /// Lists connected devices of one category in platform order
    fn list_devices(&self, category: DeviceCategory)
        -> Result<Vec<DeviceDescriptor>, BackendError>;

    /// Acquires exclusive access to a device
    fn acquire(&self, device: &DeviceId) -> Result<DeviceHandle, BackendError>;

    /// Sets how many updates are queued between two drains
    fn set_buffer_size(&self, handle: &DeviceHandle, size: usize) -> Result<(), BackendError>;

    /// Liveness check, reads no input
    fn probe(&self, handle: &DeviceHandle) -> Result<(), BackendError>;

    /// Refreshes the device state and fills the update buffer
    fn poll(&self, handle: &DeviceHandle) -> Result<(), BackendError>;

    /// Returns the buffered updates since the previous drain, oldest first
    fn drain(&self, handle: &DeviceHandle) -> Result<Vec<RawUpdate>, BackendError>;

    /// Gives up the device; never fails
    fn release(&self, handle: DeviceHandle);

    /// Releases every platform resource held by the backend
    fn shutdown(&self) {}
}
