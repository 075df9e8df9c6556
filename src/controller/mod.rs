//! Controller subsystem for gamepad input handling
//!
//! Finds a gamepad, captures it and turns its buffered input into a small set
//! of semantic button presses:
//!
//! 1. [`enumerator`] - Lists attached gamepads and joysticks
//! 2. [`session`] - Capture lifecycle and the scan/poll loops
//! 3. [`classifier`] - Raw update to button press
//! 4. [`controller_handle`] - Unified API and wiring
//!
//! # Architecture
//!
//! ```text
//! Scan Loop ──► Enumerator ──► CaptureSession::start_capture
//!                                     │
//! Poll Loop ──► poll/drain ──► Classifier ──► ButtonPressEvent ──► subscribers
//! ```
//!
//! The scan loop ticks every 500ms while nothing is captured, the poll loop
//! every 250ms while a device is captured.

pub mod capture;
pub mod classifier;
pub mod controller_handle;
pub mod device;
pub mod enumerator;
pub mod events;
pub mod gilrs_backend;
mod loops;
pub mod session;

pub use crate::controller::controller_handle::{
    ControllerError, ControllerHandle, ControllerSettings,
};
pub use crate::controller::device::{
    BackendError, DeviceCategory, DeviceDescriptor, DeviceHandle, DeviceId, InputBackend,
    JoystickOffset, RawUpdate,
};
pub use crate::controller::events::{ButtonPressEvent, EventChannels};
pub use crate::controller::gilrs_backend::GilrsBackend;
pub use crate::controller::session::{CaptureSession, SessionState};
