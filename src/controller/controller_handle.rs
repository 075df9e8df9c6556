//! Controller Handle - entry point of the joystick subsystem
//!
//! Wires the platform backend, the capture session and its background loops
//! together. The UI only talks to this handle and to the session it exposes.
//!

use crate::controller::device::{BackendError, DeviceId, InputBackend};
use crate::controller::events::ButtonPressEvent;
use crate::controller::gilrs_backend::GilrsBackend;
use crate::controller::session::CaptureSession;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Timing and buffering of the joystick subsystem
///
/// # Examples
///
/// ```rust
/// use tr1launcher::controller::ControllerSettings;
///
/// // Snappier polling for a wired pad
/// let settings = ControllerSettings {
///     poll_interval_ms: 100,
///     ..ControllerSettings::default()
/// };
/// assert_eq!(settings.buffer_size, 128);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Pause between two device scans while nothing is captured
    pub scan_interval_ms: u64,

    /// Pause between two drains of the captured device
    pub poll_interval_ms: u64,

    /// How long a stopping caller waits for a loop to exit before releasing
    /// the device anyway
    pub stop_timeout_ms: u64,

    /// Updates queued by the platform between two drains
    pub buffer_size: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 500,
            poll_interval_ms: 250,
            stop_timeout_ms: 250,
            buffer_size: 128,
        }
    }
}

impl ControllerSettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Errors of the joystick subsystem
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The platform refused to hand out the device. Expected when a pad is
    /// unplugged between enumeration and acquisition; the scan loop retries.
    #[error("Device {device} is unavailable: {source}")]
    DeviceUnavailable {
        device: DeviceId,
        #[source]
        source: BackendError,
    },

    /// Polling failed; the capture has been dropped
    #[error("Device {device} was lost: {source}")]
    DeviceLost {
        device: DeviceId,
        #[source]
        source: BackendError,
    },

    #[error("Capture session has been disposed")]
    Disposed,

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Handle for the complete joystick subsystem
///
/// Creating the handle starts the scan loop right away; a controller plugged
/// in at any later point is picked up within one scan interval.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    session: Arc<CaptureSession>,
}

impl ControllerHandle {
    /// Spawns the subsystem on top of gilrs
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(settings: Option<ControllerSettings>) -> Result<Self, ControllerError> {
        info!("Initializing controller system with settings: {:?}", settings);

        let backend = GilrsBackend::new()
            .map_err(|e| ControllerError::InitializationError(e.to_string()))?;
        debug!("Gilrs backend ready");

        Ok(Self::with_backend(Arc::new(backend), settings))
    }

    /// Spawns the subsystem on top of any input backend
    pub fn with_backend(
        backend: Arc<dyn InputBackend>,
        settings: Option<ControllerSettings>,
    ) -> Self {
        let session = CaptureSession::new(backend, settings.unwrap_or_default());
        session.start_joystick_support();

        info!("Controller system initialized successfully");
        Self { session }
    }

    pub fn session(&self) -> Arc<CaptureSession> {
        self.session.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ButtonPressEvent> {
        self.session.subscribe()
    }

    pub async fn stop_capture(&self, stop_scanning_too: bool) {
        self.session.stop_capture(stop_scanning_too).await;
    }

    pub async fn dispose(&self) {
        self.session.dispose().await;
    }
}
