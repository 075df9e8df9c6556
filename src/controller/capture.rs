//! Typestate wrapper around one acquired device handle
//!
//! ```text
//! Acquiring ──configure──► Attached ──begin_stop──► Stopping ──release──► (gone)
//!     │
//!     └── configure fails: handle released, error returned
//! ```
//!
//! Only [`DeviceCapture<Attached>`] hands out [`PollTicket`]s, so a handle that
//! is still being configured can never feed the classifier. A ticket is a copy
//! of the handle for one poll outside the session lock; once the capture is
//! released the backend rejects it.

use crate::controller::device::{BackendError, DeviceHandle, DeviceId, InputBackend, RawUpdate};
use statum::{machine, state};
use tracing::{debug, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum CaptureState {
    Acquiring,
    Attached,
    Stopping,
}

#[machine]
#[derive(Debug)]
pub struct DeviceCapture<S: CaptureState> {
    // Device the handle was acquired for
    device: DeviceId,

    // Backend token, released exactly once
    handle: DeviceHandle,

    // Session generation this capture belongs to
    generation: u64,
}

impl<S: CaptureState> DeviceCapture<S> {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl DeviceCapture<Acquiring> {
    pub fn acquire(
        backend: &dyn InputBackend,
        device: &DeviceId,
        generation: u64,
    ) -> Result<Self, BackendError> {
        debug!("Acquiring device {} (generation {})", device, generation);
        let handle = backend.acquire(device)?;
        Ok(Self::new(device.clone(), handle, generation))
    }

    /// Sets the buffer depth and exposes the handle for polling
    pub fn configure(
        self,
        backend: &dyn InputBackend,
        buffer_size: usize,
    ) -> Result<DeviceCapture<Attached>, BackendError> {
        if let Err(e) = backend.set_buffer_size(&self.handle, buffer_size) {
            warn!("Failed to configure buffer for {}: {}", self.device, e);
            backend.release(self.handle);
            return Err(e);
        }

        info!(
            "Device {} attached with buffer size {}",
            self.device, buffer_size
        );
        Ok(self.transition())
    }
}

impl DeviceCapture<Attached> {
    pub fn ticket(&self) -> PollTicket {
        PollTicket {
            device: self.device.clone(),
            handle: self.handle.clone(),
            generation: self.generation,
        }
    }

    pub fn begin_stop(self) -> DeviceCapture<Stopping> {
        debug!("Stopping capture of {}", self.device);
        self.transition()
    }
}

impl DeviceCapture<Stopping> {
    pub fn release(self, backend: &dyn InputBackend) {
        info!("Releasing device {}", self.device);
        backend.release(self.handle);
    }
}

/// Copy of an attached handle, valid until the capture is released
#[derive(Debug, Clone)]
pub struct PollTicket {
    device: DeviceId,
    handle: DeviceHandle,
    generation: u64,
}

impl PollTicket {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn probe(&self, backend: &dyn InputBackend) -> Result<(), BackendError> {
        backend.probe(&self.handle)
    }

    /// Polls the device and drains everything buffered since the last call
    pub fn poll(&self, backend: &dyn InputBackend) -> Result<Vec<RawUpdate>, BackendError> {
        backend.poll(&self.handle)?;
        backend.drain(&self.handle)
    }
}
