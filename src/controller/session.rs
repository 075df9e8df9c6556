//! Capture session - owner of the single captured device
//!
//! The session is created once per process and shared through an `Arc` with
//! both background loops. It owns:
//!
//! - the device slot (state, acquired capture, generation) behind one mutex,
//!   the only state both loops touch
//! - a lifecycle lock serialising `start_capture` and `stop_capture`
//! - the stop handles of the scan and poll loops
//! - the outbound event channels
//!
//! # State Machine
//!
//! ```text
//!          start_capture                configure ok
//! Idle ───────────────► Acquiring ─────────────────► Attached
//!  ▲                        │                           │
//!  │     acquire refused    │                           │ stop_capture / poll error
//!  ├────────────────────────┘                           ▼
//!  └─────────────────────────────────────────────── Stopping
//!                         handle released
//! ```
//!
//! Every platform failure is absorbed into a transition back to `Idle`. The
//! only error that leaves this module is `DeviceUnavailable` (or `Disposed`)
//! from [`CaptureSession::start_capture`].

use crate::controller::capture::{Attached, DeviceCapture, PollTicket};
use crate::controller::controller_handle::{ControllerError, ControllerSettings};
use crate::controller::device::{BackendError, DeviceId, InputBackend, RawUpdate};
use crate::controller::events::{ButtonPressEvent, EventChannels};
use crate::controller::loops::{self, LoopHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observable lifecycle state of the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Attached,
    Stopping,
}

/// Outcome of one poll step
#[derive(Debug)]
pub(crate) enum PollStep {
    Updates(Vec<RawUpdate>),
    /// The capture this loop was started for no longer exists
    Detached,
    /// The platform failed; the device has been released
    Lost(ControllerError),
}

#[derive(Debug)]
struct DeviceSlot {
    state: SessionState,
    capture: Option<DeviceCapture<Attached>>,
    generation: u64,
}

pub struct CaptureSession {
    backend: Arc<dyn InputBackend>,
    settings: ControllerSettings,
    slot: Mutex<DeviceSlot>,
    lifecycle: tokio::sync::Mutex<()>,
    poll_loop: Mutex<Option<LoopHandle>>,
    scan_loop: Mutex<Option<LoopHandle>>,
    channels: EventChannels,
    disposed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn InputBackend>, settings: ControllerSettings) -> Arc<Self> {
        info!("Creating capture session with settings: {:?}", settings);
        Arc::new(Self {
            backend,
            settings,
            slot: Mutex::new(DeviceSlot {
                state: SessionState::Idle,
                capture: None,
                generation: 0,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            poll_loop: Mutex::new(None),
            scan_loop: Mutex::new(None),
            channels: EventChannels::default(),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn backend(&self) -> &dyn InputBackend {
        self.backend.as_ref()
    }

    pub fn channels(&self) -> &EventChannels {
        &self.channels
    }

    /// Receiver for classified button presses
    pub fn subscribe(&self) -> broadcast::Receiver<ButtonPressEvent> {
        self.channels.subscribe_button_pressed()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.slot).state
    }

    /// Device currently held, whether or not it still responds
    pub fn attached_device(&self) -> Option<DeviceId> {
        lock(&self.slot)
            .capture
            .as_ref()
            .map(|capture| capture.device().clone())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// True if a device is held and answers the liveness probe
    pub fn is_attached(&self) -> bool {
        let Some(ticket) = self.attached_ticket(None) else {
            return false;
        };
        match ticket.probe(self.backend.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                debug!("Liveness probe for {} failed: {}", ticket.device(), e);
                false
            }
        }
    }

    /// Starts the scan loop unless it is already running
    pub fn start_joystick_support(self: &Arc<Self>) {
        if self.is_disposed() {
            warn!("Ignoring joystick support start on a disposed session");
            return;
        }

        let mut scan_loop = lock(&self.scan_loop);
        if scan_loop.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Scan loop already running");
            return;
        }

        info!("Starting joystick support");
        *scan_loop = Some(loops::spawn_scan_loop(self.clone()));
    }

    /// Acquires `device` and starts polling it
    ///
    /// A capture that is still held is stopped first. On failure the session is
    /// back in `Idle` and no poll loop runs.
    pub async fn start_capture(self: &Arc<Self>, device: &DeviceId) -> Result<(), ControllerError> {
        self.start_capture_guarded(device, None).await
    }

    pub(crate) async fn start_capture_from_scan(
        self: &Arc<Self>,
        device: &DeviceId,
        scan_stop: &CancellationToken,
    ) -> Result<(), ControllerError> {
        self.start_capture_guarded(device, Some(scan_stop)).await
    }

    async fn start_capture_guarded(
        self: &Arc<Self>,
        device: &DeviceId,
        scan_stop: Option<&CancellationToken>,
    ) -> Result<(), ControllerError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_disposed() {
            return Err(ControllerError::Disposed);
        }
        // The scan loop may have been stopped while it waited for the lock
        if scan_stop.is_some_and(CancellationToken::is_cancelled) {
            debug!("Scan loop stopped, not capturing {}", device);
            return Ok(());
        }

        self.halt_poll_and_release().await;

        let generation = {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            slot.state = SessionState::Acquiring;

            let acquired = DeviceCapture::acquire(self.backend.as_ref(), device, slot.generation)
                .and_then(|capture| {
                    capture.configure(self.backend.as_ref(), self.settings.buffer_size)
                });

            match acquired {
                Ok(capture) => {
                    slot.capture = Some(capture);
                    slot.state = SessionState::Attached;
                    slot.generation
                }
                Err(source) => {
                    slot.state = SessionState::Idle;
                    let error = ControllerError::DeviceUnavailable {
                        device: device.clone(),
                        source,
                    };
                    warn!("{}", error);
                    return Err(error);
                }
            }
        };

        let poll = loops::spawn_poll_loop(self.clone(), generation);
        *lock(&self.poll_loop) = Some(poll);

        info!("Capturing device {} (generation {})", device, generation);
        Ok(())
    }

    /// Stops polling and releases the device
    ///
    /// With `stop_scanning_too` the scan loop is stopped as well, so no new
    /// device is captured until [`start_joystick_support`] is called again.
    /// Calling this without a captured device only affects the scan loop.
    ///
    /// [`start_joystick_support`]: CaptureSession::start_joystick_support
    pub async fn stop_capture(&self, stop_scanning_too: bool) {
        let scan = if stop_scanning_too {
            let scan = lock(&self.scan_loop).take();
            // Cancel before queueing on the lifecycle lock so a scan tick
            // waiting for it backs off
            if let Some(handle) = &scan {
                handle.cancel();
            }
            scan
        } else {
            None
        };

        {
            let _lifecycle = self.lifecycle.lock().await;
            self.halt_poll_and_release().await;
        }

        if let Some(handle) = scan {
            handle.stop(self.settings.stop_timeout()).await;
            info!("Joystick scanning stopped");
        }
    }

    /// Stops everything and frees the platform resources; later calls do nothing
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Capture session already disposed");
            return;
        }

        info!("Disposing capture session");
        self.stop_capture(true).await;
        self.backend.shutdown();
        info!("Capture session disposed");
    }

    // Caller holds the lifecycle lock
    async fn halt_poll_and_release(&self) {
        let poll = lock(&self.poll_loop).take();
        if let Some(handle) = poll {
            handle.stop(self.settings.stop_timeout()).await;
        }

        // Released even if the loop had to be aborted
        let mut slot = lock(&self.slot);
        self.release_locked(&mut slot);
    }

    fn release_locked(&self, slot: &mut DeviceSlot) {
        if let Some(capture) = slot.capture.take() {
            slot.state = SessionState::Stopping;
            capture.begin_stop().release(self.backend.as_ref());
        }
        slot.state = SessionState::Idle;
    }

    // Ticket for the attached capture, optionally only for one generation
    fn attached_ticket(&self, generation: Option<u64>) -> Option<PollTicket> {
        let slot = lock(&self.slot);
        if slot.state != SessionState::Attached {
            return None;
        }
        let ticket = slot
            .capture
            .as_ref()
            .filter(|capture| generation.map_or(true, |g| capture.generation() == g))
            .map(|capture| capture.ticket());
        ticket
    }

    /// One poll step for the loop started with `generation`
    ///
    /// The platform call runs on the blocking pool without the slot lock, so
    /// a stopping caller that gave up waiting can release the device while the
    /// call is still in flight. The result is only used if the capture is
    /// still the one the loop was started for.
    pub(crate) async fn poll_attached(&self, generation: u64) -> PollStep {
        let Some(ticket) = self.attached_ticket(Some(generation)) else {
            return PollStep::Detached;
        };

        let backend = self.backend.clone();
        let device = ticket.device().clone();
        let polled = tokio::task::spawn_blocking(move || ticket.poll(backend.as_ref()))
            .await
            .unwrap_or_else(|e| Err(BackendError::Platform(e.to_string())));

        let mut slot = lock(&self.slot);
        let current = slot.state == SessionState::Attached
            && slot
                .capture
                .as_ref()
                .is_some_and(|capture| capture.generation() == generation);
        if !current {
            if let Ok(updates) = &polled {
                debug!("Discarding {} update(s) of a released capture", updates.len());
            }
            return PollStep::Detached;
        }

        match polled {
            Ok(updates) => PollStep::Updates(updates),
            Err(source) => {
                self.release_locked(&mut slot);
                PollStep::Lost(ControllerError::DeviceLost { device, source })
            }
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
