#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tr1launcher::controller::{
    BackendError, ControllerSettings, DeviceCategory, DeviceDescriptor, DeviceHandle, DeviceId,
    InputBackend, JoystickOffset, RawUpdate,
};

/// Settings with short intervals so tests finish quickly
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        scan_interval_ms: 20,
        poll_interval_ms: 10,
        stop_timeout_ms: 250,
        buffer_size: 128,
    }
}

/// Polls `condition` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Awaits `future` with a deadline, failing the test when it passes
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .expect("operation did not finish in time")
}

#[derive(Debug, Default)]
struct Script {
    gamepads: Vec<DeviceDescriptor>,
    joysticks: Vec<DeviceDescriptor>,
    refused: HashSet<DeviceId>,
    pending: VecDeque<RawUpdate>,
    fail_next_poll: bool,
    fail_probe: bool,
    poll_delay: Option<Duration>,
    acquired: Option<DeviceHandle>,
    next_token: u64,

    acquire_calls: Vec<DeviceId>,
    buffer_sizes: Vec<usize>,
    released: Vec<DeviceId>,
    failed_at: Option<tokio::time::Instant>,
    shutdown_calls: usize,
    poll_count: usize,
}

/// In-memory backend driven by the test
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug_gamepad(&self, id: &str, name: &str) {
        self.script.lock().unwrap().gamepads.push(DeviceDescriptor::new(id, name));
    }

    pub fn plug_joystick(&self, id: &str, name: &str) {
        self.script.lock().unwrap().joysticks.push(DeviceDescriptor::new(id, name));
    }

    pub fn unplug_all(&self) {
        let mut script = self.script.lock().unwrap();
        script.gamepads.clear();
        script.joysticks.clear();
    }

    pub fn refuse(&self, id: &str) {
        self.script.lock().unwrap().refused.insert(DeviceId::from(id));
    }

    pub fn push(&self, offset: JoystickOffset, value: i32) {
        self.script
            .lock()
            .unwrap()
            .pending
            .push_back(RawUpdate::new(offset, value));
    }

    pub fn fail_next_poll(&self) {
        self.script.lock().unwrap().fail_next_poll = true;
    }

    /// Makes every following poll block the calling thread for `delay`
    pub fn set_poll_delay(&self, delay: Duration) {
        self.script.lock().unwrap().poll_delay = Some(delay);
    }

    pub fn set_probe_failing(&self, failing: bool) {
        self.script.lock().unwrap().fail_probe = failing;
    }

    pub fn acquire_calls(&self) -> Vec<DeviceId> {
        self.script.lock().unwrap().acquire_calls.clone()
    }

    pub fn buffer_sizes(&self) -> Vec<usize> {
        self.script.lock().unwrap().buffer_sizes.clone()
    }

    pub fn released(&self) -> Vec<DeviceId> {
        self.script.lock().unwrap().released.clone()
    }

    pub fn failed_at(&self) -> Option<tokio::time::Instant> {
        self.script.lock().unwrap().failed_at
    }

    pub fn shutdown_calls(&self) -> usize {
        self.script.lock().unwrap().shutdown_calls
    }

    pub fn poll_count(&self) -> usize {
        self.script.lock().unwrap().poll_count
    }

    pub fn is_held(&self) -> bool {
        self.script.lock().unwrap().acquired.is_some()
    }
}

fn check_handle(script: &Script, handle: &DeviceHandle) -> Result<(), BackendError> {
    match &script.acquired {
        Some(held) if held.token() == handle.token() => Ok(()),
        _ => Err(BackendError::InvalidHandle),
    }
}

impl InputBackend for ScriptedBackend {
    fn list_devices(
        &self,
        category: DeviceCategory,
    ) -> Result<Vec<DeviceDescriptor>, BackendError> {
        let script = self.script.lock().unwrap();
        Ok(match category {
            DeviceCategory::Gamepad => script.gamepads.clone(),
            DeviceCategory::Joystick => script.joysticks.clone(),
        })
    }

    fn acquire(&self, device: &DeviceId) -> Result<DeviceHandle, BackendError> {
        let mut script = self.script.lock().unwrap();
        script.acquire_calls.push(device.clone());

        if script.refused.contains(device) {
            return Err(BackendError::Refused {
                device: device.clone(),
                reason: "scripted refusal".to_string(),
            });
        }
        if script.acquired.is_some() {
            return Err(BackendError::Refused {
                device: device.clone(),
                reason: "another device is held".to_string(),
            });
        }

        script.next_token += 1;
        let handle = DeviceHandle::new(device.clone(), script.next_token);
        script.acquired = Some(DeviceHandle::new(device.clone(), script.next_token));
        Ok(handle)
    }

    fn set_buffer_size(&self, handle: &DeviceHandle, size: usize) -> Result<(), BackendError> {
        let mut script = self.script.lock().unwrap();
        check_handle(&script, handle)?;
        script.buffer_sizes.push(size);
        Ok(())
    }

    fn probe(&self, handle: &DeviceHandle) -> Result<(), BackendError> {
        let script = self.script.lock().unwrap();
        check_handle(&script, handle)?;
        if script.fail_probe {
            return Err(BackendError::Disconnected(handle.device().clone()));
        }
        Ok(())
    }

    fn poll(&self, handle: &DeviceHandle) -> Result<(), BackendError> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            check_handle(&script, handle)?;
            script.poll_count += 1;
            script.poll_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut script = self.script.lock().unwrap();
        check_handle(&script, handle)?;
        if script.fail_next_poll {
            script.fail_next_poll = false;
            script.failed_at = Some(tokio::time::Instant::now());
            return Err(BackendError::Platform("scripted poll failure".to_string()));
        }
        Ok(())
    }

    fn drain(&self, handle: &DeviceHandle) -> Result<Vec<RawUpdate>, BackendError> {
        let mut script = self.script.lock().unwrap();
        check_handle(&script, handle)?;
        Ok(script.pending.drain(..).collect())
    }

    fn release(&self, handle: DeviceHandle) {
        let mut script = self.script.lock().unwrap();
        if check_handle(&script, &handle).is_ok() {
            script.acquired = None;
        }
        script.released.push(handle.device().clone());
    }

    fn shutdown(&self) {
        self.script.lock().unwrap().shutdown_calls += 1;
    }
}
