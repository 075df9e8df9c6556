use crate::controller::device::{DeviceCategory, DeviceDescriptor, InputBackend};
use tracing::{debug, warn};

/// Lists attached gamepads followed by attached joysticks
///
/// A failing category query is logged and contributes nothing; "no devices" is
/// an empty list, never an error.
pub fn list_devices(backend: &dyn InputBackend) -> Vec<DeviceDescriptor> {
    let mut devices = Vec::new();

    for category in [DeviceCategory::Gamepad, DeviceCategory::Joystick] {
        match backend.list_devices(category) {
            Ok(found) => {
                debug!("Enumerated {} {:?} device(s)", found.len(), category);
                devices.extend(found);
            }
            Err(e) => warn!("Failed to enumerate {:?} devices: {}", category, e),
        }
    }

    devices
}
