//! Update classification
//!
//! Turns raw buffered updates into [`ButtonPressEvent`]s. This is an edge and
//! threshold detector: a digital button only counts when it reports the pressed
//! sentinel, a hat only in one of the four cardinal directions, and the primary
//! stick only at full deflection. Everything in between is dropped.

use crate::controller::device::{JoystickOffset, RawUpdate, POV_OFFSET};
use crate::controller::events::ButtonPressEvent;
use chrono::Local;
use tracing::debug;

/// Value reported by a digital button while held down
pub const BUTTON_PRESSED_VALUE: i32 = 128;

pub const A_BUTTON_OFFSET: i32 = 48;
pub const B_BUTTON_OFFSET: i32 = 49;
pub const BACK_BUTTON_OFFSET: i32 = 54;
pub const START_BUTTON_OFFSET: i32 = 55;
pub const POV_BUTTONS_OFFSET: i32 = POV_OFFSET;

// Hat values in hundredths of a degree, clockwise from up
pub const POV_UP_VALUE: i32 = 0;
pub const POV_RIGHT_VALUE: i32 = 9000;
pub const POV_DOWN_VALUE: i32 = 18000;
pub const POV_LEFT_VALUE: i32 = 27000;

pub const AXIS_MIN_VALUE: i32 = 0;
pub const AXIS_MAX_VALUE: i32 = u16::MAX as i32;

const CARDINAL_POV_VALUES: [i32; 4] = [
    POV_UP_VALUE,
    POV_RIGHT_VALUE,
    POV_DOWN_VALUE,
    POV_LEFT_VALUE,
];

/// Returns true if the update should be published as a button press
pub fn is_relevant(update: &RawUpdate) -> bool {
    let pressed_button = update.offset.is_button() && update.value == BUTTON_PRESSED_VALUE;

    let cardinal_pov = update.raw_offset() == POV_BUTTONS_OFFSET
        && CARDINAL_POV_VALUES.contains(&update.value);

    let stick_extreme = matches!(update.offset, JoystickOffset::X | JoystickOffset::Y)
        && (update.value == AXIS_MIN_VALUE || update.value == AXIS_MAX_VALUE);

    pressed_button || cardinal_pov || stick_extreme
}

/// Builds the event for a relevant update, `None` otherwise
pub fn classify(update: &RawUpdate) -> Option<ButtonPressEvent> {
    if !is_relevant(update) {
        return None;
    }

    let event = ButtonPressEvent {
        button_offset: update.raw_offset(),
        pov_value: update.value,
        named_offset: update.offset_name().trim().to_string(),
        timestamp: Local::now(),
    };
    debug!(
        "Classified {} = {} as button press",
        event.named_offset, event.pov_value
    );
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(offset: JoystickOffset, value: i32) -> RawUpdate {
        RawUpdate::new(offset, value)
    }

    #[test]
    fn buttons_only_count_when_pressed() {
        for button in 0..128u8 {
            assert!(is_relevant(&update(JoystickOffset::Button(button), 128)));
            for value in [0, 1, 127, 129, 255] {
                assert!(!is_relevant(&update(JoystickOffset::Button(button), value)));
            }
        }
    }

    #[test]
    fn pov_only_counts_cardinal_directions() {
        let pov = JoystickOffset::PointOfView(0);
        for value in [0, 9000, 18000, 27000] {
            assert!(is_relevant(&update(pov, value)), "{value} should be relevant");
        }
        for value in [4500, 13500, 22500, 31500, -1, 65535] {
            assert!(!is_relevant(&update(pov, value)), "{value} should be ignored");
        }
    }

    #[test]
    fn secondary_pov_controllers_are_ignored() {
        assert!(!is_relevant(&update(JoystickOffset::PointOfView(1), 0)));
    }

    #[test]
    fn primary_axes_only_count_at_full_deflection() {
        for axis in [JoystickOffset::X, JoystickOffset::Y] {
            assert!(is_relevant(&update(axis, 0)));
            assert!(is_relevant(&update(axis, 65535)));
            for value in [1, 16384, 32767, 32768, 65534] {
                assert!(!is_relevant(&update(axis, value)));
            }
        }
    }

    #[test]
    fn other_axes_are_ignored() {
        for axis in [
            JoystickOffset::Z,
            JoystickOffset::RotationX,
            JoystickOffset::RotationY,
            JoystickOffset::Slider(0),
        ] {
            assert!(!is_relevant(&update(axis, 0)));
            assert!(!is_relevant(&update(axis, 65535)));
        }
    }

    #[test]
    fn classified_button_carries_raw_offset() {
        let event = classify(&update(JoystickOffset::Button(0), 128)).unwrap();
        assert_eq!(event.button_offset, A_BUTTON_OFFSET);
        assert_eq!(event.pov_value, 128);
        assert_eq!(event.named_offset, "Buttons0");
    }

    #[test]
    fn classified_axis_carries_name_and_value() {
        let event = classify(&update(JoystickOffset::X, 0)).unwrap();
        assert_eq!(event.named_offset, "X");
        assert_eq!(event.pov_value, 0);
        assert_eq!(event.button_offset, 0);

        assert!(classify(&update(JoystickOffset::X, 32768)).is_none());
    }
}
