//! Translation of button presses into UI navigation
//!
//! | control                          | command       |
//! |----------------------------------|---------------|
//! | A, Start                         | Enter         |
//! | B, Back                          | Close         |
//! | hat up/right/down/left           | arrow keys    |
//! | stick X at 0 / 65535             | Left / Right  |
//! | stick Y at 0 / 65535             | Up / Down     |

use crate::controller::classifier::{
    AXIS_MAX_VALUE, AXIS_MIN_VALUE, A_BUTTON_OFFSET, BACK_BUTTON_OFFSET, B_BUTTON_OFFSET,
    POV_BUTTONS_OFFSET, POV_DOWN_VALUE, POV_LEFT_VALUE, POV_RIGHT_VALUE, POV_UP_VALUE,
    START_BUTTON_OFFSET,
};
use crate::controller::events::ButtonPressEvent;
use egui::{Event, Key, Modifiers};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NavigationKey {
    Enter,
    Up,
    Down,
    Left,
    Right,
}

impl NavigationKey {
    pub fn egui_key(self) -> Key {
        match self {
            NavigationKey::Enter => Key::Enter,
            NavigationKey::Up => Key::ArrowUp,
            NavigationKey::Down => Key::ArrowDown,
            NavigationKey::Left => Key::ArrowLeft,
            NavigationKey::Right => Key::ArrowRight,
        }
    }

    /// Press and release, as a keyboard would deliver them
    pub fn key_events(self) -> [Event; 2] {
        let key = self.egui_key();
        [true, false].map(|pressed| Event::Key {
            key,
            physical_key: None,
            pressed,
            repeat: false,
            modifiers: Modifiers::NONE,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationCommand {
    Key(NavigationKey),
    Close,
}

/// Maps one button press to the command it stands for
pub fn translate(event: &ButtonPressEvent) -> Option<NavigationCommand> {
    let by_offset = match event.button_offset {
        A_BUTTON_OFFSET | START_BUTTON_OFFSET => Some(NavigationCommand::Key(NavigationKey::Enter)),
        BACK_BUTTON_OFFSET | B_BUTTON_OFFSET => Some(NavigationCommand::Close),
        POV_BUTTONS_OFFSET => match event.pov_value {
            POV_UP_VALUE => Some(NavigationCommand::Key(NavigationKey::Up)),
            POV_DOWN_VALUE => Some(NavigationCommand::Key(NavigationKey::Down)),
            POV_LEFT_VALUE => Some(NavigationCommand::Key(NavigationKey::Left)),
            POV_RIGHT_VALUE => Some(NavigationCommand::Key(NavigationKey::Right)),
            _ => None,
        },
        _ => None,
    };
    if by_offset.is_some() {
        return by_offset;
    }

    let key = match (event.named_offset.as_str(), event.pov_value) {
        ("X", AXIS_MIN_VALUE) => NavigationKey::Left,
        ("X", AXIS_MAX_VALUE) => NavigationKey::Right,
        ("Y", AXIS_MIN_VALUE) => NavigationKey::Up,
        ("Y", AXIS_MAX_VALUE) => NavigationKey::Down,
        _ => return None,
    };
    Some(NavigationCommand::Key(key))
}

/// Feeds translated button presses to the UI
pub struct NavigationForwarder;

impl NavigationForwarder {
    /// Runs until the event channel closes or the UI drops its receiver
    pub fn spawn(
        mut events: broadcast::Receiver<ButtonPressEvent>,
        commands: mpsc::Sender<NavigationCommand>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Navigation forwarder started");
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Navigation forwarder skipped {} button press(es)", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(command) = translate(&event) else {
                    debug!("No navigation for {} = {}", event.named_offset, event.pov_value);
                    continue;
                };

                debug!("Forwarding {:?}", command);
                if commands.send(command).await.is_err() {
                    debug!("UI receiver dropped");
                    break;
                }
            }
            info!("Navigation forwarder stopped");
        })
    }
}
