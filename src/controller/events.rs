use chrono::{DateTime, Local};
use tokio::sync::broadcast;
use tracing::debug;

/// Semantic button press published by the poll loop
#[derive(Clone, Debug, PartialEq)]
pub struct ButtonPressEvent {
    /// Raw state offset of the control that fired
    pub button_offset: i32,
    /// Raw value; the hat angle for POV events, the axis position for sticks
    pub pov_value: i32,
    /// Offset name such as `Buttons0`, `PointOfViewControllers0` or `X`
    pub named_offset: String,
    pub timestamp: DateTime<Local>,
}

/// Subscription channels towards the UI
///
/// Only the generic button-press channel is fed by the classifier. The lap and
/// start channels are reserved hooks; subscribers never receive anything on
/// them today.
#[derive(Debug)]
pub struct EventChannels {
    button_pressed: broadcast::Sender<ButtonPressEvent>,
    lap_button_pressed: broadcast::Sender<ButtonPressEvent>,
    start_button_pressed: broadcast::Sender<ButtonPressEvent>,
}

impl EventChannels {
    pub fn new(capacity: usize) -> Self {
        let (button_pressed, _) = broadcast::channel(capacity);
        let (lap_button_pressed, _) = broadcast::channel(capacity);
        let (start_button_pressed, _) = broadcast::channel(capacity);
        Self {
            button_pressed,
            lap_button_pressed,
            start_button_pressed,
        }
    }

    pub fn subscribe_button_pressed(&self) -> broadcast::Receiver<ButtonPressEvent> {
        debug!("New subscriber to button-press events");
        self.button_pressed.subscribe()
    }

    pub fn subscribe_lap_button_pressed(&self) -> broadcast::Receiver<ButtonPressEvent> {
        self.lap_button_pressed.subscribe()
    }

    pub fn subscribe_start_button_pressed(&self) -> broadcast::Receiver<ButtonPressEvent> {
        self.start_button_pressed.subscribe()
    }

    /// Returns the number of subscribers that received the event
    pub(crate) fn publish_button_pressed(&self, event: ButtonPressEvent) -> usize {
        match self.button_pressed.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscriber for {} = {}", event.named_offset, event.pov_value);
                0
            }
        }
    }
}

impl Default for EventChannels {
    fn default() -> Self {
        Self::new(64)
    }
}
