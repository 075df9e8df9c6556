//! Conversion of controller button presses into UI input.
//!
//! The controller subsystem only knows raw offsets; this module decides what a
//! press means for the launcher window (a key or closing the window).

pub mod navigation;

pub use navigation::{translate, NavigationCommand, NavigationForwarder, NavigationKey};
