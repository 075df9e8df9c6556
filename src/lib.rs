//! Launcher for Tomb Raider I and its Unfinished Business expansion, with
//! gamepad navigation of the launcher window.

pub mod config;
pub mod controller;
pub mod launcher;
pub mod mapping;
pub mod ui;
