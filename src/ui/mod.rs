//! # Launcher window
//!
//! Three buttons: the original game, the expansion, and exit. The window is
//! usable with mouse, keyboard or a gamepad.
//!
//! ## Controller Event Integration
//! Gamepad presses arrive as [`NavigationCommand`]s and are injected into
//! egui's event stream in `raw_input_hook` as ordinary key presses, so the
//! window handles a gamepad exactly like a keyboard. `Close` is not a key; it
//! closes the viewport directly.
//!
//! ## Launch Flow
//! Before a game starts, joystick capture and scanning are stopped so the game
//! gets the pad to itself, and the window is hidden. When the game exits the
//! launcher closes. When it cannot be started the window comes back with the
//! error and joystick support is restarted.

use crate::controller::CaptureSession;
use crate::launcher::{GameLauncher, GameVariant};
use crate::mapping::NavigationCommand;
use egui::{Color32, Key, RichText, ViewportCommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Entries of the launcher menu, in focus order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuEntry {
    Launch(GameVariant),
    Exit,
}

pub const MENU_ENTRIES: [MenuEntry; 3] = [
    MenuEntry::Launch(GameVariant::Original),
    MenuEntry::Launch(GameVariant::UnfinishedBusiness),
    MenuEntry::Exit,
];

/// Focused menu entry, wrapping at both ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MenuSelection {
    index: usize,
}

impl MenuSelection {
    pub fn current(&self) -> MenuEntry {
        MENU_ENTRIES[self.index]
    }

    pub fn is_focused(&self, entry: MenuEntry) -> bool {
        self.current() == entry
    }

    pub fn focus(&mut self, entry: MenuEntry) {
        if let Some(index) = MENU_ENTRIES.iter().position(|e| *e == entry) {
            self.index = index;
        }
    }

    pub fn next(&mut self) {
        self.index = (self.index + 1) % MENU_ENTRIES.len();
    }

    pub fn previous(&mut self) {
        self.index = (self.index + MENU_ENTRIES.len() - 1) % MENU_ENTRIES.len();
    }
}

#[derive(Debug)]
enum LaunchStatus {
    Finished(GameVariant),
    Failed(String),
}

pub struct LauncherUi {
    /// None when the platform offers no joystick support
    session: Option<Arc<CaptureSession>>,
    launcher: Arc<GameLauncher>,

    /// Commands from the navigation forwarder
    command_rx: mpsc::Receiver<NavigationCommand>,

    launch_tx: mpsc::Sender<LaunchStatus>,
    launch_rx: mpsc::Receiver<LaunchStatus>,

    selection: MenuSelection,
    close_requested: bool,
    launching: bool,
    error_message: Option<String>,
    title: String,
}

impl LauncherUi {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        session: Option<Arc<CaptureSession>>,
        launcher: Arc<GameLauncher>,
        command_rx: mpsc::Receiver<NavigationCommand>,
        title: String,
    ) -> Self {
        let (launch_tx, launch_rx) = mpsc::channel(4);
        Self {
            session,
            launcher,
            command_rx,
            launch_tx,
            launch_rx,
            selection: MenuSelection::default(),
            close_requested: false,
            launching: false,
            error_message: None,
            title,
        }
    }

    fn activate(&mut self, ctx: &egui::Context, entry: MenuEntry) {
        match entry {
            MenuEntry::Launch(variant) => self.start_launch(ctx, variant),
            MenuEntry::Exit => {
                info!("Exit selected");
                self.close_requested = true;
            }
        }
    }

    fn start_launch(&mut self, ctx: &egui::Context, variant: GameVariant) {
        if self.launching {
            debug!("Launch already in progress, ignoring {}", variant);
            return;
        }
        self.launching = true;
        self.error_message = None;

        let session = self.session.clone();
        let launcher = self.launcher.clone();
        let status_tx = self.launch_tx.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            if let Some(session) = &session {
                session.stop_capture(true).await;
            }
            ctx.send_viewport_cmd(ViewportCommand::Visible(false));

            let status = match launcher.launch(variant).await {
                Ok(_) => LaunchStatus::Finished(variant),
                Err(e) => {
                    error!("Failed to launch {}: {}", variant, e);
                    LaunchStatus::Failed(e.to_string())
                }
            };

            // A hidden viewport gets no frames, so the status is only seen once
            // the window is back
            ctx.send_viewport_cmd(ViewportCommand::Visible(true));
            if status_tx.send(status).await.is_err() {
                debug!("Launcher window already gone");
            }
            ctx.request_repaint();
        });
    }

    fn handle_launch_status(&mut self) {
        while let Ok(status) = self.launch_rx.try_recv() {
            self.launching = false;
            match status {
                LaunchStatus::Finished(variant) => {
                    info!("{} finished, closing launcher", variant);
                    self.close_requested = true;
                }
                LaunchStatus::Failed(message) => {
                    self.error_message = Some(message);
                    if let Some(session) = &self.session {
                        session.start_joystick_support();
                    }
                }
            }
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let (previous, next, enter, escape) = ctx.input(|i| {
            (
                i.key_pressed(Key::ArrowLeft) || i.key_pressed(Key::ArrowUp),
                i.key_pressed(Key::ArrowRight) || i.key_pressed(Key::ArrowDown),
                i.key_pressed(Key::Enter),
                i.key_pressed(Key::Escape),
            )
        });

        if previous {
            self.selection.previous();
        }
        if next {
            self.selection.next();
        }
        if escape {
            self.close_requested = true;
        }
        if enter {
            self.activate(ctx, self.selection.current());
        }
    }

    fn menu_button(&mut self, ui: &mut egui::Ui, entry: MenuEntry, label: &str) {
        let button = egui::Button::new(RichText::new(label).size(22.0))
            .selected(self.selection.is_focused(entry))
            .min_size(egui::vec2(320.0, 48.0));

        let response = ui.add_enabled(!self.launching, button);
        if response.hovered() {
            self.selection.focus(entry);
        }
        if response.clicked() {
            let ctx = ui.ctx().clone();
            self.activate(&ctx, entry);
        }
    }
}

impl eframe::App for LauncherUi {
    fn raw_input_hook(&mut self, _ctx: &egui::Context, raw_input: &mut egui::RawInput) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                NavigationCommand::Key(key) => raw_input.events.extend(key.key_events()),
                NavigationCommand::Close => self.close_requested = true,
            }
        }
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_launch_status();
        if !self.launching {
            self.handle_keys(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(24.0);
                ui.heading(&self.title);
                ui.add_space(24.0);

                self.menu_button(ui, MENU_ENTRIES[0], "Tomb Raider");
                ui.add_space(8.0);
                self.menu_button(ui, MENU_ENTRIES[1], "Unfinished Business");
                ui.add_space(8.0);
                self.menu_button(ui, MENU_ENTRIES[2], "Exit");

                if self.launching {
                    ui.add_space(16.0);
                    ui.label("Game running...");
                }
                if let Some(message) = &self.error_message {
                    ui.add_space(16.0);
                    ui.label(RichText::new(message).color(Color32::RED));
                }
            });
        });

        if self.close_requested {
            ctx.send_viewport_cmd(ViewportCommand::Close);
        }

        // Keeps raw_input_hook running while the pad is the only input
        ctx.request_repaint_after(Duration::from_millis(50));
    }
}
