use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tr1launcher::config::LauncherConfig;
use tr1launcher::controller::ControllerHandle;
use tr1launcher::launcher::GameLauncher;
use tr1launcher::mapping::NavigationForwarder;
use tr1launcher::ui::LauncherUi;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = LauncherConfig::load_or_default().await?;

    info!("Initializing joystick support");
    let controller = match ControllerHandle::spawn(Some(config.controller.clone())) {
        Ok(controller) => Some(controller),
        Err(e) => {
            warn!("Joystick support unavailable, continuing without it: {}", e);
            None
        }
    };

    let (ui_tx, ui_rx) = mpsc::channel(100);
    let _forwarder = controller
        .as_ref()
        .map(|controller| NavigationForwarder::spawn(controller.subscribe(), ui_tx));

    let launcher = Arc::new(GameLauncher::from_config(&config.games));
    let session = controller.as_ref().map(ControllerHandle::session);
    let title = config.ui.title.clone();

    info!("Starting launcher UI");
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default()
        .with_title(&title)
        .with_inner_size([480.0, 360.0])
        .with_fullscreen(config.ui.fullscreen);

    let result = eframe::run_native(
        &config.ui.title,
        native_options,
        Box::new(move |cc| Ok(Box::new(LauncherUi::new(cc, session, launcher, ui_rx, title)))),
    );

    if let Some(controller) = &controller {
        controller.dispose().await;
    }

    result.map_err(|e| eyre!("Launcher window failed: {}", e))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
