//! Background scan and poll loops
//!
//! Both loops are tokio tasks that sleep between iterations and check their
//! [`CancellationToken`] at every iteration boundary. The sleep itself races
//! the token, so a stop request is noticed immediately rather than after the
//! next interval.

use crate::controller::classifier;
use crate::controller::device::RawUpdate;
use crate::controller::enumerator;
use crate::controller::session::{CaptureSession, PollStep, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stop flag plus task handle of a running loop
#[derive(Debug)]
pub(crate) struct LoopHandle {
    name: &'static str,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn new(name: &'static str, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { name, token, task }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Requests a stop and waits up to `timeout` for the loop to exit
    ///
    /// Returns false if the loop had to be aborted.
    pub(crate) async fn stop(mut self, timeout: Duration) -> bool {
        self.token.cancel();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(())) => {
                debug!("{} loop exited", self.name);
                true
            }
            Ok(Err(e)) => {
                warn!("{} loop ended abnormally: {}", self.name, e);
                true
            }
            Err(_) => {
                warn!(
                    "{} loop did not stop within {:?}, aborting it",
                    self.name, timeout
                );
                self.task.abort();
                false
            }
        }
    }
}

pub(crate) fn spawn_scan_loop(session: Arc<CaptureSession>) -> LoopHandle {
    let token = CancellationToken::new();
    let stop = token.clone();
    let interval = session.settings().scan_interval();

    let task = tokio::spawn(async move {
        info!("Starting device scan loop ({:?} interval)", interval);

        while !stop.is_cancelled() {
            scan_once(&session, &stop).await;

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Device scan loop stopped");
    });

    LoopHandle::new("Scan", token, task)
}

async fn scan_once(session: &Arc<CaptureSession>, stop: &CancellationToken) {
    if session.is_attached() {
        return;
    }

    // Attached but the probe failed: the device went away under us
    if session.state() != SessionState::Idle {
        info!("Captured device no longer responds, releasing it");
        session.stop_capture(false).await;
    }

    let devices = enumerator::list_devices(session.backend());
    let Some(descriptor) = devices.iter().find(|d| !d.id.is_empty()) else {
        debug!("No controller found, retrying later");
        return;
    };

    info!("Found controller '{}' ({})", descriptor.name, descriptor.id);
    if let Err(e) = session.start_capture_from_scan(&descriptor.id, stop).await {
        warn!("Could not capture '{}': {}", descriptor.name, e);
    }
}

pub(crate) fn spawn_poll_loop(session: Arc<CaptureSession>, generation: u64) -> LoopHandle {
    let token = CancellationToken::new();
    let stop = token.clone();
    let interval = session.settings().poll_interval();

    let task = tokio::spawn(async move {
        info!(
            "Starting poll loop for generation {} ({:?} interval)",
            generation, interval
        );

        while !stop.is_cancelled() {
            match session.poll_attached(generation).await {
                PollStep::Updates(updates) => publish(&session, updates),
                PollStep::Detached => {
                    debug!("Capture {} is gone, leaving poll loop", generation);
                    break;
                }
                PollStep::Lost(e) => {
                    warn!("{}", e);
                    break;
                }
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Poll loop for generation {} stopped", generation);
    });

    LoopHandle::new("Poll", token, task)
}

fn publish(session: &CaptureSession, updates: Vec<RawUpdate>) {
    if updates.is_empty() {
        return;
    }
    debug!("Drained {} buffered update(s)", updates.len());

    for update in &updates {
        if let Some(event) = classifier::classify(update) {
            let receivers = session.channels().publish_button_pressed(event);
            debug!("Button press delivered to {} subscriber(s)", receivers);
        }
    }
}
