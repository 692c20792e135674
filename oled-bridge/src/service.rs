//! Bridge service core.
//!
//! Feeds session events into a [`SessionHandler`] and serves the status
//! endpoint alongside, until the event stream ends or the service is
//! stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use oled_core::{BridgeError, Display, DisplayHandle};

use crate::config::BridgeConfig;
use crate::session::{SessionEvent, SessionHandler, SessionSurface};
use crate::status::{StatusServer, wait_for_stop};
use crate::voice::VoiceMatcher;

// ── BridgeService ────────────────────────────────────────────────

pub struct BridgeService {
    config: BridgeConfig,
    running: Arc<AtomicBool>,
}

impl BridgeService {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stops the service from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped or until `events` reaches end of input.
    ///
    /// 1. Binds the status endpoint on `server.port`.
    /// 2. Reads one JSON event per line and hands it to the session
    ///    handler; malformed lines are logged and skipped.
    /// 3. Stops the status endpoint and the display supervisor on exit.
    ///
    /// Returns the number of display commands rejected at shutdown.
    pub async fn run<R, S>(&self, display: Display, surface: S, events: R) -> Result<usize, BridgeError>
    where
        R: AsyncBufRead + Unpin,
        S: SessionSurface,
    {
        self.running.store(true, Ordering::SeqCst);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let handle = display.handle().clone();
        let status = StatusServer::new(listener, handle.clone(), self.stop_handle());
        let status_task = tokio::spawn(status.run());

        let mut handler = SessionHandler::new(display, VoiceMatcher::new()?, surface);
        let result = self.event_loop(&mut handler, events).await;

        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = status_task.await {
            warn!("status endpoint task failed: {e}");
        }
        let abandoned = result? + shutdown_display(&handle).await;
        info!("bridge service stopped");
        Ok(abandoned)
    }

    /// Dispatch events from `events` until end of input or stop.
    ///
    /// An event still waiting on the display when stop is requested is
    /// not left hanging: the display supervisor is shut down, which
    /// rejects the pending command and lets the handler finish. Returns
    /// the number of commands rejected that way.
    pub async fn event_loop<R, S>(
        &self,
        handler: &mut SessionHandler<S>,
        events: R,
    ) -> Result<usize, BridgeError>
    where
        R: AsyncBufRead + Unpin,
        S: SessionSurface,
    {
        let display = handler.display().handle().clone();
        let mut lines = events.lines();
        while self.running.load(Ordering::SeqCst) {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = wait_for_stop(&self.running) => break,
            };
            let Some(line) = line else {
                info!("event stream closed");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<SessionEvent>(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!("malformed event {line:?}: {e}");
                    continue;
                }
            };

            let handled = handler.handle(event);
            tokio::pin!(handled);
            tokio::select! {
                () = &mut handled => {}
                _ = wait_for_stop(&self.running) => {
                    info!("stop requested while an event waits on the display");
                    let abandoned = shutdown_display(&display).await;
                    handled.await;
                    return Ok(abandoned);
                }
            }
        }
        Ok(0)
    }
}

/// Shut the display supervisor down. Returns how many queued commands
/// were rejected; zero if it had already stopped.
pub async fn shutdown_display(display: &DisplayHandle) -> usize {
    match display.shutdown().await {
        Ok(abandoned) => {
            if abandoned > 0 {
                warn!("{abandoned} queued commands were not delivered");
            }
            abandoned
        }
        Err(_) => 0,
    }
}

// ── Tests ────────────────────────────────────────────────────────
