//! Connection supervisor: the single owner of the display link.
//!
//! One tokio task holds the [`Link`], the [`CommandQueue`] and the
//! [`ReconnectSchedule`]. Everything else talks to it through a cloneable
//! [`DisplayHandle`], so there is never more than one writer on the wire
//! and never more than one drain loop.
//!
//! ```text
//!  DisplayHandle ──Request──► Supervisor ──bytes──► Link ──► device
//!                                 ▲                   │
//!                                 └──── LinkEvent ────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::command::WireCommand;
use crate::error::{LinkError, SendError};
use crate::link::{Connector, Link, LinkConfig, LinkEvent, LinkEventReceiver};
use crate::queue::{CommandQueue, PendingCommand, Reply};
use crate::send::{RetryPolicy, send_with_retry};
use crate::state::{LinkPhase, ReconnectSchedule};

/// Bound on in-flight requests between handles and the supervisor.
const REQUEST_CAPACITY: usize = 100;

// ── SupervisorConfig ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub link: LinkConfig,
    /// Keep trying to reopen the device after it goes away.
    pub auto_reconnect: bool,
    /// Fixed wait between reopen attempts.
    pub reconnect_interval: Duration,
    /// Pause between `reset` and `clear` after every open.
    pub reset_settle: Duration,
    pub retry: RetryPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            auto_reconnect: true,
            reconnect_interval: Duration::from_millis(5000),
            reset_settle: Duration::from_millis(2000),
            retry: RetryPolicy::default(),
        }
    }
}

// ── LinkStatus ───────────────────────────────────────────────────

/// Snapshot published by the supervisor after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub phase: LinkPhase,
    /// Link open and reset sequence finished.
    pub connected: bool,
    pub queued: usize,
    /// Failed open attempts since startup.
    pub open_failures: u64,
    pub last_error: Option<String>,
}

// ── DisplayHandle ────────────────────────────────────────────────

#[derive(Debug)]
enum Request {
    Send { command: WireCommand, reply: Reply },
    Shutdown { done: oneshot::Sender<usize> },
}

/// Cloneable access to the supervisor. Dropping every handle shuts it
/// down.
#[derive(Debug, Clone)]
pub struct DisplayHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<LinkStatus>,
}

impl DisplayHandle {
    /// Deliver one command.
    ///
    /// Resolves once the command has been written and settled, or with
    /// an error once it can never be delivered. Commands issued while
    /// the link is down stay pending until it comes back.
    pub async fn send(&self, command: WireCommand) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.requests.send(Request::Send { command, reply }).await?;
        rx.await?
    }

    /// Liveness flag for health checks.
    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Wait until the link is open and reset.
    pub async fn wait_until_connected(&self) -> Result<(), SendError> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| s.connected)
            .await
            .map(|_| ())
            .map_err(|_| SendError::SupervisorStopped)
    }

    /// Close the link and reject everything still queued.
    ///
    /// Returns the number of commands rejected with
    /// [`SendError::QueueAbandoned`].
    pub async fn shutdown(&self) -> Result<usize, SendError> {
        let (done, rx) = oneshot::channel();
        self.requests.send(Request::Shutdown { done }).await?;
        Ok(rx.await?)
    }
}

// ── Supervisor ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct Supervisor {
    config: SupervisorConfig,
    link: Link,
    events: LinkEventReceiver,
    queue: CommandQueue,
    schedule: ReconnectSchedule,
    phase: LinkPhase,
    /// Open and past the reset sequence.
    ready: bool,
    open_failures: u64,
    requests: mpsc::Receiver<Request>,
    status: watch::Sender<LinkStatus>,
}

impl Supervisor {
    /// Open the device and start the supervisor task.
    ///
    /// With auto-reconnect enabled a failed first open is logged and
    /// retried in the background; otherwise it is returned here.
    pub async fn spawn(
        config: SupervisorConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<(DisplayHandle, JoinHandle<()>), LinkError> {
        let (requests_tx, requests) = mpsc::channel(REQUEST_CAPACITY);
        let (status, status_rx) = watch::channel(LinkStatus::default());
        let (link, events) = Link::new(config.link.clone(), connector);

        let mut supervisor = Self {
            schedule: ReconnectSchedule::new(config.reconnect_interval),
            config,
            link,
            events,
            queue: CommandQueue::new(),
            phase: LinkPhase::default(),
            ready: false,
            open_failures: 0,
            requests,
            status,
        };
        supervisor.start().await?;

        let handle = DisplayHandle {
            requests: requests_tx,
            status: status_rx,
        };
        Ok((handle, tokio::spawn(supervisor.run())))
    }

    async fn start(&mut self) -> Result<(), LinkError> {
        info!(
            "initializing serial connection to {} at {} baud",
            self.config.link.port, self.config.link.baud_rate
        );
        match self.open().await {
            Ok(()) => Ok(()),
            Err(_) if self.config.auto_reconnect => {
                self.schedule_reconnect();
                Ok(())
            }
            Err(e) => {
                error!("display link unavailable and auto-reconnect is off: {e}");
                self.phase.shut_down();
                self.publish_status();
                Err(e)
            }
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.schedule.deadline();
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Send { command, reply }) => self.handle_send(command, reply).await,
                    Some(Request::Shutdown { done }) => {
                        let abandoned = self.shutdown();
                        let _ = done.send(abandoned);
                        return;
                    }
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                Some(event) = self.events.recv() => self.handle_link_event(event),
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.reconnect().await;
                }
            }
        }
    }

    // ── Opening ──────────────────────────────────────────────────

    /// Open the link and run the reset sequence.
    async fn open(&mut self) -> Result<(), LinkError> {
        self.phase
            .begin_open()
            .unwrap_or_else(|e| warn!("link phase: {e}"));
        self.publish_status();

        if let Err(e) = self.link.open().await {
            self.open_failures += 1;
            let attempt = self.schedule.record_failure();
            warn!(attempt, "failed to open serial port: {e}");
            self.phase
                .open_failed(self.config.auto_reconnect)
                .unwrap_or_else(|e| warn!("link phase: {e}"));
            self.publish_status();
            return Err(e);
        }

        // `Opened` is already queued; handling it moves the phase to Open.
        self.poll_link_events();
        self.reset_device().await;

        // The device may already have gone away again during the reset.
        self.poll_link_events();
        if self.phase.is_open() {
            self.ready = true;
            info!("display initialized");
        }
        self.publish_status();
        Ok(())
    }

    /// `reset`, settle, `clear`. Runs after every successful open.
    async fn reset_device(&mut self) {
        let retry = &self.config.retry;
        if let Err(e) = send_with_retry(&mut self.link, &WireCommand::Reset, retry).await {
            warn!("display reset failed: {e}");
        }
        tokio::time::sleep(self.config.reset_settle).await;
        if let Err(e) = send_with_retry(&mut self.link, &WireCommand::Clear, retry).await {
            warn!("display clear failed: {e}");
        }
    }

    async fn reconnect(&mut self) {
        self.schedule.take();
        info!("attempting to reconnect");
        match self.open().await {
            Ok(()) => self.drain().await,
            Err(_) if self.config.auto_reconnect => self.schedule_reconnect(),
            Err(_) => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        self.schedule.arm();
        info!(
            "will attempt to reconnect in {:?}",
            self.schedule.interval()
        );
    }

    // ── Link events ──────────────────────────────────────────────

    fn poll_link_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_link_event(event);
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        if event.generation() != self.link.generation() {
            debug!(generation = event.generation(), "ignoring event from a stale link");
            return;
        }
        match event {
            LinkEvent::Opened { generation } => {
                debug!(generation, "link opened");
                self.phase
                    .mark_open()
                    .unwrap_or_else(|e| warn!("link phase: {e}"));
                self.schedule.disarm();
            }
            LinkEvent::Closed { .. } => {
                warn!("serial port closed");
                self.link_lost(None);
            }
            LinkEvent::Fault { error, .. } => {
                error!("serial port error: {error}");
                self.link_lost(Some(error.to_string()));
            }
        }
    }

    fn link_lost(&mut self, error: Option<String>) {
        if !self.phase.is_open() {
            return;
        }
        self.link.mark_dropped(error);
        self.ready = false;
        self.phase
            .link_lost(self.config.auto_reconnect)
            .unwrap_or_else(|e| warn!("link phase: {e}"));
        if self.config.auto_reconnect {
            self.schedule_reconnect();
        }
        self.publish_status();
    }

    // ── Sending ──────────────────────────────────────────────────

    async fn handle_send(&mut self, command: WireCommand, reply: Reply) {
        self.poll_link_events();

        if self.ready && self.queue.is_empty() {
            let result = send_with_retry(&mut self.link, &command, &self.config.retry)
                .await
                .map(|_| ());
            let _ = reply.send(result);
        } else {
            if !self.ready {
                warn!(%command, "not connected, queuing command");
            }
            self.queue.enqueue(PendingCommand::new(command, reply));
            self.drain().await;
        }
        self.publish_status();
    }

    /// Send queued commands in order until the queue is empty or the
    /// link goes down. Entries left behind wait for the next open.
    async fn drain(&mut self) {
        if !self.ready || self.queue.is_empty() || !self.queue.begin_drain() {
            return;
        }
        info!("processing {} queued commands", self.queue.len());

        loop {
            self.poll_link_events();
            if !self.ready {
                if !self.queue.is_empty() {
                    warn!(
                        "link lost mid-drain; {} commands stay queued",
                        self.queue.len()
                    );
                }
                break;
            }
            let Some(entry) = self.queue.drain_one() else {
                break;
            };
            debug!(command = %entry.command, waited = ?entry.waited(), "sending queued command");
            let result = send_with_retry(&mut self.link, &entry.command, &self.config.retry)
                .await
                .map(|_| ());
            entry.complete(result);
            self.publish_status();
        }

        self.queue.end_drain();
    }

    // ── Shutdown ─────────────────────────────────────────────────

    fn shutdown(&mut self) -> usize {
        info!("closing serial connection");
        self.phase.shut_down();
        self.ready = false;
        self.schedule.disarm();
        self.link.close();

        self.requests.close();
        let mut abandoned = self.queue.abandon_all();
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::Send { reply, .. } => {
                    let _ = reply.send(Err(SendError::QueueAbandoned));
                    abandoned += 1;
                }
                Request::Shutdown { done } => {
                    let _ = done.send(0);
                }
            }
        }
        if abandoned > 0 {
            warn!("rejected {abandoned} undelivered commands on shutdown");
        }

        self.publish_status();
        info!("serial connection closed");
        abandoned
    }

    fn publish_status(&self) {
        self.status.send_replace(LinkStatus {
            phase: self.phase.clone(),
            connected: self.ready,
            queued: self.queue.len(),
            open_failures: self.open_failures,
            last_error: self.link.last_error().map(str::to_string),
        });
    }
}
