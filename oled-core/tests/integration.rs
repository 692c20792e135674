//! Integration tests: supervisor lifecycle, retry timing, queueing and
//! reconnection against an in-memory device on a paused clock.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, DuplexStream, ReadBuf};
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use oled_core::{
    BoxedStream, Connector, Display, DisplayHandle, Link, LinkConfig, LinkError, RetryPolicy,
    SendError, Supervisor, SupervisorConfig, WireCommand, send_with_retry,
};

// ── Helpers ──────────────────────────────────────────────────────

/// One line as seen by the fake microcontroller.
#[derive(Debug)]
struct WireLine {
    /// 1-based connection number.
    conn: u32,
    line: String,
    at: Instant,
}

/// Host side of the duplex pipe, with injectable write failures.
struct FlakyStream {
    inner: DuplexStream,
    fail_writes: Arc<AtomicU32>,
}

impl AsyncRead for FlakyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FlakyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let injected = this
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Scriptable stand-in for the serial device.
struct TestDevice {
    refuse_opens: AtomicU32,
    fail_writes: Arc<AtomicU32>,
    connections: AtomicU32,
    opens: Mutex<Vec<Instant>>,
    wire: mpsc::UnboundedSender<WireLine>,
    unplug: Arc<Notify>,
    hang_up_after: Arc<Mutex<Option<String>>>,
}

impl TestDevice {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<WireLine>) {
        let (wire, rx) = mpsc::unbounded_channel();
        let device = Arc::new(Self {
            refuse_opens: AtomicU32::new(0),
            fail_writes: Arc::new(AtomicU32::new(0)),
            connections: AtomicU32::new(0),
            opens: Mutex::new(Vec::new()),
            wire,
            unplug: Arc::new(Notify::new()),
            hang_up_after: Arc::new(Mutex::new(None)),
        });
        (device, rx)
    }

    fn refuse_next_opens(&self, n: u32) {
        self.refuse_opens.store(n, Ordering::SeqCst);
    }

    fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    fn hang_up_after(&self, line: &str) {
        *self.hang_up_after.lock().unwrap() = Some(line.to_string());
    }

    fn unplug(&self) {
        self.unplug.notify_one();
    }

    fn open_attempts(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for TestDevice {
    async fn connect(&self, _config: &LinkConfig) -> io::Result<BoxedStream> {
        self.opens.lock().unwrap().push(Instant::now());

        let refused = self
            .refuse_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(io::Error::new(io::ErrorKind::NotFound, "device not present"));
        }

        let conn = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        let (host, device) = tokio::io::duplex(4096);
        tokio::spawn(record_lines(
            conn,
            device,
            self.wire.clone(),
            self.unplug.clone(),
            self.hang_up_after.clone(),
        ));
        Ok(Box::new(FlakyStream {
            inner: host,
            fail_writes: self.fail_writes.clone(),
        }))
    }
}

/// Device side of one connection: forward every line, hang up on request.
async fn record_lines(
    conn: u32,
    device: DuplexStream,
    wire: mpsc::UnboundedSender<WireLine>,
    unplug: Arc<Notify>,
    hang_up_after: Arc<Mutex<Option<String>>>,
) {
    let mut lines = BufReader::new(device).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { return };
                let hang_up = {
                    let mut trigger = hang_up_after.lock().unwrap();
                    if trigger.as_deref() == Some(line.as_str()) {
                        trigger.take();
                        true
                    } else {
                        false
                    }
                };
                let _ = wire.send(WireLine { conn, line, at: Instant::now() });
                if hang_up {
                    return;
                }
            }
            () = unplug.notified() => return,
        }
    }
}

fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        link: LinkConfig::new("/dev/ttyTEST0", 9600),
        reconnect_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

async fn next_line(wire: &mut mpsc::UnboundedReceiver<WireLine>) -> WireLine {
    tokio::time::timeout(Duration::from_secs(60), wire.recv())
        .await
        .expect("timeout waiting for wire line")
        .expect("wire closed")
}

/// Consume the `reset` / `clear` pair every open starts with.
async fn expect_reset_sequence(wire: &mut mpsc::UnboundedReceiver<WireLine>) -> (WireLine, WireLine) {
    let reset = next_line(wire).await;
    assert_eq!(reset.line, "reset");
    let clear = next_line(wire).await;
    assert_eq!(clear.line, "clear");
    (reset, clear)
}

async fn wait_for_queued(handle: &DisplayHandle, n: usize) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while handle.status().queued < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("commands never queued");
}

// ── Startup ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_startup_resets_display() {
    let (device, mut wire) = TestDevice::new();
    let (handle, _task) = assert_ok!(Supervisor::spawn(test_config(), device.clone()).await);

    assert!(handle.is_connected());
    let (reset, clear) = expect_reset_sequence(&mut wire).await;
    assert!(clear.at - reset.at >= Duration::from_secs(2));
    assert_eq!(reset.conn, 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_without_auto_reconnect_is_surfaced() {
    let (device, _wire) = TestDevice::new();
    device.refuse_next_opens(1);
    let config = SupervisorConfig {
        auto_reconnect: false,
        ..test_config()
    };

    let err = assert_err!(Supervisor::spawn(config, device.clone()).await);
    assert!(matches!(err, LinkError::OpenFailed { .. }));
    assert_eq!(device.open_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_fails_twice_then_succeeds() {
    let (device, mut wire) = TestDevice::new();
    device.refuse_next_opens(2);

    let started = Instant::now();
    let (handle, _task) = assert_ok!(Supervisor::spawn(test_config(), device.clone()).await);
    assert!(!handle.is_connected());

    assert_ok!(handle.wait_until_connected().await);
    assert!(started.elapsed() >= Duration::from_millis(200));

    let opens = device.open_attempts();
    assert_eq!(opens.len(), 3);
    assert!(opens[1] - opens[0] >= Duration::from_millis(100));
    assert!(opens[2] - opens[1] >= Duration::from_millis(100));
    assert_eq!(handle.status().open_failures, 2);

    expect_reset_sequence(&mut wire).await;
}

// ── Display facade ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_show_text_wire_format() {
    let (device, mut wire) = TestDevice::new();
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();
    let display = Display::new(handle, 128, 56);
    expect_reset_sequence(&mut wire).await;

    assert_ok!(display.show_text("Hi", 10, 10).await);
    assert_ok!(display.scroll("news").await);
    assert_ok!(display.show_multiline("a\\nb").await);

    assert_eq!(next_line(&mut wire).await.line, "textxy:10,10,Hi");
    assert_eq!(next_line(&mut wire).await.line, "scroll:news");
    assert_eq!(next_line(&mut wire).await.line, "multiline:a\\nb");
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_sends_are_spaced_by_settle_delay() {
    let (device, mut wire) = TestDevice::new();
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();
    expect_reset_sequence(&mut wire).await;

    let (a, b) = tokio::join!(
        handle.send(WireCommand::Clear),
        handle.send(WireCommand::Logo)
    );
    assert_ok!(a);
    assert_ok!(b);

    let first = next_line(&mut wire).await;
    let second = next_line(&mut wire).await;
    assert_eq!(first.line, "clear");
    assert_eq!(second.line, "logo");
    assert!(second.at - first.at >= Duration::from_millis(100));
}

// ── Send protocol ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_write_fails_twice_then_succeeds() {
    let (device, mut wire) = TestDevice::new();
    let (mut link, _events) = Link::new(LinkConfig::new("/dev/ttyTEST0", 9600), device.clone());
    link.open().await.unwrap();

    device.fail_next_writes(2);
    let started = Instant::now();
    let attempts = assert_ok!(
        send_with_retry(&mut link, &WireCommand::Clear, &RetryPolicy::default()).await
    );

    assert_eq!(attempts, 3);
    // 500ms + 1000ms backoff, then the 100ms settle.
    assert!(started.elapsed() >= Duration::from_millis(1600));
    assert_eq!(next_line(&mut wire).await.line, "clear");
}

#[tokio::test(start_paused = true)]
async fn test_write_fails_three_times_is_not_requeued() {
    let (device, mut wire) = TestDevice::new();
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();
    expect_reset_sequence(&mut wire).await;

    device.fail_next_writes(3);
    let err = assert_err!(handle.send(WireCommand::Weather).await);
    assert!(matches!(err, SendError::DeliveryFailed { attempts: 3, .. }));
    assert_eq!(handle.status().queued, 0);

    assert_ok!(handle.send(WireCommand::Directions).await);
    assert_eq!(next_line(&mut wire).await.line, "directions");
}

#[tokio::test(start_paused = true)]
async fn test_embedded_newline_is_rejected_without_retry() {
    let (device, _wire) = TestDevice::new();
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();

    let err = assert_err!(handle.send(WireCommand::Text("a\nb".into())).await);
    assert!(matches!(err, SendError::InvalidCommand(_)));
}

// ── Queueing & reconnection ──────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_commands_queued_while_closed_are_delivered_in_order() {
    let (device, mut wire) = TestDevice::new();
    device.refuse_next_opens(1);
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();

    let (a, b) = tokio::join!(
        handle.send(WireCommand::Clear),
        handle.send(WireCommand::text_xy("Hi", 0, 0))
    );
    assert_ok!(a);
    assert_ok!(b);

    expect_reset_sequence(&mut wire).await;
    let first = next_line(&mut wire).await;
    let second = next_line(&mut wire).await;
    assert_eq!(first.line, "clear");
    assert_eq!(second.line, "textxy:0,0,Hi");
    assert!(second.at - first.at >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_drain_stops_when_link_drops_mid_drain() {
    let (device, mut wire) = TestDevice::new();
    device.refuse_next_opens(1);
    device.hang_up_after("text:A");
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();

    let (a, b, c) = tokio::join!(
        handle.send(WireCommand::Text("A".into())),
        handle.send(WireCommand::Text("B".into())),
        handle.send(WireCommand::Text("C".into()))
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);

    let mut seen = Vec::new();
    while let Ok(line) = wire.try_recv() {
        seen.push((line.conn, line.line));
    }
    let expected: Vec<(u32, String)> = vec![
        (1, "reset".into()),
        (1, "clear".into()),
        (1, "text:A".into()),
        (2, "reset".into()),
        (2, "clear".into()),
        (2, "text:B".into()),
        (2, "text:C".into()),
    ];
    assert_eq!(seen, expected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_unplug_at_fixed_interval() {
    let (device, mut wire) = TestDevice::new();
    let (handle, _task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();
    expect_reset_sequence(&mut wire).await;

    device.refuse_next_opens(2);
    device.unplug();

    // Wait for the supervisor to notice, then for it to come back.
    tokio::time::timeout(Duration::from_secs(60), async {
        while handle.is_connected() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    let dropped_at = Instant::now();
    assert_ok!(handle.wait_until_connected().await);

    let opens = device.open_attempts();
    assert_eq!(opens.len(), 4);
    assert!(opens[1] - dropped_at >= Duration::from_millis(99));
    assert!(opens[2] - opens[1] >= Duration::from_millis(100));
    assert!(opens[3] - opens[2] >= Duration::from_millis(100));

    let (reset, _) = expect_reset_sequence(&mut wire).await;
    assert_eq!(reset.conn, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unplug_without_auto_reconnect_stays_closed() {
    let (device, mut wire) = TestDevice::new();
    let config = SupervisorConfig {
        auto_reconnect: false,
        ..test_config()
    };
    let (handle, task) = assert_ok!(Supervisor::spawn(config, device.clone()).await);
    expect_reset_sequence(&mut wire).await;

    device.unplug();
    tokio::time::timeout(Duration::from_secs(60), async {
        while handle.is_connected() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    assert!(handle.status().phase.is_terminal());

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.send(WireCommand::Logo).await }
    });
    wait_for_queued(&handle, 1).await;

    // Well past several reconnect intervals: nothing reopens.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(device.open_attempts().len(), 1);
    assert_eq!(handle.status().queued, 1);
    assert!(wire.try_recv().is_err());

    assert_eq!(assert_ok!(handle.shutdown().await), 1);
    assert!(matches!(pending.await.unwrap(), Err(SendError::QueueAbandoned)));
    task.await.unwrap();
}

// ── Shutdown ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_queued_commands() {
    let (device, _wire) = TestDevice::new();
    device.refuse_next_opens(u32::MAX);
    let (handle, task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();

    let first = tokio::spawn({
        let handle = handle.clone();
        async move { handle.send(WireCommand::Clear).await }
    });
    wait_for_queued(&handle, 1).await;
    let second = tokio::spawn({
        let handle = handle.clone();
        async move { handle.send(WireCommand::Help).await }
    });
    wait_for_queued(&handle, 2).await;

    assert_eq!(assert_ok!(handle.shutdown().await), 2);
    assert!(matches!(first.await.unwrap(), Err(SendError::QueueAbandoned)));
    assert!(matches!(second.await.unwrap(), Err(SendError::QueueAbandoned)));

    task.await.unwrap();
    assert!(handle.status().phase.is_terminal());
    assert!(matches!(
        handle.send(WireCommand::Clear).await,
        Err(SendError::SupervisorStopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_stops_supervisor() {
    let (device, _wire) = TestDevice::new();
    let (handle, task) = Supervisor::spawn(test_config(), device.clone()).await.unwrap();

    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("supervisor kept running")
        .unwrap();
}
