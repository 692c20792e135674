//! Byte-stream link to the display microcontroller.
//!
//! A [`Link`] owns at most one open transport at a time. Writes happen
//! inline on the caller's task; a background reader task logs whatever
//! the firmware prints and reports unexpected closure through
//! [`LinkEvent`]s so the supervisor can reconnect.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::codec::LineCodec;
use crate::error::{BridgeError, LinkError};

// ── Transport seam ───────────────────────────────────────────────

/// Anything that can stand in for the serial device.
pub trait DeviceStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DeviceStream for T {}

pub type BoxedStream = Box<dyn DeviceStream>;

/// Opens the underlying transport for a [`Link`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &LinkConfig) -> std::io::Result<BoxedStream>;
}

/// Production connector backed by `tokio-serial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self, config: &LinkConfig) -> std::io::Result<BoxedStream> {
        let stream = tokio_serial::new(&config.port, config.baud_rate).open_native_async()?;
        Ok(Box::new(stream))
    }
}

// ── LinkConfig ───────────────────────────────────────────────────

/// Where the display lives and how fast to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
        }
    }
}

// ── LinkEvent ────────────────────────────────────────────────────

/// Lifecycle notifications from a [`Link`].
///
/// Each event carries the generation of the connection it belongs to,
/// so events from an already-replaced connection can be ignored.
#[derive(Debug)]
pub enum LinkEvent {
    /// `open()` succeeded.
    Opened { generation: u64 },
    /// The device side closed the stream (EOF) or `close()` was called.
    Closed { generation: u64 },
    /// The transport failed while reading (e.g. device unplugged).
    Fault {
        generation: u64,
        error: std::io::Error,
    },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Opened { generation }
            | Self::Closed { generation }
            | Self::Fault { generation, .. } => *generation,
        }
    }
}

pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

// ── Link ─────────────────────────────────────────────────────────

pub struct Link {
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    writer: Option<WriteHalf<BoxedStream>>,
    reader: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    generation: u64,
    last_error: Option<String>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("port", &self.config.port)
            .field("baud_rate", &self.config.baud_rate)
            .field("open", &self.is_open())
            .field("generation", &self.generation)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Link {
    /// Create a closed link and the receiver for its lifecycle events.
    pub fn new(config: LinkConfig, connector: Arc<dyn Connector>) -> (Self, LinkEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let link = Self {
            config,
            connector,
            writer: None,
            reader: None,
            events,
            generation: 0,
            last_error: None,
        };
        (link, rx)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Generation of the current (or most recent) connection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Open the device. Any previously open connection is closed first.
    pub async fn open(&mut self) -> Result<(), LinkError> {
        self.close();

        info!(
            "opening {} at {} baud",
            self.config.port, self.config.baud_rate
        );
        let stream = match self.connector.connect(&self.config).await {
            Ok(stream) => stream,
            Err(source) => {
                self.last_error = Some(source.to_string());
                return Err(LinkError::OpenFailed {
                    path: self.config.port.clone(),
                    source,
                });
            }
        };

        self.generation += 1;
        let (read_half, write_half) = tokio::io::split(stream);
        self.writer = Some(write_half);
        self.reader = Some(tokio::spawn(read_replies(
            FramedRead::new(read_half, LineCodec),
            self.generation,
            self.events.clone(),
        )));
        self.last_error = None;

        let _ = self.events.send(LinkEvent::Opened {
            generation: self.generation,
        });
        info!("serial link open (generation {})", self.generation);
        Ok(())
    }

    /// Close the device. Idempotent; emits `Closed` only if it was open.
    pub fn close(&mut self) {
        if self.writer.is_none() {
            return;
        }
        self.teardown();
        let _ = self.events.send(LinkEvent::Closed {
            generation: self.generation,
        });
        debug!("serial link closed (generation {})", self.generation);
    }

    /// Forget the transport after the reader reported it gone.
    ///
    /// Unlike [`close`](Self::close) this emits nothing: the event that
    /// triggered it has already been delivered.
    pub fn mark_dropped(&mut self, error: Option<String>) {
        self.teardown();
        if error.is_some() {
            self.last_error = error;
        }
    }

    /// Write raw bytes and flush them to the device.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::Closed)?;
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;

        result.map_err(|e| {
            self.last_error = Some(e.to_string());
            LinkError::WriteFailed(e)
        })
    }

    fn teardown(&mut self) {
        self.writer = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

// ── Reader task ──────────────────────────────────────────────────

async fn read_replies(
    mut replies: FramedRead<ReadHalf<BoxedStream>, LineCodec>,
    generation: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        match replies.next().await {
            Some(Ok(line)) => {
                if !line.trim().is_empty() {
                    debug!(reply = %line.trim(), "received from display");
                }
            }
            Some(Err(e)) => {
                let error = match e {
                    BridgeError::Io(io) => io,
                    other => std::io::Error::other(other.to_string()),
                };
                warn!("serial read error: {error}");
                let _ = events.send(LinkEvent::Fault { generation, error });
                return;
            }
            None => {
                let _ = events.send(LinkEvent::Closed { generation });
                return;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};

    use super::*;

    /// Hands out the pre-built stream once, then refuses.
    struct OneShot(Mutex<Option<DuplexStream>>);

    #[async_trait]
    impl Connector for OneShot {
        async fn connect(&self, _config: &LinkConfig) -> std::io::Result<BoxedStream> {
            let stream = self.0.lock().unwrap().take();
            match stream {
                Some(stream) => Ok(Box::new(stream)),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such device",
                )),
            }
        }
    }

    fn link_with_device() -> (Link, LinkEventReceiver, DuplexStream) {
        let (host, device) = tokio::io::duplex(256);
        let connector = Arc::new(OneShot(Mutex::new(Some(host))));
        let (link, events) = Link::new(LinkConfig::new("/dev/null", 9600), connector);
        (link, events, device)
    }

    #[tokio::test]
    async fn open_write_close() {
        let (mut link, mut events, device) = link_with_device();
        link.open().await.unwrap();
        assert!(link.is_open());
        assert!(matches!(
            events.try_recv(),
            Ok(LinkEvent::Opened { generation: 1 })
        ));

        link.write(b"clear\n").await.unwrap();
        let mut lines = BufReader::new(device).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("clear"));

        link.close();
        link.close();
        assert!(!link.is_open());
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::Closed { generation: 1 })
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn open_failure_is_open_failed() {
        let connector = Arc::new(OneShot(Mutex::new(None)));
        let (mut link, _events) = Link::new(LinkConfig::new("/dev/ttyACM9", 9600), connector);
        let err = link.open().await.unwrap_err();
        assert!(matches!(err, LinkError::OpenFailed { ref path, .. } if path == "/dev/ttyACM9"));
        assert!(link.last_error().is_some());
    }

    #[tokio::test]
    async fn write_on_closed_link_fails() {
        let (mut link, _events, _device) = link_with_device();
        assert!(matches!(link.write(b"x\n").await, Err(LinkError::Closed)));
    }

    #[tokio::test]
    async fn device_hangup_emits_closed() {
        let (mut link, mut events, device) = link_with_device();
        link.open().await.unwrap();
        assert!(matches!(events.recv().await, Some(LinkEvent::Opened { .. })));

        drop(device);
        assert!(matches!(
            events.recv().await,
            Some(LinkEvent::Closed { generation: 1 })
        ));
    }
}
