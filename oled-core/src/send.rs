//! Per-command delivery: bounded retries with linear backoff, then a
//! settle pause so the firmware can finish the command before the next
//! one arrives.

use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::{debug, error, warn};

use crate::codec::LineCodec;
use crate::command::WireCommand;
use crate::error::SendError;
use crate::link::Link;

// ── RetryPolicy ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total write attempts, including the first.
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
    /// Pause after every successful write.
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            settle_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

// ── RetryState ───────────────────────────────────────────────────

/// Lives for exactly one `send_with_retry` call.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
}

impl RetryState {
    fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }
}

// ── send_with_retry ──────────────────────────────────────────────

/// Write `command` to an open link, retrying failed writes.
///
/// Returns the number of attempts it took. After `max_attempts`
/// failures the last link error is returned as
/// [`SendError::DeliveryFailed`]; the command is not requeued.
pub async fn send_with_retry(
    link: &mut Link,
    command: &WireCommand,
    policy: &RetryPolicy,
) -> Result<u32, SendError> {
    let mut frame = BytesMut::new();
    LineCodec
        .encode(command, &mut frame)
        .map_err(|e| SendError::InvalidCommand(e.to_string()))?;

    let mut state = RetryState::default();
    loop {
        let attempt = state.next_attempt();
        debug!(%command, attempt, "sending command");

        match link.write(&frame).await {
            Ok(()) => {
                tokio::time::sleep(policy.settle_delay).await;
                return Ok(attempt);
            }
            Err(e) if attempt >= policy.max_attempts => {
                error!(%command, "giving up after {attempt} attempts: {e}");
                return Err(SendError::DeliveryFailed {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    %command,
                    "write failed ({attempt}/{}): {e}; retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
