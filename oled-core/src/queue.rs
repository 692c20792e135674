//! FIFO buffer of commands waiting for a usable link.
//!
//! Producers only append; the supervisor's drain loop is the single
//! consumer. The queue is unbounded: traffic is human-paced voice and
//! button input.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::command::WireCommand;
use crate::error::SendError;

/// Completion signal handed back to whoever issued the command.
pub type Reply = oneshot::Sender<Result<(), SendError>>;

// ── PendingCommand ───────────────────────────────────────────────

/// A command accepted while the link was not ready.
#[derive(Debug)]
pub struct PendingCommand {
    pub command: WireCommand,
    reply: Reply,
    enqueued_at: Instant,
}

impl PendingCommand {
    pub fn new(command: WireCommand, reply: Reply) -> Self {
        Self {
            command,
            reply,
            enqueued_at: Instant::now(),
        }
    }

    /// How long this entry has been waiting.
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Resolve the caller's pending result. Consumes the entry.
    pub fn complete(self, result: Result<(), SendError>) {
        // Caller may have stopped waiting.
        let _ = self.reply.send(result);
    }
}

// ── CommandQueue ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<PendingCommand>,
    draining: bool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Never drops.
    pub fn enqueue(&mut self, entry: PendingCommand) {
        self.entries.push_back(entry);
    }

    /// Remove and return the head entry, or `None` when empty.
    pub fn drain_one(&mut self) -> Option<PendingCommand> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claim the drain loop. Returns `false` if a drain is already running.
    pub fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    pub fn end_drain(&mut self) {
        self.draining = false;
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Reject every queued entry with [`SendError::QueueAbandoned`].
    ///
    /// Returns how many entries were rejected.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            entry.complete(Err(SendError::QueueAbandoned));
        }
        count
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(command: WireCommand) -> (PendingCommand, oneshot::Receiver<Result<(), SendError>>) {
        let (tx, rx) = oneshot::channel();
        (PendingCommand::new(command, tx), rx)
    }

    #[tokio::test]
    async fn drains_in_submission_order() {
        let mut queue = CommandQueue::new();
        let (a, _ra) = pending(WireCommand::Clear);
        let (b, _rb) = pending(WireCommand::text_xy("Hi", 0, 0));
        let (c, _rc) = pending(WireCommand::Logo);
        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain_one().unwrap().command, WireCommand::Clear);
        assert_eq!(
            queue.drain_one().unwrap().command,
            WireCommand::text_xy("Hi", 0, 0)
        );
        assert_eq!(queue.drain_one().unwrap().command, WireCommand::Logo);
        assert!(queue.drain_one().is_none());
    }

    #[test]
    fn second_drain_is_a_noop() {
        let mut queue = CommandQueue::new();
        assert!(queue.begin_drain());
        assert!(queue.is_draining());
        assert!(!queue.begin_drain());
        queue.end_drain();
        assert!(queue.begin_drain());
    }

    #[tokio::test]
    async fn abandon_rejects_every_waiter() {
        let mut queue = CommandQueue::new();
        let (a, ra) = pending(WireCommand::Clear);
        let (b, rb) = pending(WireCommand::Help);
        queue.enqueue(a);
        queue.enqueue(b);

        assert_eq!(queue.abandon_all(), 2);
        assert!(queue.is_empty());
        assert!(matches!(ra.await.unwrap(), Err(SendError::QueueAbandoned)));
        assert!(matches!(rb.await.unwrap(), Err(SendError::QueueAbandoned)));
    }

    #[tokio::test]
    async fn complete_survives_dropped_receiver() {
        let (entry, rx) = pending(WireCommand::Clear);
        drop(rx);
        entry.complete(Ok(()));
    }
}
