use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::command::Response;
use crate::error::CommandError;

/// Single-slot store for the newest inbound reply.
///
/// The poller overwrites the slot, the correlator empties it. This only
/// attributes replies correctly while at most one command is awaiting its
/// reply, so [`Mailbox::begin`] refuses to open a second correlation.
#[derive(Debug, Default)]
pub struct Mailbox {
    inner: Mutex<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<Response>,
    pending: Option<String>,
    closed: bool,
}

/// What [`Mailbox::take`] found.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Reply(Response),
    Empty,
    Closed,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `response` as the newest reply, discarding any unconsumed one.
    pub fn publish(&self, response: Response) {
        let mut slot = self.slot();
        if let Some(old) = slot.latest.replace(response) {
            debug!(command = %old.command, "unconsumed reply overwritten");
        }
    }

    /// Remove and return the newest reply.
    pub fn take(&self) -> Delivery {
        let mut slot = self.slot();
        match slot.latest.take() {
            Some(response) => Delivery::Reply(response),
            None if slot.closed => Delivery::Closed,
            None => Delivery::Empty,
        }
    }

    /// Mark the inbound side finished. Replies already stored stay readable.
    pub fn close(&self) {
        self.slot().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.slot().closed
    }

    /// Name of the command currently awaiting its reply, if any.
    pub fn pending(&self) -> Option<String> {
        self.slot().pending.clone()
    }

    /// Open a correlation for `command` with a fresh retry budget.
    ///
    /// Drops any stale reply so it cannot be mistaken for the answer. The
    /// correlation ends when the returned guard is dropped.
    pub fn begin(
        &self,
        command: &str,
        attempts: u32,
        interval: Duration,
    ) -> Result<PendingCorrelation<'_>, CommandError> {
        let mut slot = self.slot();
        if slot.closed {
            return Err(CommandError::Disconnected);
        }
        if let Some(pending) = &slot.pending {
            return Err(CommandError::Busy {
                pending: pending.clone(),
            });
        }
        if let Some(stale) = slot.latest.take() {
            debug!(command = %stale.command, "discarding stale reply");
        }
        slot.pending = Some(command.to_string());

        Ok(PendingCorrelation {
            mailbox: self,
            command: command.to_string(),
            remaining: attempts,
            interval,
        })
    }
}

/// One outstanding command awaiting its reply.
#[derive(Debug)]
pub struct PendingCorrelation<'a> {
    mailbox: &'a Mailbox,
    command: String,
    remaining: u32,
    interval: Duration,
}

impl PendingCorrelation<'_> {
    /// Expected command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Attempts left in the budget.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Spacing between attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Consume one attempt; `false` once the budget is spent.
    pub fn next_attempt(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

impl Drop for PendingCorrelation<'_> {
    fn drop(&mut self) {
        self.mailbox.slot().pending = None;
    }
}
