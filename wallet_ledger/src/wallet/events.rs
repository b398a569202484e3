//! Post-commit ledger events.
//!
//! Side tasks such as notification delivery subscribe through an
//! [`EventSink`]. Events are published only after a unit of work has
//! committed, and publishing can never fail or undo the mutation.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;

use super::models::{LedgerEntry, UserId};

/// A committed money movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposited {
        entry: LedgerEntry,
        new_balance: Decimal,
    },
    Withdrawn {
        entry: LedgerEntry,
        new_balance: Decimal,
    },
    Transferred {
        entry: LedgerEntry,
    },
}

impl LedgerEvent {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            LedgerEvent::Deposited { entry, .. }
            | LedgerEvent::Withdrawn { entry, .. }
            | LedgerEvent::Transferred { entry } => entry,
        }
    }

    /// Users who should hear about this event
    pub fn recipients(&self) -> Vec<UserId> {
        let entry = self.entry();
        if entry.sender_id == entry.receiver_id {
            vec![entry.sender_id]
        } else {
            vec![entry.sender_id, entry.receiver_id]
        }
    }
}

/// Receiver of post-commit events
pub trait EventSink: Send + Sync {
    /// Hand off an event. Must not block; failures are the sink's to handle.
    fn publish(&self, event: LedgerEvent);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: LedgerEvent) {}
}

/// Sink forwarding events into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<LedgerEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: mpsc::Sender<LedgerEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink and the receiver end consumers read from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LedgerEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: LedgerEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!(
                    "Event channel full, dropping event for entry {}",
                    event.entry().id
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                log::debug!(
                    "Event consumer gone, dropping event for entry {}",
                    event.entry().id
                );
            }
        }
    }
}
