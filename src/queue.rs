// src/queue.rs

//! Fixed-capacity outbound queue of fixed-size message slots.
//!
//! Any number of producers (scanner callback, heartbeat) may call
//! [`OutboundQueue::try_enqueue`]; it never waits. Only the transmit worker
//! calls [`OutboundQueue::dequeue`], which blocks until a slot is filled.
//! Messages leave in the order their enqueue completed.
//!
//! [`OutboundQueue::try_enqueue_reserving`] lets a producer leave slots free
//! for others. The length check and the send are not one atomic step, so with
//! several reserving producers the reserve can briefly be undershot.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// An encoded message, zero-padded to its slot size.
///
/// There is no mutable access: once built, the bytes stay as they are until
/// the transmit worker drops the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    slot: Box<[u8]>,
    len: usize,
}

impl Message {
    pub fn new(payload: &[u8], slot_size: usize) -> Result<Self> {
        if payload.len() > slot_size {
            return Err(Error::Overflow {
                len: payload.len(),
                max: slot_size,
            });
        }
        let mut slot = vec![0u8; slot_size].into_boxed_slice();
        slot[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            slot,
            len: payload.len(),
        })
    }

    /// Encoded bytes without padding
    pub fn payload(&self) -> &[u8] {
        &self.slot[..self.len]
    }

    /// Whole slot, as handed to the transport
    pub fn frame(&self) -> &[u8] {
        &self.slot
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slot_size(&self) -> usize {
        self.slot.len()
    }
}

pub struct OutboundQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    slot_size: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize, slot_size: usize) -> Result<Self> {
        // bounded(0) would be a rendezvous channel with no slots at all
        if capacity == 0 || slot_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "queue needs capacity and slot size > 0 (got {} x {})",
                capacity, slot_size
            )));
        }
        let (tx, rx) = bounded(capacity);
        Ok(Self { tx, rx, slot_size })
    }

    /// Place a message in the next free slot, or fail immediately when full.
    ///
    /// On failure the message is dropped; callers log and move on.
    pub fn try_enqueue(&self, message: Message) -> Result<()> {
        if message.slot_size() != self.slot_size {
            return Err(Error::SlotSize {
                expected: self.slot_size,
                actual: message.slot_size(),
            });
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(Error::QueueClosed),
        }
    }

    /// Like [`try_enqueue`](Self::try_enqueue), but fails with `QueueFull`
    /// while fewer than `keep_free + 1` slots are free.
    pub fn try_enqueue_reserving(&self, message: Message, keep_free: usize) -> Result<()> {
        if self.len() + keep_free >= self.capacity() {
            return Err(Error::QueueFull);
        }
        self.try_enqueue(message)
    }

    /// Block until a message is available
    pub fn dequeue(&self) -> Result<Message> {
        self.rx.recv().map_err(|_| Error::QueueClosed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        // always Some for a bounded channel
        self.tx.capacity().unwrap_or(0)
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }
}
