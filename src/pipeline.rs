// src/pipeline.rs

//! Startup of the forwarding path and the state shared by its tasks.
//!
//! Everything the scanner callback, heartbeat and transmit worker need lives
//! in one [`PipelineContext`] built at startup and shared behind an `Arc`.
//! The outbound queue is the only thing in it that is written from more than
//! one thread, and it does its own locking.

use crate::config::Config;
use crate::downlink::{PeerInfo, TRANSMIT_YIELD, Transport, transmit_loop};
use crate::encoder::encode_reading;
use crate::error::{Error, Result};
use crate::heartbeat::heartbeat_loop;
use crate::queue::OutboundQueue;
use crate::sensor;
use crate::sensor_data::Advertisement;
use crate::stack::StackWatermark;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const HEARTBEAT_STACK_SIZE: usize = 128 * 1024;
pub const TRANSMIT_STACK_SIZE: usize = 128 * 1024;

/// Slots sensor readings may never take, so a heartbeat always finds room
pub const HEARTBEAT_RESERVED_SLOTS: usize = 1;

/// Forwarding counters, updated lock-free from every context
#[derive(Debug, Default)]
pub struct RelayStats {
    readings: AtomicU64,
    heartbeats: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_other: AtomicU64,
    sent: AtomicU64,
    send_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub readings: u64,
    pub heartbeats: u64,
    pub dropped_queue_full: u64,
    pub dropped_overflow: u64,
    /// Encode, slot-size or closed-queue failures
    pub dropped_other: u64,
    pub sent: u64,
    pub send_failed: u64,
}

impl RelayStats {
    pub fn record_reading(&self) {
        self.readings.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }
    /// Count a lost message under the counter matching its cause
    pub fn record_drop(&self, err: &Error) {
        let counter = match err {
            Error::QueueFull => &self.dropped_queue_full,
            Error::Overflow { .. } => &self.dropped_overflow,
            _ => &self.dropped_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_send_failed(&self) {
        self.send_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings: self.readings.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_other: self.dropped_other.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            send_failed: self.send_failed.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one advertisement
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Filter miss: not one of our sensors
    Ignored,
    Queued,
    /// Decoded but lost (overflow, queue full, or a slot/queue fault)
    Dropped(Error),
}

pub struct PipelineContext {
    pub device_name: String,
    pub max_message_len: usize,
    pub queue: OutboundQueue,
    pub heartbeat_stack: Arc<StackWatermark>,
    pub transmit_stack: Arc<StackWatermark>,
    pub stats: RelayStats,
    started: Instant,
}

impl PipelineContext {
    pub fn new(config: &Config) -> Result<Self> {
        if config.queue_capacity <= HEARTBEAT_RESERVED_SLOTS {
            return Err(Error::InvalidConfig(format!(
                "queue_capacity must be > {} (heartbeat reserve), got {}",
                HEARTBEAT_RESERVED_SLOTS, config.queue_capacity
            )));
        }
        Ok(Self {
            device_name: config.device_name.clone(),
            max_message_len: config.max_message_len,
            queue: OutboundQueue::new(config.queue_capacity, config.max_message_len)?,
            heartbeat_stack: Arc::new(StackWatermark::new(HEARTBEAT_STACK_SIZE)),
            transmit_stack: Arc::new(StackWatermark::new(TRANSMIT_STACK_SIZE)),
            stats: RelayStats::default(),
            started: Instant::now(),
        })
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Scanner callback: decode, encode and try to queue one advertisement.
    ///
    /// Never blocks. Readings may fill all but [`HEARTBEAT_RESERVED_SLOTS`]
    /// slots; beyond that the reading is dropped.
    pub fn on_advertisement(&self, advert: &Advertisement) -> ForwardOutcome {
        let Some(reading) = sensor::decode(advert) else {
            return ForwardOutcome::Ignored;
        };

        let message = match encode_reading(&reading, &self.device_name, self.max_message_len) {
            Ok(m) => m,
            Err(e) => {
                self.stats.record_drop(&e);
                log::warn!("Reading from {} not sent: {}", reading.device_label, e);
                return ForwardOutcome::Dropped(e);
            }
        };

        match self.queue.try_enqueue_reserving(message, HEARTBEAT_RESERVED_SLOTS) {
            Ok(()) => {
                self.stats.record_reading();
                ForwardOutcome::Queued
            }
            Err(e) => {
                self.stats.record_drop(&e);
                log::warn!("Reading from {} dropped: {}", reading.device_label, e);
                ForwardOutcome::Dropped(e)
            }
        }
    }
}

/// Handle to a running pipeline. Dropping it does not stop the tasks.
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    heartbeat: JoinHandle<()>,
    transmit: JoinHandle<()>,
}

impl Pipeline {
    /// Bring up the transport, register the broadcast peer, create the queue
    /// and spawn the heartbeat and transmit tasks.
    ///
    /// Stops at the first failing step. Steps already done are not undone.
    pub fn start<T: Transport + 'static>(config: &Config, transport: T) -> Result<Self> {
        Self::start_with_yield(config, transport, TRANSMIT_YIELD)
    }

    pub fn start_with_yield<T: Transport + 'static>(
        config: &Config,
        mut transport: T,
        transmit_yield: Duration,
    ) -> Result<Self> {
        transport.init()?;
        log::info!("Transport initialized");

        let peer = PeerInfo::broadcast(config.transport.channel);
        transport.add_peer(&peer)?;

        let ctx = Arc::new(PipelineContext::new(config)?);
        log::info!(
            "Outbound queue: {} slots x {} bytes",
            ctx.queue.capacity(),
            ctx.queue.slot_size()
        );

        let period = config.heartbeat_period();
        let heartbeat = {
            let ctx = ctx.clone();
            thread::Builder::new()
                .name("heartbeat".into())
                .stack_size(HEARTBEAT_STACK_SIZE)
                .spawn(move || heartbeat_loop(ctx, period))
                .map_err(Error::Spawn)?
        };

        let transmit = {
            let ctx = ctx.clone();
            thread::Builder::new()
                .name("transmit".into())
                .stack_size(TRANSMIT_STACK_SIZE)
                .spawn(move || transmit_loop(ctx, transport, peer.address, transmit_yield))
                .map_err(Error::Spawn)?
        };

        Ok(Self {
            ctx,
            heartbeat,
            transmit,
        })
    }

    pub fn context(&self) -> Arc<PipelineContext> {
        self.ctx.clone()
    }

    /// True while both background tasks are alive
    pub fn is_running(&self) -> bool {
        !self.heartbeat.is_finished() && !self.transmit.is_finished()
    }
}
