// src/heartbeat.rs

use crate::encoder::encode_heartbeat;
use crate::error::Result;
use crate::pipeline::PipelineContext;
use crate::sensor_data::{HeartbeatStatus, StackHeadroom};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Format elapsed time as `"%2dd%2dh%2dm"`, e.g. `" 1d 2h 3m"`
pub fn uptime_text(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let days = secs / SECS_PER_DAY;
    let hours = (secs % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;
    format!("{:2}d{:2}h{:2}m", days, hours, minutes)
}

/// Samples available memory and remembers the lowest value seen
pub struct MemorySampler {
    system: System,
    min_free: Option<u64>,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            min_free: None,
        }
    }

    /// Returns (current free, minimum free) in bytes
    pub fn sample(&mut self) -> (u64, u64) {
        self.system.refresh_memory();
        crate::stack::mark_current();
        let free = self.system.available_memory();
        let min = self.min_free.map_or(free, |m| m.min(free));
        self.min_free = Some(min);
        (free, min)
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_status(ctx: &PipelineContext, memory: &mut MemorySampler) -> HeartbeatStatus {
    let (free, min_free) = memory.sample();
    HeartbeatStatus {
        device_name: ctx.device_name.clone(),
        uptime_text: uptime_text(ctx.uptime()),
        stack_headroom: StackHeadroom {
            producer: ctx.heartbeat_stack.headroom(),
            consumer: ctx.transmit_stack.headroom(),
        },
        free_heap_bytes: free,
        min_free_heap_bytes: min_free,
    }
}

/// One heartbeat: sample, encode, enqueue. Errors mean this tick is lost.
pub fn heartbeat_tick(ctx: &PipelineContext, memory: &mut MemorySampler) -> Result<()> {
    let status = build_status(ctx, memory);
    ctx.heartbeat_stack.mark();
    let queued = encode_heartbeat(&status, ctx.max_message_len)
        .and_then(|message| ctx.queue.try_enqueue(message));
    ctx.heartbeat_stack.mark();
    if let Err(e) = queued {
        ctx.stats.record_drop(&e);
        return Err(e);
    }
    ctx.stats.record_heartbeat();
    log::debug!(
        "Heartbeat {} | stack R={} W={} | free {} min {}",
        status.uptime_text,
        status.stack_headroom.producer,
        status.stack_headroom.consumer,
        status.free_heap_bytes,
        status.min_free_heap_bytes
    );
    Ok(())
}

/// Heartbeat task. Fires immediately, then at a fixed rate of `period`.
pub fn heartbeat_loop(ctx: Arc<PipelineContext>, period: Duration) {
    ctx.heartbeat_stack.anchor();
    let mut memory = MemorySampler::new();
    let mut next_tick = Instant::now();

    loop {
        if let Err(e) = heartbeat_tick(&ctx, &mut memory) {
            log::warn!("Heartbeat skipped: {}", e);
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // fell behind; restart the schedule instead of bursting
            next_tick = now;
        }
    }
}
