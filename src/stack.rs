// src/stack.rs

//! Per-task stack high-water estimate.
//!
//! The owning thread anchors its watermark at entry, which also registers it
//! as that thread's current watermark. Deep code paths (transport sends,
//! encoding, memory sampling) then call [`mark_current`] from inside their
//! own frames, so the recorded depth includes them. Depth is the distance
//! between the anchor and the deepest marked frame, so headroom is an
//! estimate; frames that never mark are not seen. Assumes a downward-growing
//! stack.

use std::cell::RefCell;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

thread_local! {
    static CURRENT: RefCell<Option<Arc<StackWatermark>>> = const { RefCell::new(None) };
}

#[derive(Debug)]
pub struct StackWatermark {
    stack_size: usize,
    base: AtomicUsize,
    deepest: AtomicUsize,
}

impl StackWatermark {
    pub fn new(stack_size: usize) -> Self {
        Self {
            stack_size,
            base: AtomicUsize::new(0),
            deepest: AtomicUsize::new(0),
        }
    }

    /// Record the current frame as the top of the stack and register this
    /// watermark for the calling thread. Call once from the owning thread.
    #[inline(never)]
    pub fn anchor(self: &Arc<Self>) {
        let here = 0u8;
        let addr = black_box(&here) as *const u8 as usize;
        self.base.store(addr, Ordering::Relaxed);
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));
    }

    #[inline(never)]
    pub fn mark(&self) {
        let base = self.base.load(Ordering::Relaxed);
        if base == 0 {
            return;
        }
        let here = 0u8;
        let addr = black_box(&here) as *const u8 as usize;
        let depth = base.saturating_sub(addr);
        self.deepest.fetch_max(depth, Ordering::Relaxed);
    }

    /// Bytes never reached so far. Before `anchor` this is the full stack size.
    pub fn headroom(&self) -> usize {
        self.stack_size.saturating_sub(self.deepest.load(Ordering::Relaxed))
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }
}

/// Mark the calling thread's watermark, if it has one. No-op elsewhere
/// (e.g. on the scanner's callback thread).
#[inline(never)]
pub fn mark_current() {
    CURRENT.with(|current| {
        if let Some(wm) = current.borrow().as_ref() {
            wm.mark();
        }
    });
}
