//! 毫秒时钟
//! Millisecond clocks

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of millisecond ticks for the timer wheel.
///
/// Ticks are relative to an arbitrary origin and must never go backwards.
///
/// 为时间轮提供毫秒刻度的时钟。刻度相对于任意起点，且不能倒退。
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> u64;
}

/// Milliseconds elapsed since the clock was created.
/// 自时钟创建以来经过的毫秒数。
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A virtual clock that only moves when told to. Clones share the same time.
///
/// 只在被显式推进时才前进的虚拟时钟。克隆体共享同一时间。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward and returns the new time.
    /// 推进时钟并返回新的时间。
    pub fn advance(&self, ms: u64) -> u64 {
        self.now.fetch_add(ms, Ordering::SeqCst) + ms
    }

    /// Sets the clock, ignoring attempts to move it backwards.
    /// 设置时钟，忽略倒退的设置。
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
