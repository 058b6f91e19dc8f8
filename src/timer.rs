//! 分层时间轮定时器模块
//! Hierarchical Timing Wheel Timer Module
//!
//! 该模块实现了每个模块私有的分层时间轮：五个层级，每层256个槽位，
//! 粒度依次为1ms、256ms、65.5s、约4.7小时、约13.6天。只有最细层级由
//! 模块循环驱动；当某层级的索引回绕时，上一级当前槽位中的定时器会被
//! 重新分配到更细的层级。
//!
//! This module implements the per-module hierarchical timing wheel: five
//! levels of 256 slots each, with granularities of 1ms, 256ms, 65.5s, ~4.7h
//! and ~13.6d. Only the finest level is driven by the module loop; when a
//! level's index wraps, the current slot of the next coarser level is
//! redistributed ("turned") into the finer levels.

mod clock;
mod entry;
mod manager;
mod stats;
mod wheel;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use entry::TimerId;
pub use manager::{Expired, TimerManager};
pub use stats::TimerStats;

/// Number of wheel levels.
/// 时间轮层级数。
pub const WHEEL_LEVELS: usize = 5;

/// Number of slots per level.
/// 每层的槽位数。
pub const WHEEL_SLOTS: usize = 256;

/// Due ticks are kept within 40 bits so that `(due << 24) | seq` fits a `u64`.
/// 到期刻度限制在40位内，以便 `(due << 24) | seq` 能放入 `u64`。
pub const TICK_MASK: u64 = 0x0000_00FF_FFFF_FFFF;

/// Sequence IDs cycle through `[1, SEQ_LIMIT)`.
/// 序列号在 `[1, SEQ_LIMIT)` 范围内循环。
pub const SEQ_LIMIT: u32 = 0x00FF_FFFF;

/// The longest delay the coarsest level can hold.
/// 最粗层级能容纳的最长延迟。
pub const MAX_DELAY_MS: u64 = 255 << 32;

#[cfg(test)]
mod tests;
