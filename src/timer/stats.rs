//! 定时器管理器统计信息
//! Timer manager statistics

use super::WHEEL_LEVELS;

/// 定时器管理器统计信息
/// Timer manager statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// 挂起的定时器总数
    /// Total number of pending timers
    pub pending_timers: usize,
    /// 每个层级挂起的定时器数
    /// Pending timers per level, finest first
    pub level_timers: [usize; WHEEL_LEVELS],
    /// 每个层级的非空槽位数
    /// Non-empty slots per level, finest first
    pub level_non_empty_slots: [usize; WHEEL_LEVELS],
    /// 已到期但尚未触发的定时器数
    /// Timers already overdue and waiting to fire
    pub overdue_timers: usize,
    /// 已触发的定时器数
    /// Number of fired timers
    pub fired_timers: u64,
    /// 已取消的定时器数
    /// Number of cancelled timers
    pub cancelled_timers: u64,
    /// 节点池中可复用的节点数
    /// Nodes available for reuse in the pool
    pub pooled_nodes: usize,
    /// 最细层级的当前刻度
    /// Current tick of the finest level
    pub current_tick: u64,
}

impl std::fmt::Display for TimerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimerStats {{ pending: {}, levels: {:?}, overdue: {}, fired: {}, cancelled: {}, pooled: {}, tick: {} }}",
            self.pending_timers,
            self.level_timers,
            self.overdue_timers,
            self.fired_timers,
            self.cancelled_timers,
            self.pooled_nodes,
            self.current_tick
        )
    }
}
