//! 时间轮层级
//! Timing wheel level

use super::WHEEL_SLOTS;
use super::entry::SlotList;

/// One granularity tier of the hierarchical wheel.
///
/// Slot `index` holds timers due in `[base_tick, base_tick + unit)`, slot
/// `index + k` the following `k`-th window. Neighbouring levels are addressed
/// by position in the manager's level array.
///
/// 分层时间轮的一个粒度层级。
///
/// 槽位 `index` 保存到期时间在 `[base_tick, base_tick + unit)` 内的定时器，
/// 槽位 `index + k` 对应之后的第 `k` 个窗口。相邻层级通过管理器层级数组中的位置寻址。
#[derive(Debug)]
pub(super) struct WheelLevel {
    pub(super) slots: Box<[SlotList]>,
    pub(super) index: u8,
    pub(super) bit_size: u32,
    pub(super) base_tick: u64,
    pub(super) count: usize,
}

impl WheelLevel {
    /// Creates level `level` aligned to `now`. Level 0 starts at `now`, every
    /// coarser level one unit later, so that level k-1 covers exactly the ticks
    /// before level k's base.
    ///
    /// 创建与 `now` 对齐的第 `level` 层。第0层从 `now` 开始，更粗的层级从一个单位之后开始，
    /// 使第 k-1 层恰好覆盖第 k 层基准之前的刻度。
    pub(super) fn new(level: usize, now: u64) -> Self {
        let bit_size = 8 * level as u32;
        let base_tick = if level == 0 { now } else { now + (1u64 << bit_size) };
        Self {
            slots: vec![SlotList::default(); WHEEL_SLOTS].into_boxed_slice(),
            index: 0,
            bit_size,
            base_tick,
            count: 0,
        }
    }

    /// Re-aligns an empty level to `now`.
    /// 将空层级重新对齐到 `now`。
    pub(super) fn reset(&mut self, now: u64) {
        debug_assert_eq!(self.count, 0);
        self.index = 0;
        self.base_tick = if self.bit_size == 0 { now } else { now + self.unit() };
    }

    /// Milliseconds covered by one slot.
    pub(super) fn unit(&self) -> u64 {
        1u64 << self.bit_size
    }

    /// Slot that holds `due_tick`. Callers guarantee `due_tick >= base_tick`.
    /// 保存 `due_tick` 的槽位。调用方保证 `due_tick >= base_tick`。
    pub(super) fn slot_for(&self, due_tick: u64) -> usize {
        let delta = (due_tick - self.base_tick) >> self.bit_size;
        self.index.wrapping_add(delta as u8) as usize
    }

    /// Moves to the next slot. Returns `true` when the index wrapped to 0.
    /// 移动到下一个槽位。索引回绕到0时返回 `true`。
    pub(super) fn step(&mut self) -> bool {
        self.index = self.index.wrapping_add(1);
        self.base_tick += self.unit();
        self.index == 0
    }

    /// Slots left before this level wraps, counting the current one.
    pub(super) fn slots_until_wrap(&self) -> u64 {
        WHEEL_SLOTS as u64 - self.index as u64
    }

    pub(super) fn current(&mut self) -> &mut SlotList {
        &mut self.slots[self.index as usize]
    }

    pub(super) fn non_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }
}
