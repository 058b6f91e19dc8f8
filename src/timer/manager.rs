//! 分层定时器管理器
//! Hierarchical timer manager

use super::entry::{SlotList, TimerId, TimerPool, next_seq, pack, unpack};
use super::stats::TimerStats;
use super::wheel::WheelLevel;
use super::{MAX_DELAY_MS, TICK_MASK, WHEEL_LEVELS, WHEEL_SLOTS};
use tracing::trace;

/// A timer taken off the wheel because its due tick has passed.
/// 因到期刻度已过而从时间轮上取下的定时器。
#[derive(Debug)]
pub struct Expired<H> {
    pub id: TimerId,
    pub due_tick: u64,
    pub payload: H,
}

enum Location {
    Overdue,
    Slot { level: usize, slot: usize },
}

/// Facade over the five wheel levels: assigns IDs, routes add/delete to the
/// right level and drives the finest level.
///
/// The manager is generic over the payload `H` it stores per timer and never
/// calls anything itself; the owner pulls expired timers with
/// [`poll_expired`](Self::poll_expired) and runs them. While a popped timer
/// is being run (until [`finish_running`](Self::finish_running)), deleting its
/// handle is a no-op that reports success.
///
/// 五个时间轮层级的外观：分配ID，将添加/删除路由到正确的层级，并驱动最细层级。
///
/// 管理器对每个定时器存储的负载 `H` 是泛型的，自身从不调用任何回调；
/// 持有者通过 [`poll_expired`](Self::poll_expired) 取出到期定时器并执行。
/// 在取出的定时器执行期间（直到 [`finish_running`](Self::finish_running)），
/// 删除其句柄是报告成功的空操作。
#[derive(Debug)]
pub struct TimerManager<H> {
    levels: [WheelLevel; WHEEL_LEVELS],
    /// Timers whose due tick was already behind level 0 when added.
    overdue: SlotList,
    pool: TimerPool<H>,
    seq: u32,
    len: usize,
    running: Option<TimerId>,
    max_delay_ms: u64,
    fired: u64,
    cancelled: u64,
}

impl<H> TimerManager<H> {
    /// Creates a manager whose finest level starts at tick `now`.
    /// 创建最细层级从刻度 `now` 开始的管理器。
    pub fn new(now: u64) -> Self {
        Self::with_max_delay(now, MAX_DELAY_MS)
    }

    pub fn with_max_delay(now: u64, max_delay_ms: u64) -> Self {
        let now = now & TICK_MASK;
        Self {
            levels: std::array::from_fn(|level| WheelLevel::new(level, now)),
            overdue: SlotList::default(),
            pool: TimerPool::new(),
            seq: 0,
            len: 0,
            running: None,
            max_delay_ms: max_delay_ms.min(MAX_DELAY_MS),
            fired: 0,
            cancelled: 0,
        }
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The next tick the finest level will process.
    /// 最细层级将要处理的下一个刻度。
    pub fn current_tick(&self) -> u64 {
        self.levels[0].base_tick
    }

    /// Handle of the timer currently being run, if any.
    /// 当前正在执行的定时器句柄（如果有）。
    pub fn running(&self) -> Option<TimerId> {
        self.running
    }

    /// Schedules `payload` to expire `delay_ms` after `now`.
    ///
    /// Delays beyond the configured maximum are clamped. The returned handle is
    /// never 0.
    ///
    /// 调度 `payload` 在 `now` 之后 `delay_ms` 毫秒到期。超过最大值的延迟会被截断。
    /// 返回的句柄永远不为0。
    pub fn add_timer(&mut self, now: u64, delay_ms: u64, payload: H) -> TimerId {
        let now = now & TICK_MASK;
        if self.len == 0 && self.levels[0].base_tick != now {
            // Nothing is scheduled, so re-aligning costs nothing and spares
            // the wheel from walking through the idle period.
            for level in &mut self.levels {
                level.reset(now);
            }
        }

        let delay = delay_ms.min(self.max_delay_ms);
        let horizon = self.levels[WHEEL_LEVELS - 1].base_tick
            + ((WHEEL_SLOTS as u64 - 1) << self.levels[WHEEL_LEVELS - 1].bit_size);
        let due_tick = (now + delay).min(horizon).min(TICK_MASK);

        self.seq = next_seq(self.seq);
        let idx = self.pool.acquire(self.seq, due_tick, payload);
        self.insert(idx);
        self.len += 1;

        let id = pack(due_tick, self.seq);
        trace!(timer_id = id, delay_ms = delay, due_tick, "Added timer");
        id
    }

    /// Cancels a pending timer.
    ///
    /// Returns `true` if the timer was removed, or if `id` is the timer that is
    /// currently running (in which case nothing happens). Returns `false` for
    /// unknown, fired or already cancelled handles.
    ///
    /// 取消挂起的定时器。
    ///
    /// 定时器被移除，或 `id` 是当前正在执行的定时器（此时什么也不做）时返回 `true`。
    /// 对于未知、已触发或已取消的句柄返回 `false`。
    pub fn delete_timer(&mut self, id: TimerId) -> bool {
        if id == 0 {
            return false;
        }
        if self.running == Some(id) {
            trace!(timer_id = id, "Ignoring cancellation of running timer");
            return true;
        }

        let (due_tick, seq) = unpack(id);
        let removed = match self.locate(due_tick) {
            Location::Overdue => self.pool.unlink(&mut self.overdue, due_tick, seq),
            Location::Slot { level, slot } => {
                let wheel = &mut self.levels[level];
                let removed = self.pool.unlink(&mut wheel.slots[slot], due_tick, seq);
                if removed.is_some() {
                    wheel.count -= 1;
                }
                removed
            }
        };

        match removed {
            Some(idx) => {
                self.pool.release(idx);
                self.len -= 1;
                self.cancelled += 1;
                trace!(timer_id = id, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    /// Takes the next timer due at or before `now`, advancing the finest level
    /// (and cascading coarser levels) as needed.
    ///
    /// The returned timer is marked as running until
    /// [`finish_running`](Self::finish_running) is called.
    ///
    /// 取出下一个在 `now` 或之前到期的定时器，必要时推进最细层级（并级联更粗的层级）。
    /// 返回的定时器在调用 [`finish_running`](Self::finish_running) 之前被标记为正在执行。
    pub fn poll_expired(&mut self, now: u64) -> Option<Expired<H>> {
        let now = now & TICK_MASK;
        if let Some(idx) = self.pool.pop_front(&mut self.overdue) {
            return self.fire(idx);
        }

        while self.len > 0 {
            let level0 = &mut self.levels[0];
            if level0.base_tick > now {
                return None;
            }
            if let Some(idx) = self.pool.pop_front(level0.current()) {
                level0.count -= 1;
                return self.fire(idx);
            }

            let wrapped = if level0.count == 0 {
                // Every remaining slot of this level is empty: jump straight to
                // the wrap boundary, or to just past `now` if that comes first.
                let until_wrap = level0.slots_until_wrap();
                let step = until_wrap.min(now + 1 - level0.base_tick);
                level0.base_tick += step;
                level0.index = ((level0.index as u64 + step) % WHEEL_SLOTS as u64) as u8;
                step == until_wrap
            } else {
                level0.step()
            };

            if wrapped {
                self.cascade();
            }
        }
        None
    }

    /// Clears the running mark set by [`poll_expired`](Self::poll_expired).
    /// 清除由 [`poll_expired`](Self::poll_expired) 设置的执行标记。
    pub fn finish_running(&mut self) {
        self.running = None;
    }

    /// Pops and hands to `f` up to `max_count` expired timers. Returns how many fired.
    /// 取出最多 `max_count` 个到期定时器并交给 `f`。返回触发的数量。
    pub fn execute(&mut self, now: u64, max_count: usize, mut f: impl FnMut(Expired<H>)) -> usize {
        let mut fired = 0;
        while fired < max_count {
            let Some(expired) = self.poll_expired(now) else {
                break;
            };
            f(expired);
            self.finish_running();
            fired += 1;
        }
        fired
    }

    /// Milliseconds from `now` until the wheel next has work: a due timer, or a
    /// cascade at the finest level's wrap boundary. `Some(0)` means work is due
    /// now; `None` means nothing is scheduled.
    ///
    /// 从 `now` 起到时间轮下一次有工作（到期定时器或最细层级回绕时的级联）的毫秒数。
    /// `Some(0)` 表示现在就有工作；`None` 表示没有任何调度。
    pub fn next_wake_delay(&self, now: u64) -> Option<u64> {
        if !self.overdue.is_empty() {
            return Some(0);
        }
        if self.len == 0 {
            return None;
        }

        let level0 = &self.levels[0];
        let until_wrap = level0.slots_until_wrap();
        let mut offset = until_wrap;
        if level0.count > 0 {
            offset = (0..until_wrap)
                .find(|&k| !level0.slots[(level0.index as u64 + k) as usize].is_empty())
                .unwrap_or(until_wrap);
        }
        Some((level0.base_tick + offset).saturating_sub(now & TICK_MASK))
    }

    pub fn stats(&self) -> TimerStats {
        TimerStats {
            pending_timers: self.len,
            level_timers: std::array::from_fn(|k| self.levels[k].count),
            level_non_empty_slots: std::array::from_fn(|k| self.levels[k].non_empty_slots()),
            overdue_timers: self.overdue.len(),
            fired_timers: self.fired,
            cancelled_timers: self.cancelled,
            pooled_nodes: self.pool.pooled(),
            current_tick: self.levels[0].base_tick,
        }
    }

    /// Total nodes the pool has allocated so far.
    pub fn allocated_nodes(&self) -> usize {
        self.pool.capacity()
    }

    /// Finds where a timer due at `due_tick` lives right now, descending from
    /// the coarsest level. Insertion and cancellation share this descent.
    fn locate(&self, due_tick: u64) -> Location {
        let mut level = WHEEL_LEVELS - 1;
        while level > 0 && due_tick < self.levels[level].base_tick {
            level -= 1;
        }
        if level == 0 && due_tick < self.levels[0].base_tick {
            return Location::Overdue;
        }
        Location::Slot {
            level,
            slot: self.levels[level].slot_for(due_tick),
        }
    }

    fn insert(&mut self, idx: usize) {
        let due_tick = self.pool.node(idx).due_tick;
        match self.locate(due_tick) {
            Location::Overdue => self.pool.push_back(&mut self.overdue, idx),
            Location::Slot { level, slot } => {
                let wheel = &mut self.levels[level];
                self.pool.push_back(&mut wheel.slots[slot], idx);
                wheel.count += 1;
            }
        }
    }

    /// Turns level 1 after level 0 wrapped, propagating outward while each
    /// level wraps in turn. A turned slot's timers are re-inserted, which puts
    /// them one or more levels finer since their due tick is now below the
    /// turned level's base.
    ///
    /// 第0层回绕后转动第1层，并在各层依次回绕时向外传播。被转动槽位中的定时器会被重新插入，
    /// 由于其到期刻度已低于该层的基准，它们会落入更细的层级。
    fn cascade(&mut self) {
        for level in 1..WHEEL_LEVELS {
            let wheel = &mut self.levels[level];
            let mut turned = wheel.current().take();
            wheel.count -= turned.len();
            let wrapped = wheel.step();

            while let Some(idx) = self.pool.pop_front(&mut turned) {
                self.insert(idx);
            }
            if !wrapped {
                break;
            }
        }
    }

    fn fire(&mut self, idx: usize) -> Option<Expired<H>> {
        let node = self.pool.node(idx);
        let (due_tick, seq) = (node.due_tick, node.seq);
        let payload = self.pool.release(idx)?;
        self.len -= 1;
        self.fired += 1;

        let id = pack(due_tick, seq);
        self.running = Some(id);
        Some(Expired {
            id,
            due_tick,
            payload,
        })
    }
}
