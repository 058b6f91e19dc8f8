//! 带唤醒协调的事件队列
//! Event queue with wake coordination

use super::DoubleBufferQueue;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// The consumer half of the wake channel.
///
/// At most one signal is outstanding per announced wait, so the channel buffer
/// can never starve producers.
///
/// 唤醒通道的消费端。每次声明的等待最多只有一个未决信号，因此通道缓冲区不会被占满。
#[derive(Debug)]
pub struct WakeReceiver {
    rx: mpsc::Receiver<()>,
}

impl WakeReceiver {
    /// Waits for a wake signal. Returns `false` once every producer is gone.
    /// 等待唤醒信号。所有生产者都消失后返回 `false`。
    pub async fn recv(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Blocking variant for threads that are not driving a runtime.
    /// 供未驱动运行时的线程使用的阻塞版本。
    pub fn blocking_recv(&mut self) -> bool {
        self.rx.blocking_recv().is_some()
    }

    /// Discards signals that are already buffered.
    /// 丢弃已缓冲的信号。
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// A [`DoubleBufferQueue`] plus a counter-based protocol that lets a single
/// consumer sleep until work arrives.
///
/// Three counters drive the protocol:
/// - `pending`: events pushed but not yet handed out by [`get`](Self::get),
/// - `announced`: waits the consumer has announced,
/// - `notified`: announced waits that have been claimed by a notification.
///
/// A push that happens after the consumer announces its wait either makes the
/// consumer see `pending > 0` (so it does not block) or claims the wait and
/// sends exactly one wake signal.
///
/// 在 [`DoubleBufferQueue`] 之上加入基于计数器的协议，使单个消费者可以休眠直到有任务到达。
///
/// 三个计数器：
/// - `pending`：已推入但尚未被 [`get`](Self::get) 取出的事件数，
/// - `announced`：消费者声明的等待次数，
/// - `notified`：已被通知认领的等待次数。
///
/// 在消费者声明等待之后发生的推入，要么让消费者看到 `pending > 0`（从而不阻塞），
/// 要么认领该等待并恰好发送一个唤醒信号。
#[derive(Debug)]
pub struct EventQueue<T> {
    queue: DoubleBufferQueue<T>,
    wake_tx: mpsc::Sender<()>,
    pending: AtomicI64,
    announced: AtomicU32,
    notified: AtomicU32,
}

impl<T> EventQueue<T> {
    /// Creates a queue and the receiver its consumer blocks on.
    /// 创建队列以及消费者阻塞等待的接收端。
    pub fn new(wake_capacity: usize) -> (Self, WakeReceiver) {
        let (wake_tx, rx) = mpsc::channel(wake_capacity.max(1));
        let queue = Self {
            queue: DoubleBufferQueue::new(),
            wake_tx,
            pending: AtomicI64::new(0),
            announced: AtomicU32::new(0),
            notified: AtomicU32::new(0),
        };
        (queue, WakeReceiver { rx })
    }

    /// Enqueues an event and wakes the consumer if it announced a wait.
    /// 推入事件，如果消费者已声明等待则唤醒它。
    pub fn push(&self, item: T) {
        self.queue.push(item);
        self.pending.fetch_add(1, Ordering::SeqCst);

        if self.notify_one() {
            // A full buffer already holds a signal the consumer will see.
            let _ = self.wake_tx.try_send(());
        }
    }

    /// Moves up to `max_count` events into `out`.
    ///
    /// Returns `(items_read, items_left_in_read_list)`.
    ///
    /// 将最多 `max_count` 个事件移入 `out`。返回 `(读取数量, 读列表剩余数量)`。
    pub fn get(&self, out: &mut impl Extend<T>, max_count: usize) -> (usize, usize) {
        // A push increments `pending` after enqueueing, so a racing get may
        // briefly drive the counter negative.
        if self.pending.load(Ordering::SeqCst) < 0 {
            return (0, 0);
        }
        let (read, left) = self.queue.get(out, max_count);
        if read > 0 {
            self.pending.fetch_sub(read as i64, Ordering::SeqCst);
        }
        (read, left)
    }

    /// Announces that the consumer is about to block.
    ///
    /// Returns `true` when it is safe to block, `false` when work already
    /// exists and the consumer should poll again instead.
    ///
    /// 声明消费者即将阻塞。可以安全阻塞时返回 `true`，已有任务时返回 `false`。
    pub fn announce_intent_to_wait(&self) -> bool {
        self.announced.fetch_add(1, Ordering::SeqCst);
        if self.pending.load(Ordering::SeqCst) > 0 {
            // Claim our own announcement so counters stay balanced.
            self.notify_one();
            trace!("work pending, skipping wait");
            return false;
        }
        true
    }

    /// Balances the counters after the consumer returns from blocking, whether
    /// it was woken by a signal or by its own timeout.
    ///
    /// 消费者结束阻塞后平衡计数器，无论是被信号唤醒还是自身超时。
    pub fn rearm_after_wake(&self) {
        self.notify_one();
    }

    /// Number of events pushed but not yet handed out.
    /// 已推入但尚未取出的事件数量。
    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether an announced wait has not yet been claimed.
    /// 是否存在尚未被认领的等待声明。
    pub fn has_waiter(&self) -> bool {
        self.announced.load(Ordering::SeqCst) != self.notified.load(Ordering::SeqCst)
    }

    /// Claims one announced-but-unnotified wait. Returns whether a claim was made.
    fn notify_one(&self) -> bool {
        let mut notified = self.notified.load(Ordering::SeqCst);
        loop {
            if self.announced.load(Ordering::SeqCst) == notified {
                return false;
            }
            match self.notified.compare_exchange_weak(
                notified,
                notified.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(current) => notified = current,
            }
        }
    }
}
