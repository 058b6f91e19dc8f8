//! 双缓冲传输队列
//! Double-buffer transfer queue

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A multi-producer / single-consumer queue built from two lists, each with
/// its own lock.
///
/// Producers only ever take the write-side lock. The consumer drains the read
/// list under the read-side lock and touches the write lock only to swap the
/// two lists once the read list runs dry, so contention is one lock
/// acquisition per batch rather than per item.
///
/// Order is FIFO per producer. Items from different producers racing a swap
/// have no total order.
///
/// 由两个列表构成的多生产者/单消费者队列，每个列表各有一把锁。
///
/// 生产者只获取写端锁。消费者在读端锁下取出读列表中的元素，仅在读列表耗尽时
/// 获取写锁交换两个列表，因此竞争是每批一次加锁，而不是每个元素一次。
///
/// 顺序在单个生产者内为FIFO，不同生产者之间没有全序。
#[derive(Debug)]
pub struct DoubleBufferQueue<T> {
    read: Mutex<VecDeque<T>>,
    write: Mutex<VecDeque<T>>,
}

/// Poisoning only tells us a holder panicked; the lists themselves are always
/// left in a consistent state by every operation here.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> DoubleBufferQueue<T> {
    pub fn new() -> Self {
        Self {
            read: Mutex::new(VecDeque::new()),
            write: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends an item under the write lock only.
    /// 仅在写锁下追加元素。
    pub fn push(&self, item: T) {
        lock(&self.write).push_back(item);
    }

    /// Moves up to `max_count` items into `out`.
    ///
    /// Returns `(items_read, items_left_in_read_list)`. A non-zero remainder
    /// tells the consumer it can poll again right away.
    ///
    /// 将最多 `max_count` 个元素移入 `out`。
    ///
    /// 返回 `(读取数量, 读列表剩余数量)`。剩余数量非零表示消费者可以立即再次轮询。
    pub fn get(&self, out: &mut impl Extend<T>, max_count: usize) -> (usize, usize) {
        if max_count == 0 {
            return (0, 0);
        }

        let mut read = lock(&self.read);
        if read.is_empty() && !self.swap(&mut read) {
            return (0, 0);
        }

        let take = read.len().min(max_count);
        out.extend(read.drain(..take));
        (take, read.len())
    }

    /// Pops a single item, swapping lists if needed.
    /// 弹出单个元素，必要时交换列表。
    pub fn get_one(&self) -> Option<T> {
        let mut read = lock(&self.read);
        if read.is_empty() && !self.swap(&mut read) {
            return None;
        }
        read.pop_front()
    }

    /// Whether the read side is empty. Items may still sit on the write side.
    /// 读端是否为空。写端可能仍有元素。
    pub fn is_read_empty(&self) -> bool {
        lock(&self.read).is_empty()
    }

    /// Total number of queued items on both sides.
    /// 两端排队元素的总数。
    pub fn len(&self) -> usize {
        let read = lock(&self.read);
        read.len() + lock(&self.write).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exchanges the (empty) read list with the write list. Lock order is
    /// always read, then write.
    fn swap(&self, read: &mut MutexGuard<'_, VecDeque<T>>) -> bool {
        let mut write = lock(&self.write);
        if write.is_empty() {
            return false;
        }
        std::mem::swap(&mut **read, &mut *write);
        true
    }
}

impl<T> Default for DoubleBufferQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
