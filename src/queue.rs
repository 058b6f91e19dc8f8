//! 模块事件队列
//! Module event queues
//!
//! 该模块提供两层队列：双缓冲传输队列负责在多生产者与单消费者之间
//! 以最少的锁竞争移交数据；事件队列在其上增加"有任务或定时器到期前休眠"
//! 的唤醒协议，既不丢失唤醒也不产生多余唤醒。
//!
//! This module provides two layers of queues: the double-buffer transfer
//! queue hands items from many producers to a single consumer with minimal
//! lock contention; the event queue adds a "sleep until work or timer"
//! wake protocol on top, with neither missed nor redundant wakeups.

mod double_buffer;
mod event_queue;

pub use double_buffer::DoubleBufferQueue;
pub use event_queue::{EventQueue, WakeReceiver};

#[cfg(test)]
mod tests;
