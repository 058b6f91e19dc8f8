//! 标识符分配服务
//! Identifier allocation service
//!
//! Agents, components and modules share one monotonically increasing ID space.
//! The source is injected wherever IDs are minted so that tests can use a
//! private counter instead of the process-wide one.
//!
//! 代理、组件和模块共享同一个单调递增的ID空间。ID源以注入方式提供，
//! 测试可以使用私有计数器代替进程级计数器。

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A source of unique, non-zero identifiers.
/// 唯一且非零的标识符来源。
pub trait IdSource: Send + Sync + Debug {
    /// Returns the next identifier. Never returns 0.
    /// 返回下一个标识符，永远不会返回0。
    fn next_id(&self) -> u64;
}

/// Lock-free counter starting at 1.
/// 从1开始的无锁计数器。
#[derive(Debug)]
pub struct AtomicIdSource {
    next: AtomicU64,
}

impl AtomicIdSource {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl Default for AtomicIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for AtomicIdSource {
    fn next_id(&self) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            // Wrapped after 2^64 allocations; skip the reserved value.
            self.next.fetch_add(1, Ordering::Relaxed)
        } else {
            id
        }
    }
}

/// The process-wide ID source used by the global registry and by transports
/// that don't carry their own.
///
/// 全局注册表以及未携带自身ID源的传输层所使用的进程级ID源。
pub fn global_ids() -> Arc<dyn IdSource> {
    static IDS: OnceLock<Arc<dyn IdSource>> = OnceLock::new();
    IDS.get_or_init(|| Arc::new(AtomicIdSource::new())).clone()
}
