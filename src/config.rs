//! 定义了模块运行时的可配置参数。
//! Defines configurable parameters for the module runtime.

use crate::module::RestartPolicy;
use crate::timer::MAX_DELAY_MS;
use crate::worker_pool::RouteHash;
use std::time::Duration;

/// A structure containing all configurable parameters of the runtime.
///
/// 包含运行时所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parameters of every module's execution loop.
    /// 每个模块执行循环的参数。
    pub module: ModuleConfig,

    /// Timer wheel parameters.
    /// 时间轮参数。
    pub timer: TimerConfig,

    /// Worker pool routing parameters.
    /// 工作池路由参数。
    pub worker_pool: WorkerPoolConfig,
}

/// Parameters of a module's execution loop.
///
/// 模块执行循环的参数。
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Maximum number of events drained from the queue per batch.
    /// 每批从队列中取出的最大事件数。
    pub event_batch_size: usize,
    /// Capacity of the wake channel between producers and the module loop.
    /// 生产者与模块循环之间唤醒通道的容量。
    pub wake_channel_capacity: usize,
    /// Upper bound on how long an idle module sleeps before re-checking its timers.
    /// 空闲模块在重新检查定时器之前休眠的最长时间。
    pub idle_tick: Duration,
    /// Maximum number of timers fired per loop iteration, to cap latency spikes.
    /// 每次循环迭代触发的最大定时器数量，用于限制延迟尖峰。
    pub max_timers_per_tick: usize,
    /// What happens to the rest of a batch when a handler panics.
    /// 处理器panic时，批次中剩余事件的处理方式。
    pub restart_policy: RestartPolicy,
    /// Stack size of the module's dedicated thread. `None` uses the platform default.
    /// 模块专用线程的栈大小。`None` 使用平台默认值。
    pub thread_stack_size: Option<usize>,
}

/// Timer wheel parameters.
///
/// 时间轮参数。
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Delays above this value are clamped. It can not exceed the range of the
    /// coarsest wheel level.
    ///
    /// 超过该值的延迟会被截断。不能超过最粗时间轮层级的范围。
    pub max_delay_ms: u64,
}

/// Worker pool routing parameters.
///
/// 工作池路由参数。
#[derive(Debug, Clone, Default)]
pub struct WorkerPoolConfig {
    /// Hash used to map an RPC name onto a pool member.
    /// 用于将RPC名称映射到池成员的哈希算法。
    pub route_hash: RouteHash,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            event_batch_size: 128,
            wake_channel_capacity: 128,
            idle_tick: Duration::from_millis(15),
            max_timers_per_tick: 100,
            restart_policy: RestartPolicy::default(),
            thread_stack_size: None,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: MAX_DELAY_MS,
        }
    }
}
