//! 模块（actor）运行时
//! The module (actor) runtime
//!
//! A module owns one event queue and one timer wheel and runs every handler
//! registered on it sequentially on a dedicated thread. Handlers therefore
//! need no locking over module state. A panicking handler is caught at the
//! loop boundary, logged, and the loop resumes with its queue and state
//! intact according to its [`RestartPolicy`].
//!
//! 模块拥有一个事件队列和一个时间轮，并在专用线程上顺序运行注册在其上的每个处理器，
//! 因此处理器无需对模块状态加锁。panic的处理器会在循环边界被捕获并记录，
//! 循环随后按照 [`RestartPolicy`] 恢复运行，队列与状态保持不变。

mod actor;
mod context;
mod handle;
mod registry;
mod supervisor;

pub use context::{DeferredReply, ModuleContext};
pub use handle::{Module, ModuleState, MsgHandler, RpcHandler};
pub use registry::ModuleRegistry;
pub(crate) use registry::start_module;
pub use supervisor::RestartPolicy;
