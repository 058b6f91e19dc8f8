//! 定义了运行时中所有可能的错误类型。
//! Defines all possible error types in the runtime.

use crate::value::ArgError;
use thiserror::Error;

/// The primary error type for the module runtime.
/// 模块运行时的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O error occurred.
    /// 发生了底层的I/O错误。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A handler is already registered under this key. The first registration is kept.
    /// 该键已注册处理器，保留第一次注册。
    #[error("handler for {0} has already been registered")]
    DuplicateHandler(String),

    /// No handler is registered for the given message type or RPC name.
    /// 给定的消息类型或RPC名称没有注册处理器。
    #[error("no handler registered for {0}")]
    HandlerNotFound(String),

    /// The target module has been closed and no longer accepts work.
    /// 目标模块已关闭，不再接受任务。
    #[error("module `{0}` is closed")]
    ModuleClosed(String),

    /// No module with this name exists in the registry.
    /// 注册表中不存在该名称的模块。
    #[error("module `{0}` not found")]
    ModuleNotFound(String),

    /// The module's thread has already been started.
    /// 模块线程已经启动。
    #[error("module `{0}` has already been started")]
    AlreadyStarted(String),

    /// An awaited RPC did not reply before its deadline.
    /// 等待的RPC在截止时间前没有回复。
    #[error("await rpc `{0}` timed out")]
    RpcTimeout(String),

    /// The handler finished without replying and released the reply channel.
    /// 处理器结束时没有回复并释放了回复通道。
    #[error("await rpc `{0}` finished without a reply")]
    RpcDropped(String),

    /// A blocking call was issued from a thread that drives a tokio runtime,
    /// which would stall that runtime (and every module it serves).
    ///
    /// 在驱动tokio运行时的线程上发起了阻塞调用，这会使该运行时停滞。
    #[error("blocking call `{0}` issued from inside an async runtime")]
    BlockingInRuntime(String),

    /// A worker pool with no members cannot route calls.
    /// 没有成员的工作池无法路由调用。
    #[error("worker pool `{0}` has no members")]
    EmptyPool(String),

    /// An RPC or event argument had the wrong shape.
    /// RPC或事件参数格式错误。
    #[error("argument error: {0}")]
    Argument(#[from] ArgError),
}

/// A specialized `Result` type for this crate.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
