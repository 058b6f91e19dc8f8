//! 组件、代理与组件管理器
//! Components, agents and component managers
//!
//! Transports, listeners and database clients live outside the runtime. They
//! appear here only through these traits: a [`Component`] is registered with
//! exactly one owning module, an [`Agent`] is a live session (for example an
//! accepted TCP connection) and a [`ComponentManager`] receives their
//! lifecycle callbacks on the owning module's thread.
//!
//! 传输层、监听器和数据库客户端都位于运行时之外，只通过这些trait出现：
//! [`Component`] 注册到唯一的所属模块，[`Agent`] 表示一个活动会话（例如已接受的TCP连接），
//! [`ComponentManager`] 在所属模块的线程上接收它们的生命周期回调。

use crate::module::ModuleContext;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Identifier of a connected agent.
pub type AgentId = u64;
/// Identifier of a component. Shares the ID space with agents.
pub type ComponentId = u64;
/// Identifier of a module.
pub type ModuleId = u64;
/// Identifier of a decoded message type.
pub type ProtoTypeId = u32;

/// A live session, such as one TCP connection.
/// 一个活动会话，例如一个TCP连接。
pub trait Agent: Send + Sync + Debug {
    fn id(&self) -> AgentId;

    /// Closes the session. Called by the owning module on shutdown.
    /// 关闭会话。所属模块关闭时调用。
    fn close(&self);
}

pub type AgentRef = Arc<dyn Agent>;

/// Kinds of components known to the runtime.
/// 运行时已知的组件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    TcpServer,
    TcpClient,
    MongoDb,
    MySql,
    Custom(u16),
}

/// An externally managed resource owned by one module.
///
/// `start` runs on the owning module's thread after the component has been
/// registered; a failure is routed to the manager's
/// [`on_component_error`](ComponentManager::on_component_error).
///
/// 由一个模块拥有的外部管理资源。
///
/// `start` 在组件注册后于所属模块的线程上运行；失败会被路由到管理器的
/// [`on_component_error`](ComponentManager::on_component_error)。
pub trait Component: Send + Sync + Debug {
    fn id(&self) -> ComponentId;

    fn component_type(&self) -> ComponentType;

    fn start(&self) -> Result<(), ComponentError>;

    fn close(&self);
}

pub type ComponentRef = Arc<dyn Component>;

/// A failure reported by a component or on its behalf.
/// 组件上报或代其上报的故障。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("component {component_id} failed to start: {reason}")]
    StartFailed {
        component_id: ComponentId,
        reason: String,
    },

    #[error("component {component_id} failed to connect: {reason}")]
    ConnectFailed {
        component_id: ComponentId,
        reason: String,
    },

    #[error("component {component_id} closed: {reason}")]
    Closed {
        component_id: ComponentId,
        reason: String,
    },
}

impl ComponentError {
    pub fn component_id(&self) -> ComponentId {
        match self {
            Self::StartFailed { component_id, .. }
            | Self::ConnectFailed { component_id, .. }
            | Self::Closed { component_id, .. } => *component_id,
        }
    }
}

/// Lifecycle callbacks for the components and agents a module owns.
///
/// Every callback runs on the owning module's thread with that module's
/// dispatch context. All methods default to doing nothing.
///
/// 模块所拥有的组件与代理的生命周期回调。
///
/// 所有回调都在所属模块的线程上以该模块的分发上下文运行。所有方法默认不做任何事。
pub trait ComponentManager: Send + Sync {
    /// A component was registered and started.
    /// 组件已注册并启动。
    fn on_component_create(&self, _ctx: &mut ModuleContext, _component_id: ComponentId) {}

    /// A component failed to start, connect, or reported an error.
    /// 组件启动、连接失败或上报了错误。
    fn on_component_error(&self, _ctx: &mut ModuleContext, _error: &ComponentError) {}

    /// A new session was accepted or connected through one of this manager's components.
    /// 通过该管理器的某个组件接受或建立了新会话。
    fn on_linker_connected(&self, _ctx: &mut ModuleContext, _agent_id: AgentId, _agent: &AgentRef) {}

    /// A session closed. `error` carries the reason if the close was abnormal.
    /// 会话关闭。异常关闭时 `error` 携带原因。
    fn on_linker_closed(
        &self,
        _ctx: &mut ModuleContext,
        _agent_id: AgentId,
        _agent: &AgentRef,
        _error: Option<&ComponentError>,
    ) {
    }
}

pub type ManagerRef = Arc<dyn ComponentManager>;
