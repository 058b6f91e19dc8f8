//! 模块事件
//! Module events
//!
//! Everything a module reacts to arrives as an [`Event`] through its event
//! queue. Events are moved into the module and consumed by dispatch, so a
//! handler only ever sees borrowed pieces of one and cannot keep it past its
//! own invocation.
//!
//! 模块响应的所有内容都以 [`Event`] 的形式经由事件队列到达。事件被移入模块并在分发时消耗，
//! 处理器只能看到其借用的部分，无法在自身调用结束后保留它。

use crate::component::{AgentRef, ComponentError, ComponentId, ComponentRef, ManagerRef, ModuleId, ProtoTypeId};
use crate::module::ModuleContext;
use crate::value::{Args, Value};
use std::fmt;
use tokio::sync::oneshot;

/// Stable identifiers of event kinds.
/// 事件类型的稳定标识符。
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    None = 0,
    TcpConnected = 1,
    TcpConnectFailed = 2,
    TcpAccepted = 3,
    TcpReadMsg = 4,
    TcpClosed = 5,
    ModuleRpc = 6,
    ModuleAwaitRpc = 7,
    ComponentCreate = 8,
    ComponentError = 9,
    ComponentCustom = 10,
}

impl EventKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::None,
            1 => Self::TcpConnected,
            2 => Self::TcpConnectFailed,
            3 => Self::TcpAccepted,
            4 => Self::TcpReadMsg,
            5 => Self::TcpClosed,
            6 => Self::ModuleRpc,
            7 => Self::ModuleAwaitRpc,
            8 => Self::ComponentCreate,
            9 => Self::ComponentError,
            10 => Self::ComponentCustom,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TcpConnected => "tcp_connected",
            Self::TcpConnectFailed => "tcp_connect_failed",
            Self::TcpAccepted => "tcp_accepted",
            Self::TcpReadMsg => "tcp_read_msg",
            Self::TcpClosed => "tcp_closed",
            Self::ModuleRpc => "module_rpc",
            Self::ModuleAwaitRpc => "module_await_rpc",
            Self::ComponentCreate => "component_create",
            Self::ComponentError => "component_error",
            Self::ComponentCustom => "component_custom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named RPC invocation.
/// 一次具名的RPC调用。
#[derive(Debug)]
pub struct RpcRequest {
    /// The module that issued the call, if it came from a module.
    /// 发起调用的模块（如果来自模块）。
    pub sender: Option<ModuleId>,
    pub name: String,
    pub args: Args,
}

/// A closure run on the module's thread with its dispatch context.
/// 在模块线程上以其分发上下文运行的闭包。
pub type CustomAction = Box<dyn FnOnce(&mut ModuleContext) + Send>;

/// An event delivered into a module's queue.
/// 投递到模块队列中的事件。
pub enum Event {
    /// Session lifecycle: connected, accepted, connect failed, closed.
    /// 会话生命周期：已连接、已接受、连接失败、已关闭。
    Session {
        kind: EventKind,
        agent: Option<AgentRef>,
        component_id: ComponentId,
        extra: Args,
    },
    /// A decoded inbound message.
    /// 一条已解码的入站消息。
    Data {
        kind: EventKind,
        agent: Option<AgentRef>,
        proto_type_id: ProtoTypeId,
        payload: Value,
    },
    /// Fire-and-forget RPC.
    /// 无需等待的RPC。
    Rpc(RpcRequest),
    /// RPC whose caller waits for `reply`.
    /// 调用方等待 `reply` 的RPC。
    AwaitRpc {
        request: RpcRequest,
        reply: oneshot::Sender<Vec<Value>>,
    },
    /// Component creation or failure.
    /// 组件创建或故障。
    Component {
        kind: EventKind,
        component: ComponentRef,
        manager: Option<ManagerRef>,
        error: Option<ComponentError>,
    },
    /// Arbitrary code to run on the module's thread.
    /// 在模块线程上运行的任意代码。
    Custom(CustomAction),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Session { kind, .. } | Event::Data { kind, .. } | Event::Component { kind, .. } => *kind,
            Event::Rpc(_) => EventKind::ModuleRpc,
            Event::AwaitRpc { .. } => EventKind::ModuleAwaitRpc,
            Event::Custom(_) => EventKind::ComponentCustom,
        }
    }

    /// Session event for an agent that connected through `component_id`.
    /// 通过 `component_id` 建立连接的代理的会话事件。
    pub fn session(kind: EventKind, agent: AgentRef, component_id: ComponentId) -> Self {
        Event::Session {
            kind,
            agent: Some(agent),
            component_id,
            extra: Args::new(),
        }
    }

    /// Component creation request for `component`, owned by `manager`.
    /// 由 `manager` 拥有的 `component` 的创建请求。
    pub fn component_create(component: ComponentRef, manager: ManagerRef) -> Self {
        Event::Component {
            kind: EventKind::ComponentCreate,
            component,
            manager: Some(manager),
            error: None,
        }
    }

    /// Error report for an already registered component.
    /// 已注册组件的错误报告。
    pub fn component_error(component: ComponentRef, error: ComponentError) -> Self {
        Event::Component {
            kind: EventKind::ComponentError,
            component,
            manager: None,
            error: Some(error),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Session {
                kind,
                agent,
                component_id,
                extra,
            } => f
                .debug_struct("Session")
                .field("kind", kind)
                .field("agent", &agent.as_ref().map(|a| a.id()))
                .field("component_id", component_id)
                .field("extra", extra)
                .finish(),
            Event::Data {
                kind,
                agent,
                proto_type_id,
                payload,
            } => f
                .debug_struct("Data")
                .field("kind", kind)
                .field("agent", &agent.as_ref().map(|a| a.id()))
                .field("proto_type_id", proto_type_id)
                .field("payload", payload)
                .finish(),
            Event::Rpc(request) => f.debug_tuple("Rpc").field(request).finish(),
            Event::AwaitRpc { request, .. } => f.debug_tuple("AwaitRpc").field(request).finish(),
            Event::Component {
                kind,
                component,
                error,
                ..
            } => f
                .debug_struct("Component")
                .field("kind", kind)
                .field("component", &component.id())
                .field("error", error)
                .finish(),
            Event::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_ids_are_stable() {
        for id in 0..=10u8 {
            let kind = EventKind::from_u8(id).unwrap();
            assert_eq!(kind as u8, id);
        }
        assert_eq!(EventKind::from_u8(11), None);
        assert_eq!(EventKind::ModuleAwaitRpc as u8, 7);
    }

    #[test]
    fn test_event_kind_of_variants() {
        let rpc = Event::Rpc(RpcRequest {
            sender: None,
            name: "ping".into(),
            args: Args::new(),
        });
        assert_eq!(rpc.kind(), EventKind::ModuleRpc);

        let (reply, _rx) = oneshot::channel();
        let await_rpc = Event::AwaitRpc {
            request: RpcRequest {
                sender: Some(3),
                name: "echo".into(),
                args: Args::new(),
            },
            reply,
        };
        assert_eq!(await_rpc.kind(), EventKind::ModuleAwaitRpc);
        assert_eq!(Event::Custom(Box::new(|_| {})).kind(), EventKind::ComponentCustom);
    }
}
