//! 模块分发上下文
//! Module dispatch context

use super::handle::Module;
use crate::component::{AgentId, AgentRef, ComponentId, ComponentRef, ManagerRef, ModuleId};
use crate::timer::{Clock, TimerId, TimerManager, TimerStats};
use crate::value::{Args, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A timer callback together with its arguments.
pub(super) struct TimerTask {
    callback: Box<dyn FnOnce(&mut ModuleContext, &Args)>,
    args: Args,
}

/// A reply channel taken out of the context, to answer an await-RPC later.
///
/// Dropping it without calling [`done`](Self::done) makes the caller
/// receive [`Error::RpcDropped`](crate::Error::RpcDropped).
///
/// 从上下文中取出的回复通道，用于稍后应答等待RPC。不调用 [`done`](Self::done) 就丢弃它，
/// 调用方会收到 [`Error::RpcDropped`](crate::Error::RpcDropped)。
#[derive(Debug)]
pub struct DeferredReply {
    tx: oneshot::Sender<Vec<Value>>,
}

impl DeferredReply {
    /// Sends the reply. Returns `false` if the caller stopped waiting.
    /// 发送回复。如果调用方已不再等待则返回 `false`。
    pub fn done(self, values: Vec<Value>) -> bool {
        self.tx.send(values).is_ok()
    }
}

/// The per-module context handed to every handler, timer callback and
/// component manager callback.
///
/// It is created once per module and reused: the fields describing the
/// current dispatch (sender, component, attachment, reply) are cleared after
/// each handler returns, while the module-owned state (timers, connected
/// agents, registered components, the key/value store) persists.
///
/// 交给每个处理器、定时器回调和组件管理器回调的模块级上下文。
///
/// 每个模块只创建一次并重复使用：描述当前分发的字段（发送方、组件、附件、回复通道）
/// 在每个处理器返回后清空，而模块拥有的状态（定时器、已连接代理、已注册组件、键值存储）会保留。
pub struct ModuleContext {
    module: Module,
    clock: Arc<dyn Clock>,
    pub(super) timers: TimerManager<TimerTask>,
    pub(super) agents: HashMap<AgentId, AgentRef>,
    pub(super) components: HashMap<ComponentId, ComponentRef>,
    pub(super) managers: HashMap<ComponentId, ManagerRef>,
    store: HashMap<i32, Value>,

    pub(super) sender: Option<AgentRef>,
    pub(super) sender_module: Option<ModuleId>,
    pub(super) component: Option<ComponentRef>,
    pub(super) attachment: Option<Value>,
    pub(super) reply: Option<oneshot::Sender<Vec<Value>>>,
}

impl ModuleContext {
    pub(super) fn new(module: Module, clock: Arc<dyn Clock>, max_delay_ms: u64) -> Self {
        let timers = TimerManager::with_max_delay(clock.now_ms(), max_delay_ms);
        Self {
            module,
            clock,
            timers,
            agents: HashMap::new(),
            components: HashMap::new(),
            managers: HashMap::new(),
            store: HashMap::new(),
            sender: None,
            sender_module: None,
            component: None,
            attachment: None,
            reply: None,
        }
    }

    /// The module this context belongs to.
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_id(&self) -> ModuleId {
        self.module.id()
    }

    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    /// The agent that sent the current message or session event.
    /// 发送当前消息或会话事件的代理。
    pub fn sender(&self) -> Option<&AgentRef> {
        self.sender.as_ref()
    }

    /// The module that issued the current RPC, if it came from a module.
    /// 发起当前RPC的模块（如果来自模块）。
    pub fn sender_module(&self) -> Option<ModuleId> {
        self.sender_module
    }

    /// The component the current event concerns.
    /// 当前事件所涉及的组件。
    pub fn component(&self) -> Option<&ComponentRef> {
        self.component.as_ref()
    }

    /// Extra data attached to the current session event.
    /// 附加在当前会话事件上的额外数据。
    pub fn attachment(&self) -> Option<&Value> {
        self.attachment.as_ref()
    }

    /// Stores a value that outlives the current dispatch.
    /// 存储一个在当前分发结束后仍然保留的值。
    pub fn store(&mut self, key: i32, value: impl Into<Value>) {
        self.store.insert(key, value.into());
    }

    pub fn get(&self, key: i32) -> Option<&Value> {
        self.store.get(&key)
    }

    pub fn remove(&mut self, key: i32) -> Option<Value> {
        self.store.remove(&key)
    }

    /// Replies to the current await-RPC. Returns `false` if the current event
    /// is not an await-RPC, the reply was already sent or taken, or the caller
    /// stopped waiting.
    ///
    /// 应答当前的等待RPC。如果当前事件不是等待RPC、回复已发送或已取出，或调用方已不再等待，返回 `false`。
    pub fn done(&mut self, values: Vec<Value>) -> bool {
        match self.reply.take() {
            Some(tx) => tx.send(values).is_ok(),
            None => false,
        }
    }

    /// Takes the reply channel of the current await-RPC so it can be answered
    /// after the handler returns.
    ///
    /// 取出当前等待RPC的回复通道，以便在处理器返回之后再应答。
    pub fn take_reply(&mut self) -> Option<DeferredReply> {
        self.reply.take().map(|tx| DeferredReply { tx })
    }

    /// Calls an RPC on `target`, recording this module as the sender.
    /// 调用 `target` 上的RPC，并记录本模块为发送方。
    pub fn rpc_call(&self, target: &Module, name: &str, args: Args) {
        target.rpc_call_from(Some(self.module.id()), name, args);
    }

    /// Schedules `callback` to run on this module's thread after `delay_ms`.
    /// Returns the handle for [`remove_timer`](Self::remove_timer).
    ///
    /// 调度 `callback` 在 `delay_ms` 毫秒后于本模块线程上运行。返回用于
    /// [`remove_timer`](Self::remove_timer) 的句柄。
    pub fn add_timer<F>(&mut self, delay_ms: u64, callback: F, args: Args) -> TimerId
    where
        F: FnOnce(&mut ModuleContext, &Args) + 'static,
    {
        let now = self.clock.now_ms();
        let task = TimerTask {
            callback: Box::new(callback),
            args,
        };
        self.timers.add_timer(now, delay_ms, task)
    }

    /// Cancels a timer. Cancelling the timer whose callback is running right
    /// now does nothing and returns `true`.
    ///
    /// 取消定时器。取消当前正在运行回调的定时器不做任何事并返回 `true`。
    pub fn remove_timer(&mut self, id: TimerId) -> bool {
        self.timers.delete_timer(id)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn timer_stats(&self) -> TimerStats {
        self.timers.stats()
    }

    /// Current time of the module's clock in milliseconds.
    /// 模块时钟的当前时间（毫秒）。
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentRef> {
        self.agents.get(&id)
    }

    /// Agents currently connected to this module.
    /// 当前连接到本模块的代理。
    pub fn agents(&self) -> impl Iterator<Item = &AgentRef> {
        self.agents.values()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn component_by_id(&self, id: ComponentId) -> Option<&ComponentRef> {
        self.components.get(&id)
    }

    /// Fires due timers, at most `max_count` of them.
    pub(super) fn run_timers(&mut self, max_count: usize) -> usize {
        let now = self.clock.now_ms();
        let mut fired = 0;
        while fired < max_count {
            let Some(expired) = self.timers.poll_expired(now) else {
                break;
            };
            let TimerTask { callback, args } = expired.payload;
            callback(self, &args);
            self.timers.finish_running();
            self.reset();
            fired += 1;
        }
        fired
    }

    /// Milliseconds until the timer wheel next needs attention.
    pub(super) fn next_timer_delay(&self) -> Option<u64> {
        self.timers.next_wake_delay(self.clock.now_ms())
    }

    /// Clears everything that describes the current dispatch.
    pub(super) fn reset(&mut self) {
        self.sender = None;
        self.sender_module = None;
        self.component = None;
        self.attachment = None;
        self.reply = None;
    }

    /// Restores a consistent state after a handler or timer callback panicked.
    pub(super) fn recover(&mut self) {
        self.timers.finish_running();
        self.reset();
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module)
            .field("pending_timers", &self.timers.len())
            .field("agents", &self.agents.len())
            .field("components", &self.components.len())
            .finish()
    }
}
