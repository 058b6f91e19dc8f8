//! 模块句柄
//! Module handle
//!
//! A [`Module`] is a cheap, cloneable handle to one actor. Every thread may
//! use it to push events or call RPCs; only the module's own thread ever runs
//! its handlers.
//!
//! [`Module`] 是指向单个actor的廉价可克隆句柄。任何线程都可以用它推送事件或调用RPC；
//! 只有模块自身的线程会运行其处理器。

use super::actor::{self, Startup};
use super::context::ModuleContext;
use crate::component::{AgentRef, ComponentError, ComponentId, ComponentRef, ManagerRef, ModuleId, ProtoTypeId};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, RpcRequest};
use crate::queue::EventQueue;
use crate::timer::Clock;
use crate::value::{Args, Value};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Handler for a decoded message type.
/// 已解码消息类型的处理器。
pub type MsgHandler = Arc<dyn Fn(&mut ModuleContext, &Value) + Send + Sync>;

/// Handler for a named RPC.
/// 具名RPC的处理器。
pub type RpcHandler = Arc<dyn Fn(&mut ModuleContext, &Args) + Send + Sync>;

/// Lifecycle state of a module.
/// 模块的生命周期状态。
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Created = 0,
    Running = 1,
    Restarting = 2,
    Closed = 3,
}

impl ModuleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Restarting,
            3 => Self::Closed,
            _ => Self::Created,
        }
    }
}

/// State shared between the handle and the module thread.
pub(super) struct ModuleShared {
    pub(super) id: ModuleId,
    pub(super) name: String,
    pub(super) queue: EventQueue<Event>,
    pub(super) handlers: DashMap<ProtoTypeId, MsgHandler>,
    pub(super) rpc_handlers: DashMap<String, RpcHandler>,
    pub(super) restarts: AtomicU64,
    pub(super) processed: AtomicU64,
    state: AtomicU8,
    close_tx: watch::Sender<bool>,
    startup: Mutex<Option<Startup>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleShared {
    pub(super) fn set_state(&self, state: ModuleState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> ModuleState {
        ModuleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn closing(&self) -> bool {
        *self.close_tx.borrow() || self.state() == ModuleState::Closed
    }

    /// Drops every queued event. Only called once nothing will dispatch
    /// again; dropping an await-RPC releases its caller.
    pub(super) fn discard_pending(&self) -> usize {
        let mut discarded: Vec<Event> = Vec::new();
        let mut total = 0;
        loop {
            let (read, _) = self.queue.get(&mut discarded, usize::MAX);
            if read == 0 {
                return total;
            }
            total += read;
            discarded.clear();
        }
    }
}

/// A handle to one actor.
///
/// 指向单个actor的句柄。
#[derive(Clone)]
pub struct Module {
    pub(super) shared: Arc<ModuleShared>,
}

impl Module {
    /// Creates a module that is not running yet. Events pushed before
    /// [`start`](Self::start) are kept and processed once it runs.
    ///
    /// 创建尚未运行的模块。在 [`start`](Self::start) 之前推送的事件会被保留，并在运行后处理。
    pub fn new(id: ModuleId, name: impl Into<String>, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let (queue, wake_rx) = EventQueue::new(config.module.wake_channel_capacity);
        let (close_tx, close_rx) = watch::channel(false);
        let startup = Startup {
            wake_rx,
            close_rx,
            config: config.module.clone(),
            max_delay_ms: config.timer.max_delay_ms,
            clock,
        };

        Self {
            shared: Arc::new(ModuleShared {
                id,
                name: name.into(),
                queue,
                handlers: DashMap::new(),
                rpc_handlers: DashMap::new(),
                restarts: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                state: AtomicU8::new(ModuleState::Created as u8),
                close_tx,
                startup: Mutex::new(Some(startup)),
                thread: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ModuleState {
        self.shared.state()
    }

    /// How many times the loop recovered from a handler panic.
    /// 循环从处理器panic中恢复的次数。
    pub fn restart_count(&self) -> u64 {
        self.shared.restarts.load(Ordering::Relaxed)
    }

    /// Events dispatched to completion so far.
    /// 迄今为止已完成分发的事件数。
    pub fn processed_events(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Events queued but not yet taken by the module loop.
    pub fn pending_events(&self) -> i64 {
        self.shared.queue.pending()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state() == ModuleState::Closed
    }

    /// Pushes a pre-built event. Events pushed after close are dropped.
    /// 推送预先构建的事件。关闭后推送的事件会被丢弃。
    pub fn push_event(&self, event: Event) {
        if self.shared.closing() {
            debug!(module = %self.shared.name, kind = %event.kind(), "Dropping event for closed module");
            return;
        }
        self.enqueue(event);
    }

    /// Pushes past the closing check. If the module finished its final drain
    /// in the meantime, the event is discarded here instead of stranded.
    pub(super) fn enqueue(&self, event: Event) {
        self.shared.queue.push(event);
        if self.shared.state() == ModuleState::Closed {
            let dropped = self.shared.discard_pending();
            debug!(module = %self.shared.name, dropped, "Discarded events pushed during close");
        }
    }

    /// Posts a session lifecycle event (connected, accepted, connect failed, closed).
    /// 投递会话生命周期事件（已连接、已接受、连接失败、已关闭）。
    pub fn post_event(&self, kind: EventKind, agent: Option<AgentRef>, component_id: ComponentId, extra: Args) {
        self.push_event(Event::Session {
            kind,
            agent,
            component_id,
            extra,
        });
    }

    /// Posts a decoded inbound message for the handler registered under `proto_type_id`.
    /// 为 `proto_type_id` 下注册的处理器投递一条已解码的入站消息。
    pub fn post_data(
        &self,
        kind: EventKind,
        proto_type_id: ProtoTypeId,
        agent: Option<AgentRef>,
        payload: impl Into<Value>,
    ) {
        self.push_event(Event::Data {
            kind,
            agent,
            proto_type_id,
            payload: payload.into(),
        });
    }

    /// Queues a call of the RPC handler registered under `name`. Never blocks.
    /// 将对 `name` 下注册的RPC处理器的调用加入队列。永不阻塞。
    pub fn rpc_call(&self, name: &str, args: Args) {
        self.rpc_call_from(None, name, args);
    }

    pub(crate) fn rpc_call_from(&self, sender: Option<ModuleId>, name: &str, args: Args) {
        self.push_event(Event::Rpc(RpcRequest {
            sender,
            name: name.to_string(),
            args,
        }));
    }

    /// Calls an RPC and blocks the calling thread until the handler replies.
    ///
    /// Must not be used on a thread that drives a tokio runtime, which
    /// includes every module thread; use [`call`](Self::call) there instead.
    /// Returns [`Error::RpcDropped`] if the handler finishes without replying.
    ///
    /// 调用RPC并阻塞调用线程，直到处理器回复。
    ///
    /// 不能在驱动tokio运行时的线程上使用（包括所有模块线程）；此时应使用 [`call`](Self::call)。
    /// 如果处理器结束时没有回复，返回 [`Error::RpcDropped`]。
    pub fn await_rpc_call(&self, name: &str, args: Args) -> Result<Vec<Value>> {
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!(module = %self.shared.name, rpc = %name, "Refusing blocking rpc inside an async runtime");
            return Err(Error::BlockingInRuntime(name.to_string()));
        }
        let reply = self.request(None, name, args)?;
        reply.blocking_recv().map_err(|_| Error::RpcDropped(name.to_string()))
    }

    /// Async counterpart of [`await_rpc_call`](Self::await_rpc_call).
    /// [`await_rpc_call`](Self::await_rpc_call) 的异步版本。
    pub async fn call(&self, name: &str, args: Args) -> Result<Vec<Value>> {
        let reply = self.request(None, name, args)?;
        reply.await.map_err(|_| Error::RpcDropped(name.to_string()))
    }

    /// Like [`call`](Self::call), giving up after `timeout`.
    /// 与 [`call`](Self::call) 相同，但在 `timeout` 后放弃。
    pub async fn call_timeout(&self, name: &str, args: Args, timeout: Duration) -> Result<Vec<Value>> {
        let reply = self.request(None, name, args)?;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(_)) => Err(Error::RpcDropped(name.to_string())),
            Err(_) => Err(Error::RpcTimeout(name.to_string())),
        }
    }

    pub(crate) fn request(
        &self,
        sender: Option<ModuleId>,
        name: &str,
        args: Args,
    ) -> Result<oneshot::Receiver<Vec<Value>>> {
        if self.shared.closing() {
            return Err(Error::ModuleClosed(self.shared.name.clone()));
        }
        let (reply, rx) = oneshot::channel();
        self.enqueue(Event::AwaitRpc {
            request: RpcRequest {
                sender,
                name: name.to_string(),
                args,
            },
            reply,
        });
        Ok(rx)
    }

    /// Registers the handler for a message type. The first registration wins.
    /// 为消息类型注册处理器。以第一次注册为准。
    pub fn register_handler<F>(&self, proto_type_id: ProtoTypeId, handler: F) -> Result<()>
    where
        F: Fn(&mut ModuleContext, &Value) + Send + Sync + 'static,
    {
        self.insert_handler(proto_type_id, Arc::new(handler))
    }

    pub(crate) fn insert_handler(&self, proto_type_id: ProtoTypeId, handler: MsgHandler) -> Result<()> {
        match self.shared.handlers.entry(proto_type_id) {
            Entry::Occupied(_) => {
                warn!(module = %self.shared.name, proto_type_id, "Message handler has already been registered");
                Err(Error::DuplicateHandler(format!("message type {}", proto_type_id)))
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    pub fn has_rpc_handler(&self, name: &str) -> bool {
        self.shared.rpc_handlers.contains_key(name)
    }

    /// Registers the handler for an RPC name. The first registration wins.
    /// 为RPC名称注册处理器。以第一次注册为准。
    pub fn register_rpc_handler<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut ModuleContext, &Args) + Send + Sync + 'static,
    {
        self.insert_rpc_handler(name, Arc::new(handler))
    }

    pub(crate) fn insert_rpc_handler(&self, name: &str, handler: RpcHandler) -> Result<()> {
        match self.shared.rpc_handlers.entry(name.to_string()) {
            Entry::Occupied(_) => {
                warn!(module = %self.shared.name, rpc = %name, "Rpc handler has already been registered");
                Err(Error::DuplicateHandler(format!("rpc `{}`", name)))
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Hands `component` to this module. It is registered and started on the
    /// module's thread, and `manager` receives its lifecycle callbacks.
    ///
    /// 将 `component` 交给本模块。它在模块线程上注册并启动，`manager` 接收其生命周期回调。
    pub fn add_component(&self, component: ComponentRef, manager: ManagerRef) {
        self.push_event(Event::component_create(component, manager));
    }

    /// Reports a failure of a component owned by this module to its manager.
    /// 将本模块拥有的组件的故障报告给其管理器。
    pub fn report_component_error(&self, component: ComponentRef, error: ComponentError) {
        self.push_event(Event::component_error(component, error));
    }

    /// Runs `action` on the module's thread.
    /// 在模块线程上运行 `action`。
    pub fn execute<F>(&self, action: F)
    where
        F: FnOnce(&mut ModuleContext) + Send + 'static,
    {
        self.push_event(Event::Custom(Box::new(action)));
    }

    /// Spawns the module's dedicated thread.
    /// 启动模块的专用线程。
    pub fn start(&self) -> Result<()> {
        let startup = self
            .shared
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::AlreadyStarted(self.shared.name.clone()))?;

        let mut builder = thread::Builder::new().name(format!("module-{}", self.shared.name));
        if let Some(stack_size) = startup.config.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let module = self.clone();
        let handle = builder.spawn(move || actor::run(module, startup))?;
        *self.shared.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(module = %self.shared.name, id = self.shared.id, "Module thread spawned");
        Ok(())
    }

    /// Signals the module to close. The loop drains its queue once more,
    /// closes its components and agents, and exits. Does not wait; see
    /// [`join`](Self::join).
    ///
    /// 通知模块关闭。循环会再排空一次队列，关闭其组件和代理后退出。不会等待，见 [`join`](Self::join)。
    pub fn close(&self) {
        let never_started = self
            .shared
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        self.shared.close_tx.send_replace(true);
        if never_started {
            self.shared.set_state(ModuleState::Closed);
            // Nobody will dispatch these; dropping them releases waiting callers.
            self.shared.discard_pending();
        }
        info!(module = %self.shared.name, "Module will close");
    }

    /// Waits for the module's thread to finish. Returns immediately if the
    /// module never started or is called from the module's own thread.
    ///
    /// 等待模块线程结束。如果模块从未启动，或在模块自身线程上调用，则立即返回。
    pub fn join(&self) {
        let handle = self.shared.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Put it back; someone else will join.
            *self.shared.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            return;
        }
        if handle.join().is_err() {
            error!(module = %self.shared.name, "Module thread terminated abnormally");
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .finish()
    }
}
