//! 模块执行循环
//! The module execution loop
//!
//! Each module runs on its own OS thread, which drives a single-threaded
//! tokio runtime so that waiting for events, timers and the close signal can
//! share one `select!`. All handlers run synchronously on that thread.
//!
//! 每个模块运行在自己的操作系统线程上，该线程驱动一个单线程tokio运行时，
//! 使等待事件、定时器和关闭信号可以共用一个 `select!`。所有处理器都在该线程上同步运行。

use super::context::ModuleContext;
use super::handle::{Module, ModuleShared, ModuleState};
use super::supervisor::{Supervisor, panic_message};
use crate::component::{AgentRef, ComponentError, ComponentId, ComponentRef, ManagerRef};
use crate::config::ModuleConfig;
use crate::event::{Event, EventKind, RpcRequest};
use crate::queue::WakeReceiver;
use crate::timer::Clock;
use crate::value::{Args, Value};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, trace, warn};

/// Everything the loop needs that is created together with the handle.
pub(super) struct Startup {
    pub(super) wake_rx: WakeReceiver,
    pub(super) close_rx: watch::Receiver<bool>,
    pub(super) config: ModuleConfig,
    pub(super) max_delay_ms: u64,
    pub(super) clock: Arc<dyn Clock>,
}

/// Entry point of the module thread.
pub(super) fn run(module: Module, startup: Startup) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(module = %module.name(), error = %e, "Failed to build module runtime");
            module.shared.set_state(ModuleState::Closed);
            module.shared.discard_pending();
            return;
        }
    };
    let mut actor = ModuleActor::new(module, startup);
    runtime.block_on(actor.run());
}

struct ModuleActor {
    shared: Arc<ModuleShared>,
    ctx: ModuleContext,
    wake_rx: WakeReceiver,
    close_rx: watch::Receiver<bool>,
    config: ModuleConfig,
    supervisor: Supervisor,
    batch: VecDeque<Event>,
    /// Kind of the event being dispatched; `None` while timers run.
    current: Option<EventKind>,
}

impl ModuleActor {
    fn new(module: Module, startup: Startup) -> Self {
        let shared = module.shared.clone();
        let ctx = ModuleContext::new(module, startup.clock, startup.max_delay_ms);
        Self {
            shared,
            ctx,
            wake_rx: startup.wake_rx,
            close_rx: startup.close_rx,
            supervisor: Supervisor::new(startup.config.restart_policy),
            batch: VecDeque::with_capacity(startup.config.event_batch_size),
            config: startup.config,
            current: None,
        }
    }

    async fn run(&mut self) {
        self.shared.set_state(ModuleState::Running);
        info!(module = %self.shared.name, id = self.shared.id, "Module started");

        loop {
            // 1. Dispatch a batch of events.
            // 1. 分发一批事件。
            let drained = self.process_batch();

            // 2. Fire due timers.
            // 2. 触发到期的定时器。
            self.process_timers();

            if *self.close_rx.borrow_and_update() {
                break;
            }
            if drained > 0 {
                continue;
            }

            let next_timer = self.ctx.next_timer_delay();
            if next_timer == Some(0) {
                continue;
            }

            // 3. Nothing to do: announce the wait, or poll again if work slipped in.
            // 3. 无事可做：声明等待；如果有任务恰好到达则重新轮询。
            if !self.shared.queue.announce_intent_to_wait() {
                continue;
            }

            let wait = next_timer
                .map(Duration::from_millis)
                .map_or(self.config.idle_tick, |delay| delay.min(self.config.idle_tick));

            // 4. Block until an event, a timer or the close signal.
            // 4. 阻塞直到有事件、定时器或关闭信号。
            tokio::select! {
                _ = self.close_rx.changed() => {
                    trace!(module = %self.shared.name, "Close signal received");
                }
                _ = self.wake_rx.recv() => {}
                _ = tokio::time::sleep(wait) => {}
            }
            self.shared.queue.rearm_after_wake();
        }

        self.shutdown();
    }

    /// Takes up to one batch from the queue and dispatches it. Returns the
    /// number of events taken.
    fn process_batch(&mut self) -> usize {
        let (read, _) = self.shared.queue.get(&mut self.batch, self.config.event_batch_size);

        while !self.batch.is_empty() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_batch()));
            if let Err(payload) = result {
                self.recover(payload);
            }
        }
        read
    }

    fn dispatch_batch(&mut self) {
        while let Some(event) = self.batch.pop_front() {
            self.current = Some(event.kind());
            dispatch(&mut self.ctx, event);
            self.ctx.reset();
            self.shared.processed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn process_timers(&mut self) {
        self.current = None;
        let max = self.config.max_timers_per_tick;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.ctx.run_timers(max)));
        match result {
            Ok(0) => {}
            Ok(fired) => trace!(module = %self.shared.name, fired, "Fired timers"),
            Err(payload) => self.recover(payload),
        }
    }

    /// Logs a caught panic and applies the restart policy. The loop itself,
    /// its queue and all module state carry over unchanged.
    fn recover(&mut self, payload: Box<dyn Any + Send>) {
        self.shared.set_state(ModuleState::Restarting);
        let restarts = self.shared.restarts.fetch_add(1, Ordering::Relaxed) + 1;
        let source = self.current.map_or("timer", |kind| kind.as_str());
        error!(
            module = %self.shared.name,
            source,
            restarts,
            panic = %panic_message(&*payload),
            "Handler panicked, restarting module loop"
        );

        // Drops an unanswered reply, which releases its caller.
        self.ctx.recover();

        let dropped = self.supervisor.apply(&mut self.batch);
        if dropped > 0 {
            warn!(module = %self.shared.name, dropped, "Dropped undispatched events after panic");
        }
        self.shared.set_state(ModuleState::Running);
    }

    fn shutdown(&mut self) {
        // Whatever was pushed before the close signal still gets dispatched.
        while self.process_batch() > 0 {}

        for component in self.ctx.components.values() {
            component.close();
        }
        for agent in self.ctx.agents.values() {
            agent.close();
        }
        self.ctx.agents.clear();
        self.ctx.components.clear();
        self.ctx.managers.clear();

        self.shared.set_state(ModuleState::Closed);
        // A caller that passed the closing check may have pushed after the
        // drain above; its own post-push check covers anything later.
        let stranded = self.shared.discard_pending();
        if stranded > 0 {
            debug!(module = %self.shared.name, stranded, "Discarded events pushed during close");
        }
        info!(
            module = %self.shared.name,
            processed = self.shared.processed.load(Ordering::Relaxed),
            restarts = self.shared.restarts.load(Ordering::Relaxed),
            "Module closed"
        );
    }
}

fn dispatch(ctx: &mut ModuleContext, event: Event) {
    match event {
        Event::Data {
            kind,
            agent,
            proto_type_id,
            payload,
        } => {
            let handler = ctx
                .module()
                .shared
                .handlers
                .get(&proto_type_id)
                .map(|entry| Arc::clone(entry.value()));
            match handler {
                Some(handler) => {
                    ctx.sender = agent;
                    handler(ctx, &payload);
                }
                None => error!(
                    module = %ctx.module_name(),
                    proto_type_id,
                    %kind,
                    "No handler registered for message type"
                ),
            }
        }
        Event::Rpc(request) => dispatch_rpc(ctx, request, None),
        Event::AwaitRpc { request, reply } => dispatch_rpc(ctx, request, Some(reply)),
        Event::Session {
            kind,
            agent,
            component_id,
            extra,
        } => match kind {
            EventKind::TcpConnected | EventKind::TcpAccepted => agent_entered(ctx, agent, component_id),
            EventKind::TcpClosed => agent_closed(ctx, agent, component_id, extra),
            EventKind::TcpConnectFailed => connect_failed(ctx, component_id, extra),
            other => error!(module = %ctx.module_name(), kind = %other, "Unexpected session event"),
        },
        Event::Component {
            kind,
            component,
            manager,
            error,
        } => match kind {
            EventKind::ComponentCreate => component_created(ctx, component, manager),
            EventKind::ComponentError => component_failed(ctx, component, error),
            other => error!(module = %ctx.module_name(), kind = %other, "Unexpected component event"),
        },
        Event::Custom(action) => action(ctx),
    }
}

fn dispatch_rpc(ctx: &mut ModuleContext, request: RpcRequest, reply: Option<oneshot::Sender<Vec<Value>>>) {
    let handler = ctx
        .module()
        .shared
        .rpc_handlers
        .get(&request.name)
        .map(|entry| Arc::clone(entry.value()));
    let Some(handler) = handler else {
        // A dropped reply tells an awaiting caller there is no answer.
        error!(module = %ctx.module_name(), rpc = %request.name, "No handler registered for rpc");
        return;
    };

    ctx.sender_module = request.sender;
    ctx.reply = reply;
    handler(ctx, &request.args);
}

fn session_attachment(extra: Args) -> Option<Value> {
    (!extra.is_empty()).then(|| Value::List(extra.into_vec()))
}

fn agent_entered(ctx: &mut ModuleContext, agent: Option<AgentRef>, component_id: ComponentId) {
    let Some(agent) = agent else {
        warn!(module = %ctx.module_name(), component_id, "Session event without an agent");
        return;
    };
    let agent_id = agent.id();
    ctx.agents.insert(agent_id, agent.clone());
    ctx.sender = Some(agent.clone());
    ctx.component = ctx.components.get(&component_id).cloned();

    match ctx.managers.get(&component_id).cloned() {
        Some(manager) => manager.on_linker_connected(ctx, agent_id, &agent),
        None => error!(
            module = %ctx.module_name(),
            agent_id,
            component_id,
            "Agent connected through an unknown component"
        ),
    }
}

fn agent_closed(ctx: &mut ModuleContext, agent: Option<AgentRef>, component_id: ComponentId, extra: Args) {
    let Some(agent) = agent else {
        warn!(module = %ctx.module_name(), component_id, "Session event without an agent");
        return;
    };
    let agent_id = agent.id();
    ctx.agents.remove(&agent_id);
    ctx.sender = Some(agent.clone());
    ctx.component = ctx.components.get(&component_id).cloned();

    let error = extra.read_str(0).ok().map(|reason| ComponentError::Closed {
        component_id,
        reason: reason.to_string(),
    });
    ctx.attachment = session_attachment(extra);

    match ctx.managers.get(&component_id).cloned() {
        Some(manager) => manager.on_linker_closed(ctx, agent_id, &agent, error.as_ref()),
        None => error!(
            module = %ctx.module_name(),
            agent_id,
            component_id,
            "Agent closed on an unknown component"
        ),
    }
}

fn connect_failed(ctx: &mut ModuleContext, component_id: ComponentId, extra: Args) {
    let reason = extra.read_str(0).unwrap_or("connect failed").to_string();
    let error = ComponentError::ConnectFailed { component_id, reason };
    ctx.component = ctx.components.get(&component_id).cloned();
    ctx.attachment = session_attachment(extra);

    match ctx.managers.get(&component_id).cloned() {
        Some(manager) => manager.on_component_error(ctx, &error),
        None => error!(module = %ctx.module_name(), component_id, %error, "Connect failure on an unknown component"),
    }
}

fn component_created(ctx: &mut ModuleContext, component: ComponentRef, manager: Option<ManagerRef>) {
    let component_id = component.id();
    if ctx.components.contains_key(&component_id) {
        error!(module = %ctx.module_name(), component_id, "Component has already been registered");
        return;
    }

    ctx.components.insert(component_id, component.clone());
    if let Some(manager) = &manager {
        ctx.managers.insert(component_id, manager.clone());
    }
    ctx.component = Some(component.clone());

    match component.start() {
        Ok(()) => {
            debug!(
                module = %ctx.module_name(),
                component_id,
                component_type = ?component.component_type(),
                "Component started"
            );
            if let Some(manager) = manager {
                manager.on_component_create(ctx, component_id);
            }
        }
        Err(error) => {
            warn!(module = %ctx.module_name(), component_id, %error, "Component failed to start");
            if let Some(manager) = manager {
                manager.on_component_error(ctx, &error);
            }
        }
    }
}

fn component_failed(ctx: &mut ModuleContext, component: ComponentRef, error: Option<ComponentError>) {
    let component_id = component.id();
    let error = error.unwrap_or_else(|| ComponentError::Closed {
        component_id,
        reason: "unspecified".to_string(),
    });
    ctx.component = Some(component);

    match ctx.managers.get(&component_id).cloned() {
        Some(manager) => manager.on_component_error(ctx, &error),
        None => error!(module = %ctx.module_name(), component_id, %error, "Error reported for an unknown component"),
    }
}
