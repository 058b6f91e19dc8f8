//! 模块注册表
//! Module registry

use super::handle::Module;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::{AtomicIdSource, IdSource, global_ids};
use crate::timer::{Clock, MonotonicClock};
use crate::worker_pool::WorkerPool;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

/// Owns every module and worker pool of a process by name.
///
/// Modules are created once per name and live until [`close`](Self::close).
/// Modules created before [`start`](Self::start) wait for it; modules created
/// afterwards start right away.
///
/// 按名称拥有进程中的所有模块和工作池。
///
/// 每个名称只创建一次模块，并存活到 [`close`](Self::close)。在 [`start`](Self::start)
/// 之前创建的模块会等待启动；之后创建的模块立即启动。
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: DashMap<String, Module>,
    pools: DashMap<String, WorkerPool>,
    config: Config,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    started: AtomicBool,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_parts(config, Arc::new(MonotonicClock::new()), Arc::new(AtomicIdSource::new()))
    }

    /// Creates a registry with an injected clock and ID source.
    /// 使用注入的时钟和ID源创建注册表。
    pub fn with_parts(config: Config, clock: Arc<dyn Clock>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            modules: DashMap::new(),
            pools: DashMap::new(),
            config,
            clock,
            ids,
            started: AtomicBool::new(false),
        }
    }

    /// The lazily created process-wide registry.
    /// 延迟创建的进程级注册表。
    pub fn global() -> &'static ModuleRegistry {
        static GLOBAL: OnceLock<ModuleRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            ModuleRegistry::with_parts(Config::default(), Arc::new(MonotonicClock::new()), global_ids())
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ids(&self) -> &Arc<dyn IdSource> {
        &self.ids
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the module called `name`, creating it on first use.
    /// 返回名为 `name` 的模块，首次使用时创建。
    pub fn get_or_create(&self, name: &str) -> Module {
        let module = self
            .modules
            .entry(name.to_string())
            .or_insert_with(|| self.new_module(name.to_string()))
            .clone();
        if self.is_started() {
            start_quietly(&module);
        }
        module
    }

    pub fn find(&self, name: &str) -> Option<Module> {
        self.modules.get(name).map(|entry| entry.value().clone())
    }

    /// Looks a module up, reporting a missing one as an error.
    /// 查找模块，不存在时返回错误。
    pub fn require(&self, name: &str) -> Result<Module> {
        self.find(name).ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    pub fn modules(&self) -> Vec<Module> {
        self.modules.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Creates a pool of `size` modules named `"{name}_worker_{n}"`. Asking
    /// again for an existing pool returns it unchanged.
    ///
    /// 创建由 `size` 个名为 `"{name}_worker_{n}"` 的模块组成的工作池。再次请求已存在的池时原样返回。
    pub fn create_workers(&self, name: &str, size: usize) -> WorkerPool {
        let pool = self
            .pools
            .entry(name.to_string())
            .or_insert_with(|| {
                let members = (1..=size)
                    .map(|n| self.new_module(format!("{}_worker_{}", name, n)))
                    .collect();
                info!(pool = %name, size, "Created worker pool");
                WorkerPool::new(name, members, self.config.worker_pool.route_hash)
            })
            .clone();
        if self.is_started() {
            pool.for_each_module(start_quietly);
        }
        pool
    }

    pub fn worker_pool(&self, name: &str) -> Option<WorkerPool> {
        self.pools.get(name).map(|entry| entry.value().clone())
    }

    /// Starts every module and pool created so far.
    /// 启动迄今为止创建的所有模块和工作池。
    pub fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        for module in self.modules() {
            start_module(&module)?;
        }
        let pools: Vec<_> = self.pools.iter().map(|entry| entry.value().clone()).collect();
        for pool in pools {
            pool.start()?;
        }
        info!(modules = self.modules.len(), pools = self.pools.len(), "Module registry started");
        Ok(())
    }

    /// Signals every module to close, then waits for all of them.
    /// 通知所有模块关闭，然后等待它们全部结束。
    pub fn close(&self) {
        let modules = self.modules();
        let pools: Vec<_> = self.pools.iter().map(|entry| entry.value().clone()).collect();

        for module in &modules {
            module.close();
        }
        for pool in &pools {
            pool.close();
        }
        for module in &modules {
            module.join();
        }
        for pool in &pools {
            pool.join();
        }
        info!("Module registry closed");
    }

    fn new_module(&self, name: String) -> Module {
        let id = self.ids.next_id();
        debug!(module = %name, id, "Creating module");
        Module::new(id, name, &self.config, self.clock.clone())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts a module, treating "already started" as success.
pub(crate) fn start_module(module: &Module) -> Result<()> {
    match module.start() {
        Ok(()) | Err(Error::AlreadyStarted(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

fn start_quietly(module: &Module) {
    if let Err(e) = start_module(module) {
        error!(module = %module.name(), error = %e, "Failed to start module");
    }
}
