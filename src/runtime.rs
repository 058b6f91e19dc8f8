//! 运行时外观
//! Runtime facade
//!
//! Starts every registered module, optionally the console bridge, waits for
//! a shutdown signal, runs a close hook and performs the close handshake.
//!
//! 启动所有已注册模块（以及可选的控制台桥），等待关闭信号，运行关闭钩子并执行关闭握手。

use crate::console;
use crate::error::{Error, Result};
use crate::module::ModuleRegistry;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{info, warn};

type CloseHook = Box<dyn FnOnce(&ModuleRegistry) + Send>;

/// Process-level driver around a [`ModuleRegistry`].
///
/// 围绕 [`ModuleRegistry`] 的进程级驱动器。
pub struct Runtime {
    registry: Arc<ModuleRegistry>,
    on_close: Option<CloseHook>,
    console: bool,
}

impl Runtime {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            on_close: None,
            console: false,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Runs `hook` after the shutdown signal and before modules are closed.
    /// The hook may block, for example on an await-RPC.
    ///
    /// 在收到关闭信号之后、模块关闭之前运行 `hook`。钩子可以阻塞，例如等待RPC。
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&ModuleRegistry) + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Enables the stdin command bridge.
    /// 启用标准输入命令桥。
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Runs until Ctrl-C.
    /// 运行直到收到 Ctrl-C。
    pub async fn run_until_shutdown(self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Runs until `shutdown` completes, then closes every module.
    /// 运行直到 `shutdown` 完成，然后关闭所有模块。
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = io::Result<()>>,
    {
        if self.console {
            console::spawn(self.registry.clone())?;
        }
        self.registry.start()?;
        info!(modules = self.registry.modules().len(), "Runtime started");

        shutdown.await?;
        warn!("Runtime will close down");

        // Off the runtime, so the hook may block on await-RPCs.
        let registry = self.registry.clone();
        let hook = self.on_close.take();
        let (done_tx, done_rx) = oneshot::channel();
        thread::Builder::new().name("runtime-close".to_string()).spawn(move || {
            if let Some(hook) = hook {
                hook(&registry);
            }
            registry.close();
            let _ = done_tx.send(());
        })?;
        done_rx.await.map_err(|e| Error::Io(io::Error::other(e)))?;

        info!("Runtime closed");
        Ok(())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.registry)
            .field("console", &self.console)
            .finish()
    }
}
