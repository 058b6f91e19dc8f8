#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the actor-style module runtime.
//! actor风格模块运行时的根。

pub mod config;
pub mod error;
pub mod ids;
pub mod value;

pub mod component;
pub mod event;
pub mod queue;
pub mod timer;

pub mod console;
pub mod module;
pub mod runtime;
pub mod worker_pool;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use module::{Module, ModuleContext, ModuleRegistry, ModuleState, RestartPolicy};
pub use runtime::Runtime;
pub use timer::TimerId;
pub use value::{ArgError, Args, Value};
pub use worker_pool::{RouteHash, WorkerPool};
