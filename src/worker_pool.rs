//! 工作池
//! Worker pools
//!
//! A worker pool is a fixed set of modules that share their handler
//! registrations. Calls are routed by a deterministic hash of the RPC name,
//! so every call with the same name lands on the same member and is
//! serialized there.
//!
//! 工作池是一组固定的模块，它们共享处理器注册。调用按RPC名称的确定性哈希进行路由，
//! 因此同名调用总是落在同一成员上并在其上串行执行。

use crate::component::ProtoTypeId;
use crate::error::{Error, Result};
use crate::module::{Module, ModuleContext, MsgHandler, RpcHandler, start_module};
use crate::value::{Args, Value};
use std::sync::Arc;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

/// Hash used to map an RPC name onto a pool member.
/// 用于将RPC名称映射到池成员的哈希算法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteHash {
    /// 64-bit XXH3 of the name's bytes.
    /// 名称字节的64位XXH3哈希。
    #[default]
    Xxh3,
    /// Samples the first, middle and last character plus the length. Cheap
    /// but collision-prone; kept for routing compatibility.
    ///
    /// 采样首、中、尾字符和长度。开销低但容易冲突；为路由兼容性而保留。
    Sampled,
}

impl RouteHash {
    pub fn hash(&self, name: &str) -> u64 {
        match self {
            RouteHash::Xxh3 => xxh3_64(name.as_bytes()),
            RouteHash::Sampled => sampled_hash(name),
        }
    }
}

fn sampled_hash(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let Some((&first, &last)) = bytes.first().zip(bytes.last()) else {
        return 0;
    };
    let middle = bytes[bytes.len() / 2];
    (first as u64) * 31 * 31 + (middle as u64) * 31 + (last as u64) + bytes.len() as u64
}

/// A named, fixed-size group of modules.
///
/// 具名的固定大小模块组。
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    members: Arc<[Module]>,
    route_hash: RouteHash,
}

impl WorkerPool {
    pub fn new(name: &str, members: Vec<Module>, route_hash: RouteHash) -> Self {
        Self {
            name: Arc::from(name),
            members: Arc::from(members),
            route_hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[Module] {
        &self.members
    }

    pub fn for_each_module(&self, mut f: impl FnMut(&Module)) {
        for module in self.members.iter() {
            f(module);
        }
    }

    /// The member that handles calls named `name`.
    /// 处理名为 `name` 的调用的成员。
    pub fn route(&self, name: &str) -> Result<&Module> {
        if self.members.is_empty() {
            return Err(Error::EmptyPool(self.name.to_string()));
        }
        let index = self.route_hash.hash(name) % self.members.len() as u64;
        Ok(&self.members[index as usize])
    }

    /// Registers a message handler on every member.
    /// 在每个成员上注册消息处理器。
    pub fn register_handler<F>(&self, proto_type_id: ProtoTypeId, handler: F) -> Result<()>
    where
        F: Fn(&mut ModuleContext, &Value) + Send + Sync + 'static,
    {
        let handler: MsgHandler = Arc::new(handler);
        self.broadcast(|module| module.insert_handler(proto_type_id, handler.clone()))
    }

    /// Registers an RPC handler on every member.
    /// 在每个成员上注册RPC处理器。
    pub fn register_rpc_handler<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut ModuleContext, &Args) + Send + Sync + 'static,
    {
        let handler: RpcHandler = Arc::new(handler);
        self.broadcast(|module| module.insert_rpc_handler(name, handler.clone()))
    }

    /// Registers on every member even if some reject the key, so that every
    /// routing choice stays usable. Returns the first rejection.
    fn broadcast(&self, mut register: impl FnMut(&Module) -> Result<()>) -> Result<()> {
        let mut first_error = None;
        for module in self.members.iter() {
            if let Err(e) = register(module) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn rpc_call(&self, name: &str, args: Args) -> Result<()> {
        self.route(name)?.rpc_call(name, args);
        Ok(())
    }

    pub fn await_rpc_call(&self, name: &str, args: Args) -> Result<Vec<Value>> {
        self.route(name)?.await_rpc_call(name, args)
    }

    pub async fn call(&self, name: &str, args: Args) -> Result<Vec<Value>> {
        self.route(name)?.call(name, args).await
    }

    pub fn start(&self) -> Result<()> {
        self.members.iter().try_for_each(start_module)
    }

    pub fn close(&self) {
        info!(pool = %self.name, "Worker pool will close");
        for module in self.members.iter() {
            module.close();
        }
    }

    pub fn join(&self) {
        for module in self.members.iter() {
            module.join();
        }
    }
}
