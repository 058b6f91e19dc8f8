//! 控制台命令桥
//! Console command bridge
//!
//! Reads lines of the form `<module> <rpc> [args...]` from standard input and
//! turns each into an RPC call with string arguments.
//!
//! 从标准输入读取 `<模块> <rpc> [参数...]` 形式的行，并将每一行转换为带字符串参数的RPC调用。

use crate::error::{Error, Result};
use crate::module::ModuleRegistry;
use crate::value::{Args, Value};
use std::io::{self, BufRead};
use std::ops::Deref;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// A parsed console line.
/// 解析后的控制台命令行。
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleCommand {
    pub module: String,
    pub rpc: String,
    pub args: Args,
}

/// Parses `<module> <rpc> [args...]`. Lines with fewer than two fields yield `None`.
/// 解析 `<模块> <rpc> [参数...]`。少于两个字段的行返回 `None`。
pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let mut fields = line.split_whitespace();
    let module = fields.next()?.to_string();
    let rpc = fields.next()?.to_string();
    let args = fields.map(|field| Value::Str(field.to_string())).collect();
    Some(ConsoleCommand { module, rpc, args })
}

/// Parses one line and issues the call on `registry`.
///
/// Returns `Ok(false)` for blank or incomplete lines. Unknown modules and
/// RPC names are reported before anything is queued.
///
/// 解析一行并在 `registry` 上发起调用。空行或不完整的行返回 `Ok(false)`。
/// 未知模块和RPC名称会在入队前报告。
pub fn dispatch_line(registry: &ModuleRegistry, line: &str) -> Result<bool> {
    let Some(command) = parse_command(line) else {
        return Ok(false);
    };
    match registry.require(&command.module) {
        Ok(module) if !module.has_rpc_handler(&command.rpc) => {
            warn!(module = %command.module, rpc = %command.rpc, "Console command for unknown rpc");
            Err(Error::HandlerNotFound(format!("rpc `{}`", command.rpc)))
        }
        Ok(module) => {
            debug!(module = %command.module, rpc = %command.rpc, "Console command");
            module.rpc_call(&command.rpc, command.args);
            Ok(true)
        }
        Err(e @ Error::ModuleNotFound(_)) => {
            warn!(module = %command.module, "Console command for unknown module");
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// Feeds every line of `reader` to [`dispatch_line`] until end of input.
/// 将 `reader` 的每一行交给 [`dispatch_line`]，直到输入结束。
pub fn run_reader(registry: &ModuleRegistry, reader: impl BufRead) -> Result<usize> {
    let mut issued = 0;
    for line in reader.lines() {
        if let Ok(true) = dispatch_line(registry, &line?) {
            issued += 1;
        }
    }
    Ok(issued)
}

/// Reads standard input on a background thread for the lifetime of the process.
/// 在后台线程上读取标准输入，持续整个进程生命周期。
pub fn spawn<R>(registry: R) -> Result<JoinHandle<()>>
where
    R: Deref<Target = ModuleRegistry> + Send + 'static,
{
    let handle = thread::Builder::new().name("console".to_string()).spawn(move || {
        match run_reader(&registry, io::stdin().lock()) {
            Ok(issued) => info!(issued, "Console input closed"),
            Err(e) => warn!(error = %e, "Console input failed"),
        }
    })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_parse_command() {
        let command = parse_command("  Main  reload   config.toml fast\r").unwrap();
        assert_eq!(command.module, "Main");
        assert_eq!(command.rpc, "reload");
        assert_eq!(command.args, args!["config.toml", "fast"]);

        assert_eq!(parse_command("Main").map(|c| c.rpc), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_dispatch_to_unknown_module() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            dispatch_line(&registry, "Ghost ping"),
            Err(Error::ModuleNotFound(_))
        ));
        assert!(matches!(dispatch_line(&registry, ""), Ok(false)));
    }

    #[test]
    fn test_dispatch_to_unknown_rpc() {
        let registry = ModuleRegistry::new();
        let module = registry.get_or_create("Main");
        assert!(matches!(
            dispatch_line(&registry, "Main reload"),
            Err(Error::HandlerNotFound(_))
        ));
        assert_eq!(module.pending_events(), 0);
    }

    #[test]
    fn test_run_reader_queues_calls() {
        let registry = ModuleRegistry::new();
        let module = registry.get_or_create("Main");
        module.register_rpc_handler("ping", |_, _| {}).unwrap();
        let input = "Main ping 1\nGhost ping\nMain pong\n\nMain ping 2\n";
        assert_eq!(run_reader(&registry, input.as_bytes()).unwrap(), 2);
        assert_eq!(module.pending_events(), 2);
    }
}
