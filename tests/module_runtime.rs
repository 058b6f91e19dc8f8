//! 模块运行时集成测试
//! Module runtime integration tests

pub mod common;

use common::harness::{TestHarness, init_tracing, wait_until};
use kestrel_runtime::config::Config;
use kestrel_runtime::console;
use kestrel_runtime::{Args, Error, ModuleState, RouteHash, Runtime, Value, args};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

#[test]
fn test_await_rpc_round_trip() {
    let harness = TestHarness::new();
    let main = harness.registry.get_or_create("Main");
    main.register_rpc_handler("echo", |ctx, args| {
        ctx.done(args.clone().into_vec());
    })
    .unwrap();
    harness.registry.start().unwrap();

    assert_eq!(main.await_rpc_call("echo", args![42]).unwrap(), vec![Value::Int(42)]);
    assert_eq!(
        main.await_rpc_call("echo", args!["a", 1u32, false]).unwrap(),
        vec![Value::from("a"), Value::UInt(1), Value::Bool(false)]
    );

    harness.registry.close();
    assert_eq!(main.state(), ModuleState::Closed);
}

#[test]
fn test_worker_pool_routes_by_name() {
    let harness = TestHarness::new();
    let pool = harness.registry.create_workers("jobs", 4);
    for i in 0..40 {
        pool.register_rpc_handler(&format!("job.{}", i), |ctx, _| {
            let name = ctx.module_name().to_string();
            ctx.done(vec![Value::from(name)]);
        })
        .unwrap();
    }
    harness.registry.start().unwrap();

    let first = pool.await_rpc_call("job.7", Args::new()).unwrap();
    for _ in 0..5 {
        assert_eq!(pool.await_rpc_call("job.7", Args::new()).unwrap(), first);
    }
    assert_eq!(first, vec![Value::from(pool.route("job.7").unwrap().name())]);

    let members: HashSet<String> = (0..40)
        .map(|i| {
            let reply = pool.await_rpc_call(&format!("job.{}", i), Args::new()).unwrap();
            reply[0].as_str().unwrap_or_default().to_string()
        })
        .collect();
    assert!(members.len() > 1, "all jobs landed on {:?}", members);
    assert!(members.iter().all(|name| name.starts_with("jobs_worker_")));

    harness.registry.close();
}

#[test]
fn test_sampled_routing_groups_lookalike_names() {
    let mut config = Config::default();
    config.worker_pool.route_hash = RouteHash::Sampled;
    let harness = TestHarness::with_config(config);
    let pool = harness.registry.create_workers("legacy", 3);

    let a = pool.route("a_x_b").unwrap().id();
    let b = pool.route("a-x-b").unwrap().id();
    assert_eq!(a, b);
}

#[test]
fn test_console_line_reaches_handler() {
    let harness = TestHarness::new();
    let main = harness.registry.get_or_create("Main");
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    main.register_rpc_handler("greet", move |_, args| {
        let who = args.read_str(0).unwrap_or("nobody").to_string();
        tx.lock().unwrap().send(who).unwrap();
    })
    .unwrap();
    harness.registry.start().unwrap();

    let issued = console::run_reader(&harness.registry, "Main greet alice\nMain\n".as_bytes()).unwrap();
    assert_eq!(issued, 1);
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "alice");
    harness.registry.close();
}

#[tokio::test]
async fn test_runtime_closes_after_shutdown_signal() {
    init_tracing();
    let harness = TestHarness::new();
    let registry = harness.registry.clone();
    let main = registry.get_or_create("Main");
    main.register_rpc_handler("echo", |ctx, args| {
        ctx.done(args.clone().into_vec());
    })
    .unwrap();

    let hook_ran = Arc::new(AtomicBool::new(false));
    let flag = hook_ran.clone();
    let runtime = Runtime::new(registry.clone()).on_close(move |registry| {
        // Modules are still running while the hook runs.
        let main = registry.require("Main").unwrap();
        let reply = main.await_rpc_call("echo", args!["bye"]).unwrap();
        assert_eq!(reply, vec![Value::from("bye")]);
        flag.store(true, Ordering::SeqCst);
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (result, reply) = tokio::join!(
        runtime.run_until(async move { shutdown_rx.await.map_err(io::Error::other) }),
        async {
            let reply = main.call("echo", args![1]).await;
            shutdown_tx.send(()).unwrap();
            reply
        }
    );

    result.unwrap();
    assert_eq!(reply.unwrap(), vec![Value::Int(1)]);
    assert!(hook_ran.load(Ordering::SeqCst));
    assert_eq!(main.state(), ModuleState::Closed);
    assert!(matches!(main.call("echo", Args::new()).await, Err(Error::ModuleClosed(_))));
}

#[test]
fn test_modules_created_after_start_are_running() {
    let harness = TestHarness::new();
    harness.registry.start().unwrap();

    let late = harness.registry.get_or_create("Late");
    assert!(wait_until(Duration::from_secs(2), || late.state() == ModuleState::Running));
    harness.registry.close();
    assert!(late.is_closed());
}
