//! 模块定时器集成测试
//! Module timer integration tests

pub mod common;

use common::harness::{TestHarness, wait_until};
use kestrel_runtime::{Args, ModuleContext, Value, args};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BEATS: i32 = 2;

fn heartbeat(ctx: &mut ModuleContext, args: &Args) {
    let beats = ctx.get(BEATS).and_then(Value::as_u64).unwrap_or(0);
    ctx.store(BEATS, beats + 1);
    let period = args.read_u64(0).unwrap_or(100);
    ctx.add_timer(period, heartbeat, args.clone());
}

fn beats(harness: &TestHarness) -> u64 {
    let main = harness.registry.require("Main").unwrap();
    let reply = main.await_rpc_call("beats", Args::new()).unwrap();
    reply[0].as_u64().unwrap_or(0)
}

#[test]
fn test_timers_fire_in_due_order_across_levels() {
    let harness = TestHarness::new();
    let main = harness.registry.get_or_create("Main");
    let fired = Arc::new(Mutex::new(Vec::new()));

    let log = fired.clone();
    main.register_rpc_handler("schedule", move |ctx, args| {
        for delay in args.iter().filter_map(Value::as_u64) {
            let log = log.clone();
            ctx.add_timer(delay, move |_, _| log.lock().unwrap().push(delay), Args::new());
        }
        let pending = ctx.pending_timers();
        ctx.done(vec![Value::from(pending)]);
    })
    .unwrap();
    harness.registry.start().unwrap();

    let reply = main
        .await_rpc_call("schedule", args![300u64, 10u64, 70_000u64, 256u64])
        .unwrap();
    assert_eq!(reply, vec![Value::UInt(4)]);

    harness.clock.advance(299);
    assert!(wait_until(Duration::from_secs(2), || fired.lock().unwrap().len() == 2));
    assert_eq!(*fired.lock().unwrap(), vec![10, 256]);

    // One jump over the coarse timer still fires everything in due order.
    harness.clock.advance(100_000);
    assert!(wait_until(Duration::from_secs(2), || fired.lock().unwrap().len() == 4));
    assert_eq!(*fired.lock().unwrap(), vec![10, 256, 300, 70_000]);

    harness.registry.close();
}

#[test]
fn test_periodic_timer_rearms_itself() {
    let harness = TestHarness::new();
    let main = harness.registry.get_or_create("Main");
    main.register_rpc_handler("start_heartbeat", |ctx, args| {
        let period = args.read_u64(0).unwrap_or(100);
        ctx.add_timer(period, heartbeat, args.clone());
    })
    .unwrap();
    main.register_rpc_handler("beats", |ctx, _| {
        let beats = ctx.get(BEATS).cloned().unwrap_or(Value::UInt(0));
        ctx.done(vec![beats]);
    })
    .unwrap();
    harness.registry.start().unwrap();

    main.rpc_call("start_heartbeat", args![100u64]);
    assert_eq!(beats(&harness), 0);

    for expected in 1..=10 {
        harness.clock.advance(100);
        assert!(
            wait_until(Duration::from_secs(2), || beats(&harness) == expected),
            "heartbeat stalled before beat {}",
            expected
        );
    }
    harness.registry.close();
}
