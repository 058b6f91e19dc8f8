//! 分层定时器单元测试
//! Hierarchical timer unit tests

use super::entry::{pack, unpack};
use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

fn drain<H>(manager: &mut TimerManager<H>, now: u64) -> Vec<Expired<H>> {
    let mut fired = Vec::new();
    manager.execute(now, usize::MAX, |expired| fired.push(expired));
    fired
}

#[test]
fn test_timer_fires_at_due_tick_not_before() {
    let mut manager = TimerManager::new(1_000);
    let id = manager.add_timer(1_000, 50, "hello");
    assert_ne!(id, 0);
    assert_eq!(manager.len(), 1);

    assert!(drain(&mut manager, 1_049).is_empty());
    let fired = drain(&mut manager, 1_050);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, id);
    assert_eq!(fired[0].due_tick, 1_050);
    assert_eq!(fired[0].payload, "hello");
    assert!(manager.is_empty());
}

#[test]
fn test_zero_delay_fires_on_next_poll() {
    let mut manager = TimerManager::new(0);
    manager.add_timer(0, 0, 1u32);
    assert_eq!(manager.next_wake_delay(0), Some(0));
    assert_eq!(drain(&mut manager, 0).len(), 1);
}

#[test]
fn test_zero_delay_after_tick_already_processed() {
    let mut manager = TimerManager::new(0);
    let keep_alive = manager.add_timer(0, 10_000, 0u32);
    assert!(drain(&mut manager, 100).is_empty());
    assert_eq!(manager.current_tick(), 101);

    // Tick 100 has been processed already; the timer must still fire promptly.
    let late = manager.add_timer(100, 0, 1u32);
    assert_eq!(manager.stats().overdue_timers, 1);
    assert_eq!(manager.next_wake_delay(100), Some(0));

    let fired = drain(&mut manager, 100);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, late);
    assert!(manager.delete_timer(keep_alive));
}

#[test]
fn test_cancelled_timer_never_fires() {
    let mut manager = TimerManager::new(0);
    let a = manager.add_timer(0, 300, 'a');
    let b = manager.add_timer(0, 300, 'b');
    let c = manager.add_timer(0, 70_000, 'c');

    assert!(manager.delete_timer(a));
    assert!(!manager.delete_timer(a), "second cancel must fail");
    assert!(manager.delete_timer(c));
    assert_eq!(manager.len(), 1);

    let fired = drain(&mut manager, 100_000);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, b);
    assert!(!manager.delete_timer(b), "fired timer cannot be cancelled");

    let stats = manager.stats();
    assert_eq!(stats.fired_timers, 1);
    assert_eq!(stats.cancelled_timers, 2);
}

#[test]
fn test_delete_unknown_handles() {
    let mut manager: TimerManager<()> = TimerManager::new(0);
    assert!(!manager.delete_timer(0));
    assert!(!manager.delete_timer(pack(12_345, 7)));
}

#[test]
fn test_cancel_after_cascade() {
    let mut manager = TimerManager::new(0);
    // Starts on level 2 and moves down through level 1 and level 0.
    let id = manager.add_timer(0, 100_000, ());
    assert_eq!(manager.stats().level_timers[2], 1);

    assert!(drain(&mut manager, 99_990).is_empty());
    assert_eq!(manager.stats().level_timers[0], 1);
    assert!(manager.delete_timer(id));
    assert!(drain(&mut manager, 200_000).is_empty());
}

#[test]
fn test_running_timer_self_cancel_is_noop() {
    let mut manager = TimerManager::new(0);
    let id = manager.add_timer(0, 5, ());
    let other = manager.add_timer(0, 5, ());

    let expired = manager.poll_expired(5).expect("timer should be due");
    assert_eq!(expired.id, id);
    assert_eq!(manager.running(), Some(id));
    assert!(manager.delete_timer(id));
    assert_eq!(manager.len(), 1, "self-cancel must not touch other timers");
    manager.finish_running();

    assert_eq!(manager.running(), None);
    assert!(!manager.delete_timer(id));
    assert!(manager.delete_timer(other));
}

#[test]
fn test_execute_respects_max_count() {
    let mut manager = TimerManager::new(0);
    for i in 0..10 {
        manager.add_timer(0, 1, i);
    }
    let mut seen = Vec::new();
    assert_eq!(manager.execute(1, 4, |e| seen.push(e.payload)), 4);
    assert_eq!(seen, vec![0, 1, 2, 3]);
    assert_eq!(manager.execute(1, 100, |e| seen.push(e.payload)), 6);
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_next_wake_delay() {
    let mut manager = TimerManager::new(0);
    assert_eq!(manager.next_wake_delay(0), None);

    manager.add_timer(0, 40, ());
    assert_eq!(manager.next_wake_delay(0), Some(40));
    assert_eq!(manager.next_wake_delay(30), Some(10));
    assert_eq!(manager.next_wake_delay(45), Some(0));

    // A far timer only needs a wake at the finest level's wrap boundary.
    let mut far = TimerManager::new(0);
    far.add_timer(0, 10_000, ());
    assert_eq!(far.next_wake_delay(0), Some(256));
}

#[test]
fn test_handle_packing() {
    let id = pack(0x12_3456_789A, 0x00AB_CDEF);
    assert_eq!(unpack(id), (0x12_3456_789A, 0x00AB_CDEF));
    assert_eq!(unpack(pack(1, 1)), (1, 1));
}

#[test]
fn test_handles_are_unique_for_same_due_tick() {
    let mut manager = TimerManager::new(0);
    let ids: Vec<_> = (0..1000).map(|_| manager.add_timer(0, 10, ())).collect();
    let mut dedup = ids.clone();
    dedup.sort_unstable();
    dedup.dedup();
    assert_eq!(dedup.len(), ids.len());
    assert!(ids.iter().all(|&id| id != 0));
}

#[test]
fn test_nodes_are_reused() {
    let mut manager = TimerManager::new(0);
    for round in 0..5u64 {
        let now = round * 10;
        for _ in 0..8 {
            manager.add_timer(now, 1, ());
        }
        assert_eq!(drain(&mut manager, now + 1).len(), 8);
    }
    assert_eq!(manager.allocated_nodes(), 8);
    assert_eq!(manager.stats().pooled_nodes, 8);
}

#[test]
fn test_delay_is_clamped_to_max() {
    let mut manager = TimerManager::with_max_delay(0, 1_000);
    let id = manager.add_timer(0, 5_000_000, ());
    assert_eq!(unpack(id).0, 1_000);
    assert_eq!(drain(&mut manager, 1_000).len(), 1);

    let mut manager = TimerManager::new(0);
    let id = manager.add_timer(0, u64::MAX, ());
    assert!(unpack(id).0 <= MAX_DELAY_MS + (1 << 32));
}

#[test]
fn test_idle_manager_realigns_to_now() {
    let mut manager = TimerManager::new(0);
    manager.add_timer(0, 1, ());
    assert_eq!(drain(&mut manager, 1).len(), 1);

    // Much later, with nothing pending, a new timer starts from the new time.
    let now = 30 * DAY_MS;
    manager.add_timer(now, 3, ());
    assert_eq!(manager.current_tick(), now);
    assert!(drain(&mut manager, now + 2).is_empty());
    assert_eq!(drain(&mut manager, now + 3).len(), 1);
}

#[test]
fn test_random_timers_fire_once_in_order() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut manager = TimerManager::new(0);

    let mut dues = Vec::with_capacity(10_000);
    for i in 0..10_000usize {
        let delay = rng.random_range(1..=10 * DAY_MS);
        manager.add_timer(0, delay, i);
        dues.push(delay);
    }
    let mut sorted = dues.clone();
    sorted.sort_unstable();

    let mut fired_count = vec![0u32; dues.len()];
    let mut total = 0usize;
    let mut last_due = 0;
    let mut now = 0;
    while now <= 10 * DAY_MS {
        now += rng.random_range(1..=6 * 60 * 60 * 1000);
        for expired in drain(&mut manager, now) {
            assert!(expired.due_tick <= now, "fired before its due tick");
            assert_eq!(expired.due_tick, dues[expired.payload]);
            assert!(expired.due_tick >= last_due, "fired out of order");
            last_due = expired.due_tick;
            fired_count[expired.payload] += 1;
            total += 1;
        }
        // Everything due by now has fired, nothing later has.
        assert_eq!(total, sorted.partition_point(|&d| d <= now));
    }

    assert!(fired_count.iter().all(|&n| n == 1));
    assert!(manager.is_empty());
}
