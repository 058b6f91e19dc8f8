//! 队列单元测试
//! Queue unit tests

use super::*;
use std::sync::Arc;
use std::thread;

#[test]
fn test_get_on_empty_queue() {
    let queue: DoubleBufferQueue<u32> = DoubleBufferQueue::new();
    let mut out = Vec::new();
    assert_eq!(queue.get(&mut out, 16), (0, 0));
    assert!(out.is_empty());
    assert!(queue.get_one().is_none());
}

#[test]
fn test_get_reports_remainder() {
    let queue = DoubleBufferQueue::new();
    for i in 0..10 {
        queue.push(i);
    }

    let mut out = Vec::new();
    // The first get swaps all ten items onto the read side.
    assert_eq!(queue.get(&mut out, 4), (4, 6));
    assert_eq!(out, vec![0, 1, 2, 3]);

    // Items pushed now land on the write side and wait for the next swap.
    queue.push(10);
    assert_eq!(queue.get(&mut out, 100), (6, 0));
    assert_eq!(queue.get(&mut out, 100), (1, 0));
    assert_eq!(out, (0..=10).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn test_get_one_and_len() {
    let queue = DoubleBufferQueue::new();
    queue.push("a");
    queue.push("b");
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.get_one(), Some("a"));
    assert!(!queue.is_read_empty());
    assert_eq!(queue.get_one(), Some("b"));
    assert!(queue.is_read_empty());
    assert_eq!(queue.get_one(), None);
}

#[test]
fn test_per_producer_fifo() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 5_000;

    let queue = Arc::new(DoubleBufferQueue::new());
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.push((p, seq));
                }
            })
        })
        .collect();

    let mut next_expected = [0usize; PRODUCERS];
    let mut received = 0;
    let mut buf = Vec::with_capacity(64);
    while received < PRODUCERS * PER_PRODUCER {
        buf.clear();
        let (read, _) = queue.get(&mut buf, 64);
        if read == 0 {
            thread::yield_now();
            continue;
        }
        for &(p, seq) in &buf {
            assert_eq!(seq, next_expected[p], "producer {} out of order", p);
            next_expected[p] += 1;
        }
        received += read;
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(next_expected.iter().all(|&n| n == PER_PRODUCER));
}

#[test]
fn test_announce_with_pending_work_does_not_block() {
    let (queue, mut wake) = EventQueue::new(8);
    queue.push(1u32);
    assert_eq!(queue.pending(), 1);

    // Work exists: the consumer must not block, and the announcement is claimed.
    assert!(!queue.announce_intent_to_wait());
    assert!(!queue.has_waiter());
    assert_eq!(wake.drain(), 0);

    let mut out = Vec::new();
    assert_eq!(queue.get(&mut out, 8), (1, 0));
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_push_after_announce_sends_one_signal() {
    let (queue, mut wake) = EventQueue::new(8);
    assert!(queue.announce_intent_to_wait());
    assert!(queue.has_waiter());

    queue.push(1u32);
    queue.push(2u32);
    queue.push(3u32);

    // Only the first push claims the announced wait.
    assert!(wake.blocking_recv());
    assert_eq!(wake.drain(), 0);
    assert!(!queue.has_waiter());

    queue.rearm_after_wake();
    assert!(!queue.has_waiter());
}

#[test]
fn test_rearm_after_timeout_balances_counters() {
    let (queue, mut wake) = EventQueue::<u32>::new(8);
    assert!(queue.announce_intent_to_wait());
    // The consumer woke up on its own (timer); nothing was pushed.
    queue.rearm_after_wake();
    assert!(!queue.has_waiter());

    // A later push without an announced wait must not signal.
    queue.push(7);
    assert_eq!(wake.drain(), 0);
}

#[test]
fn test_no_lost_wakeups_under_concurrency() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2_000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let (queue, mut wake) = EventQueue::new(128);
    let queue = Arc::new(queue);

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.push((p, seq));
                    if seq % 97 == 0 {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut received = 0;
    let mut next_expected = [0usize; PRODUCERS];
    let mut buf = Vec::new();
    while received < TOTAL {
        buf.clear();
        let (read, _) = queue.get(&mut buf, 128);
        for &(p, seq) in &buf {
            assert_eq!(seq, next_expected[p]);
            next_expected[p] += 1;
        }
        received += read;
        if read > 0 || received == TOTAL {
            continue;
        }

        if queue.announce_intent_to_wait() {
            // Safe to block: a push is guaranteed to signal us.
            assert!(wake.blocking_recv());
        }
        queue.rearm_after_wake();
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(received, TOTAL);
    assert_eq!(queue.pending(), 0);
}
