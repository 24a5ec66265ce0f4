//! Multi-threaded scenarios (spec.md §8 scenarios 4-6), scaled down from the
//! literal 10^6 counts so the default `cargo test` run finishes quickly. A
//! `#[ignore]`'d test reproduces the literal scale for manual runs.

use std::collections::HashSet;
use std::thread;

use taskdeque::{TaskDeque, TaskHandle};

fn h(n: usize) -> TaskHandle {
    TaskHandle::new(n).unwrap()
}

fn drain_front(deque: &TaskDeque<16>) -> Vec<usize> {
    let mut out = Vec::new();
    while let Some(t) = deque.pop_front() {
        out.push(t.get());
    }
    out
}

/// Scenario 4: one producer pushing to the back, one consumer popping from
/// the front; the popped handles plus the final drain equal the full range.
fn two_thread_symmetric(count: usize) {
    let deque: TaskDeque<16> = TaskDeque::new();
    let mut popped = Vec::new();

    thread::scope(|s| {
        let producer = s.spawn(|| {
            for i in 0..count {
                loop {
                    if deque.push_back(h(i + 1)).is_ok() {
                        break;
                    }
                    thread::yield_now();
                }
            }
        });

        let consumer = s.spawn(|| {
            let mut got = Vec::new();
            let mut seen = 0;
            while seen < count {
                if let Some(t) = deque.pop_front() {
                    got.push(t.get());
                    seen += 1;
                } else {
                    thread::yield_now();
                }
            }
            got
        });

        producer.join().unwrap();
        popped = consumer.join().unwrap();
    });

    let remainder = drain_front(&deque);
    assert!(remainder.is_empty(), "producer/consumer fully drained by construction");

    let mut all: Vec<usize> = popped;
    all.sort_unstable();
    let expected: Vec<usize> = (1..=count).collect();
    assert_eq!(all, expected);
}

#[test]
fn scenario_4_two_thread_symmetric_small() {
    two_thread_symmetric(2_000);
}

#[test]
#[ignore = "reproduces spec.md's literal 10^3 push/pop scale; run with --ignored"]
fn scenario_4_two_thread_symmetric_full_scale() {
    two_thread_symmetric(1_000_000);
}

/// Scenario 5: two threads work the front, two work the back, on a
/// capacity-16 deque; after a quiescent drain, all popped values plus the
/// drain equal all pushed values.
fn opposite_ends_contention(ops_per_thread: usize) {
    let deque: TaskDeque<16> = TaskDeque::new();
    let mut next_id = std::sync::atomic::AtomicUsize::new(1);
    let popped = std::sync::Mutex::new(Vec::new());
    let pushed = std::sync::Mutex::new(Vec::new());

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                for _ in 0..ops_per_thread {
                    let id = next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    loop {
                        if deque.push_front(h(id)).is_ok() {
                            pushed.lock().unwrap().push(id);
                            break;
                        }
                        if let Some(t) = deque.pop_front() {
                            popped.lock().unwrap().push(t.get());
                        }
                    }
                }
            });
        }
        for _ in 0..2 {
            s.spawn(|| {
                for _ in 0..ops_per_thread {
                    let id = next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    loop {
                        if deque.push_back(h(id)).is_ok() {
                            pushed.lock().unwrap().push(id);
                            break;
                        }
                        if let Some(t) = deque.pop_back() {
                            popped.lock().unwrap().push(t.get());
                        }
                    }
                }
            });
        }
    });

    let mut popped = popped.into_inner().unwrap();
    let pushed = pushed.into_inner().unwrap();
    popped.extend(drain_front(&deque));

    let pushed_set: HashSet<usize> = pushed.into_iter().collect();
    let popped_set: HashSet<usize> = popped.into_iter().collect();
    assert_eq!(pushed_set, popped_set, "every pushed handle must be popped exactly once");
}

#[test]
fn scenario_5_opposite_ends_contention_small() {
    opposite_ends_contention(2_000);
}

#[test]
#[ignore = "reproduces spec.md's literal 10^4-per-thread scale; run with --ignored"]
fn scenario_5_opposite_ends_contention_full_scale() {
    opposite_ends_contention(10_000);
}

/// Scenario 6: one thread oscillates push_back/pop_back, another oscillates
/// push_front/pop_front, on a capacity-4 deque. Neither should ever observe
/// a handle it did not itself push (no cross-contamination between threads
/// that never push anything the other could pop).
fn full_empty_oscillation(iterations: usize) {
    let deque: TaskDeque<4> = TaskDeque::new();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..iterations {
                let handle = h((i % 1000) + 1);
                while deque.push_back(handle).is_err() {
                    thread::yield_now();
                }
                loop {
                    if let Some(popped) = deque.pop_back() {
                        // Another thread only ever touches front slots, so
                        // whatever we pop back must be a back-pushed value
                        // from *some* thread in {1..=1000}.
                        assert!(popped.get() >= 1 && popped.get() <= 1000);
                        break;
                    }
                    thread::yield_now();
                }
            }
        });

        s.spawn(|| {
            for i in 0..iterations {
                let handle = h((i % 1000) + 1);
                while deque.push_front(handle).is_err() {
                    thread::yield_now();
                }
                loop {
                    if let Some(popped) = deque.pop_front() {
                        assert!(popped.get() >= 1 && popped.get() <= 1000);
                        break;
                    }
                    thread::yield_now();
                }
            }
        });
    });

    assert_eq!(deque.pop_front(), None);
    assert_eq!(deque.pop_back(), None);
}

#[test]
fn scenario_6_full_empty_oscillation_small() {
    full_empty_oscillation(5_000);
}

#[test]
#[ignore = "reproduces spec.md's literal 10^6 scale; run with --ignored"]
fn scenario_6_full_empty_oscillation_full_scale() {
    full_empty_oscillation(1_000_000);
}
