//! Single-threaded correctness (spec.md §8 P1, P2, P6; scenarios 1-3).

use taskdeque::{PushError, TaskDeque, TaskHandle};

fn h(n: usize) -> TaskHandle {
    TaskHandle::new(n).unwrap()
}

#[test]
fn scenario_1_sequential_round_trip() {
    let deque: TaskDeque<4> = TaskDeque::new();
    deque.push_back(h(1)).unwrap();
    deque.push_back(h(2)).unwrap();
    deque.push_front(h(3)).unwrap();

    assert_eq!(deque.pop_front(), Some(h(3)));
    assert_eq!(deque.pop_back(), Some(h(2)));
    assert_eq!(deque.pop_back(), Some(h(1)));
    assert_eq!(deque.pop_back(), None);
}

#[test]
fn scenario_2_fill_then_overflow() {
    let deque: TaskDeque<4> = TaskDeque::new();
    for i in 1..=4 {
        assert!(deque.push_back(h(i)).is_ok());
    }
    assert_eq!(deque.push_back(h(5)), Err(PushError::Full));
}

#[test]
fn scenario_3_wrap_around() {
    let deque: TaskDeque<4> = TaskDeque::new();
    for i in 1..=4 {
        deque.push_back(h(i)).unwrap();
    }
    assert_eq!(deque.pop_front(), Some(h(1)));
    assert_eq!(deque.pop_front(), Some(h(2)));
    assert!(deque.push_back(h(5)).is_ok());
    assert!(deque.push_back(h(6)).is_ok());
    assert_eq!(deque.pop_front(), Some(h(3)));
}

// P1: the deque behaves as a double-ended queue of bounded capacity N, for
// any single-threaded sequence of pushes/pops.
#[test]
fn p1_push_front_pop_back_is_fifo_from_one_end() {
    let deque: TaskDeque<64> = TaskDeque::new();
    for i in 1..=20 {
        deque.push_front(h(i)).unwrap();
    }
    for i in 1..=20 {
        assert_eq!(deque.pop_back(), Some(h(i)));
    }
    assert_eq!(deque.pop_back(), None);
}

#[test]
fn p1_push_back_pop_front_is_fifo() {
    let deque: TaskDeque<64> = TaskDeque::new();
    for i in 1..=20 {
        deque.push_back(h(i)).unwrap();
    }
    for i in 1..=20 {
        assert_eq!(deque.pop_front(), Some(h(i)));
    }
    assert_eq!(deque.pop_front(), None);
}

#[test]
fn p1_push_back_pop_back_is_lifo() {
    let deque: TaskDeque<64> = TaskDeque::new();
    for i in 1..=20 {
        deque.push_back(h(i)).unwrap();
    }
    for i in (1..=20).rev() {
        assert_eq!(deque.pop_back(), Some(h(i)));
    }
}

// P2: after N successful pushes without an intervening pop, the next push
// is Full; pops never exceed pushes.
#[test]
fn p2_full_after_capacity_pushes() {
    let deque: TaskDeque<64> = TaskDeque::new();
    for i in 1..=64 {
        assert!(deque.push_back(h(i)).is_ok());
    }
    assert_eq!(deque.push_back(h(999)), Err(PushError::Full));
    assert_eq!(deque.push_front(h(999)), Err(PushError::Full));
}

#[test]
fn p2_pops_never_exceed_pushes() {
    let deque: TaskDeque<64> = TaskDeque::new();
    let mut pushed = 0;
    let mut popped = 0;
    for i in 0..200 {
        if i % 3 == 0 {
            if deque.push_back(h(i + 1)).is_ok() {
                pushed += 1;
            }
        } else if deque.pop_front().is_some() {
            popped += 1;
        }
        assert!(popped <= pushed);
    }
}

// P6: an operation that fails with Full/Empty leaves every slot's value
// exactly as it was before the attempt.
#[test]
fn p6_failed_push_leaves_deque_contents_intact() {
    let deque: TaskDeque<64> = TaskDeque::new();
    for i in 1..=64 {
        deque.push_back(h(i)).unwrap();
    }
    assert_eq!(deque.push_front(h(999)), Err(PushError::Full));
    for i in 1..=64 {
        assert_eq!(deque.pop_front(), Some(h(i)));
    }
    assert_eq!(deque.pop_front(), None);
}

#[test]
fn p6_failed_pop_on_empty_leaves_deque_empty() {
    let deque: TaskDeque<64> = TaskDeque::new();
    assert_eq!(deque.pop_front(), None);
    assert_eq!(deque.pop_back(), None);
    deque.push_back(h(1)).unwrap();
    assert_eq!(deque.pop_front(), Some(h(1)));
    assert_eq!(deque.pop_front(), None);
}

#[test]
fn capacity_reports_usable_n_not_backing_array_len() {
    let deque: TaskDeque<64> = TaskDeque::new();
    assert_eq!(deque.capacity(), 64);
}
