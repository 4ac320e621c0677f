use super::*;

#[test]
fn basic_insert_and_pop_works() {
    let queue = TaskQueue::new();
    assert!(queue.is_empty());

    for (task, priority) in [(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)] {
        queue.push_with_priority(task, priority);
    }
    assert!(!queue.is_empty());

    for expected in [5, 4, 3, 2, 1] {
        assert_eq!(queue.pop().unwrap().0, expected);
    }
    assert!(queue.is_empty());
}

#[test]
fn clear_works() {
    let queue = TaskQueue::new();
    queue.push_with_priority(1, 1);
    assert!(!queue.is_empty());

    queue.clear();
    assert!(queue.is_empty());
    assert!(queue.pop().is_none());
}

#[test]
fn second_last_task_is_higher_priority() {
    let queue = TaskQueue::new();
    queue.push_with_priority(1, 1);
    queue.push_with_priority(2, 2);
    queue.push_with_priority(3, 3);
    queue.push_with_priority(4, 5);
    queue.push_with_priority(5, 4);

    assert_eq!(queue.pop().unwrap().0, 4);
    assert_eq!(queue.pop().unwrap().0, 5);
    assert_eq!(queue.pop().unwrap().0, 3);
    assert_eq!(queue.pop().unwrap().0, 2);
    assert_eq!(queue.pop().unwrap().0, 1);
    assert!(queue.pop().is_none());
}

#[test]
fn priorities_order_pops() {
    let queue = TaskQueue::new();
    queue.push_with_priority(1, 1);
    queue.push_with_priority(2, 15);
    queue.push_with_priority(3, 2);
    queue.push_with_priority(4, 4);
    queue.push_with_priority(5, 3);

    assert_eq!(queue.pop().unwrap().0, 2);
    assert_eq!(queue.pop().unwrap().0, 4);
    assert_eq!(queue.pop().unwrap().0, 5);
    assert_eq!(queue.pop().unwrap().0, 3);
    assert_eq!(queue.pop().unwrap().0, 1);
}

#[test]
fn priorities_can_change_while_queued() {
    let queue = TaskQueue::new();
    let first = queue.push_with_priority(1, 1);
    queue.push_with_priority(2, 2);
    let third = queue.push_with_priority(3, 3);
    queue.push_with_priority(4, 4);
    queue.push_with_priority(5, 5);

    assert_eq!(queue.pop().unwrap().0, 5);

    third.set_priority(8);
    assert_eq!(queue.pop().unwrap().0, 3);
    assert_eq!(queue.pop().unwrap().0, 4);

    first.set_priority(19);
    assert_eq!(queue.pop().unwrap().0, 1);
    assert_eq!(queue.pop().unwrap().0, 2);
}

#[test]
fn same_priority_tasks_come_out_in_insertion_order() {
    let queue = TaskQueue::new();
    queue.push_with_priority(1, 1);
    queue.push_with_priority(2, 2);
    queue.push_with_priority(3, 2);
    queue.push_with_priority(4, 2);
    queue.push_with_priority(5, 3);

    assert_eq!(queue.pop().unwrap().0, 5);
    assert_eq!(queue.pop().unwrap().0, 2);
    assert_eq!(queue.pop().unwrap().0, 3);
    assert_eq!(queue.pop().unwrap().0, 4);
    assert_eq!(queue.pop().unwrap().0, 1);
}

#[test]
fn bumped_task_surfaces_within_window() {
    let queue = TaskQueue::new();
    let mut handles = Vec::new();
    for i in 0..12 {
        handles.push(queue.push_with_priority(i, 10));
    }

    // Bump the oldest task far above everything else.
    handles[0].bump();
    handles[0].set_priority(i64::MAX);

    let mut seen = Vec::new();
    for _ in 0..=PARTIAL_SORT_WINDOW {
        if let Some((task, _)) = queue.pop() {
            seen.push(task);
        }
    }
    assert!(seen.contains(&0), "bumped task not popped within window: {seen:?}");
}

#[test]
fn handle_done_flag() {
    let queue = TaskQueue::new();
    let handle = queue.push_with_priority(7, 1);
    assert!(!handle.is_done());

    let (_, popped) = queue.pop().unwrap();
    popped.mark_done();
    assert!(handle.is_done());
}
