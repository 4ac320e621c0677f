use std::sync::Arc;

use super::*;

#[test]
fn resolve_returns_same_instance_while_alive() {
    let table: SingleLoad<String> = SingleLoad::new();

    let first = table.resolve(1, || Arc::new("one".to_string()));
    let second = table.resolve(1, || Arc::new("other".to_string()));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*second, "one");
}

#[test]
fn expired_entries_are_replaced() {
    let table: SingleLoad<String> = SingleLoad::new();

    let first = table.resolve(1, || Arc::new("one".to_string()));
    drop(first);

    let second = table.resolve(1, || Arc::new("two".to_string()));
    assert_eq!(*second, "two");
}

#[test]
fn get_if_loaded_only_returns_live_entries() {
    let table: SingleLoad<String> = SingleLoad::new();
    assert!(table.get_if_loaded(1).is_none());

    let held = table.resolve(1, || Arc::new("one".to_string()));
    assert!(table.get_if_loaded(1).is_some());

    drop(held);
    assert!(table.get_if_loaded(1).is_none());
}

#[test]
fn purge_drops_expired_entries() {
    let table: SingleLoad<String> = SingleLoad::new();

    let held = table.resolve(1, || Arc::new("held".to_string()));
    let dropped = table.resolve(2, || Arc::new("dropped".to_string()));
    drop(dropped);

    table.purge();
    assert_eq!(table.live_count(), 1);
    assert!(table.get_if_loaded(1).is_some());
    drop(held);
}

#[test]
fn remove_forgets_an_id() {
    let table: SingleLoad<String> = SingleLoad::new();
    let held = table.resolve(1, || Arc::new("held".to_string()));

    table.remove(1);
    assert!(table.get_if_loaded(1).is_none());

    // The old Arc stays usable, it is just no longer handed out.
    assert_eq!(*held, "held");
}
