//! Tests for `src/messaging/contacts.rs`.

use bulksend::messaging::contacts::{ContactQueue, ContactRow, MAX_DESTINATIONS};

#[test]
fn queue_renormalizes_hand_built_rows() {
    let mut raw = ContactRow::new(0, "A", "1", ["111"], "hi");
    raw.destinations = vec![
        "111".to_owned(),
        "111".to_owned(),
        " ".to_owned(),
        "222".to_owned(),
        "333".to_owned(),
        "444".to_owned(),
    ];
    let queue = ContactQueue::new(vec![raw]);
    assert_eq!(queue.rows()[0].destinations, vec!["111", "222", "333"]);
    assert_eq!(queue.rows()[0].destinations.len(), MAX_DESTINATIONS);
}

#[test]
fn queue_walks_rows_in_order() {
    let mut queue = ContactQueue::new(vec![
        ContactRow::new(0, "A", "1", ["111"], "hi"),
        ContactRow::new(1, "B", "2", ["222"], "hi"),
    ]);
    assert_eq!(queue.current().map(|r| r.index), Some(0));
    assert_eq!(queue.remaining(), 2);

    queue.advance();
    assert_eq!(queue.current().map(|r| r.index), Some(1));
    assert!(!queue.is_exhausted());

    queue.advance();
    assert!(queue.current().is_none());
    assert!(queue.is_exhausted());
}

#[test]
fn empty_queue_is_exhausted() {
    let queue = ContactQueue::new(Vec::new());
    assert!(queue.is_empty());
    assert!(queue.is_exhausted());
    assert_eq!(queue.remaining(), 0);
}
