//! Black-box coverage of `Session::subscribe`/`binary_subscribe` against a
//! live in-memory container: does the client actually see the right bytes
//! on the wire, not just what `Subscription::rewrite` returns in isolation
//! (that's covered unit-test-side in `subscription.rs`).

mod support;

use support::{split_lines, ListContainer, MemoryStream};
use tio_session::{Session, SessionConfig, SessionError};

#[test]
fn default_window_subscribe_answers_ok_then_forwards_events() {
    let (stream, io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container.clone());

    session.borrow_mut().subscribe(handle, "", -1).unwrap();
    container.push_back("a".into());
    container.push_back("b".into());

    let lines = split_lines(&io.take_outbound());
    assert_eq!(lines[0], "answer ok");
    assert!(lines[1].starts_with(&format!("event {handle} push_back")));
    assert!(lines[2].starts_with(&format!("event {handle} push_back")));
}

#[test]
fn duplicate_subscribe_on_same_handle_is_rejected() {
    let (stream, _io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container);
    session.borrow_mut().subscribe(handle, "", -1).unwrap();
    let err = session.borrow_mut().subscribe(handle, "", -1).unwrap_err();
    assert_eq!(err, SessionError::AlreadySubscribed);
}

#[test]
fn subscribe_on_unknown_handle_is_rejected() {
    let (stream, _io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let err = session.borrow_mut().subscribe(999, "", -1).unwrap_err();
    assert_eq!(err, SessionError::InvalidHandle(999));
}

#[test]
fn sliced_window_drops_events_outside_range() {
    let (stream, io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container.clone());
    for v in ["a", "b", "c"] {
        container.push_back(v.into());
    }
    session.borrow_mut().subscribe(handle, "", 1).unwrap();
    io.take_outbound(); // discard the snapshot-free `answer ok`

    // push_back lands at index 3, outside the [0,1] window -> dropped.
    container.push_back("d".into());
    assert!(io.take_outbound().is_empty());
}

#[test]
fn sliced_window_forwards_events_inside_range() {
    let (stream, io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container.clone());
    session.borrow_mut().subscribe(handle, "", 1).unwrap();
    io.take_outbound();

    container.push_back("a".into()); // index 0, inside [0,1]
    let lines = split_lines(&io.take_outbound());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(&format!("event {handle} push_back")));
}

#[test]
fn unsubscribe_then_resubscribe_is_allowed() {
    let (stream, _io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container);
    session.borrow_mut().subscribe(handle, "", -1).unwrap();
    session.borrow_mut().unsubscribe(handle).unwrap();
    session.borrow_mut().subscribe(handle, "", -1).unwrap();
}

#[test]
fn shutdown_invalidates_the_session_and_stops_forwarding_events() {
    let (stream, io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container.clone());
    session.borrow_mut().subscribe(handle, "", -1).unwrap();
    io.take_outbound();

    session.borrow_mut().shutdown();
    assert!(!session.borrow().is_valid());

    // unsubscribe_all already dropped the container subscription, so this
    // mutation reaches no callback at all; nothing should appear on the wire.
    container.push_back("late".into());
    assert!(io.take_outbound().is_empty());
}

#[test]
fn binary_subscribe_answers_before_container_subscribe_completes() {
    // Preserves the original's out-of-order quirk: a container whose
    // `subscribe` call itself fails still leaves the client having already
    // received `answer ok`, and the subscription entry is rolled back.
    let (stream, io) = MemoryStream::pair();
    let session = Session::new(stream, SessionConfig::default());
    let container = ListContainer::new();
    let handle = session.borrow_mut().register_container("mylist", container);

    session.borrow_mut().binary_subscribe(handle, "", -1).unwrap();
    let outbound = io.take_outbound();
    assert!(!outbound.is_empty(), "binary answer ok must have been sent");
}
