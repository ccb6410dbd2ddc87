//! Shared test support: an in-memory duplex stream standing in for a socket,
//! and a minimal in-memory `Container` (list-flavored) standing in for the
//! container registry, which is out of scope for this crate. Neither is the
//! deliverable — they only exist to black-box test the session state
//! machines end to end.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use tio_session::{Container, ContainerKind, Event, EventCallback, EventKind, PopCallback, ResultCursor, SessionError, TioData};

/// A non-blocking in-memory socket stand-in: `Read` drains a queue fed by the
/// test, returning `WouldBlock` once empty rather than `Ok(0)` (which this
/// crate's `Session` treats as the peer hanging up).
///
/// Backed by `Rc<RefCell<_>>` buffers so a test can keep a [`MemoryStreamHandle`]
/// after the `MemoryStream` itself has been moved into a `Session`.
pub struct MemoryStream {
    inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<Vec<u8>>>,
}

/// The test-side handle retained alongside a `MemoryStream` moved into a
/// `Session`: feeds inbound bytes and inspects what the session wrote out.
pub struct MemoryStreamHandle {
    inbound: Rc<RefCell<VecDeque<u8>>>,
    outbound: Rc<RefCell<Vec<u8>>>,
}

impl MemoryStreamHandle {
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.borrow_mut().extend(bytes);
    }

    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.outbound.borrow_mut())
    }
}

impl MemoryStream {
    pub fn pair() -> (Self, MemoryStreamHandle) {
        let inbound = Rc::new(RefCell::new(VecDeque::new()));
        let outbound = Rc::new(RefCell::new(Vec::new()));
        let stream = Self { inbound: inbound.clone(), outbound: outbound.clone() };
        let handle = MemoryStreamHandle { inbound, outbound };
        (stream, handle)
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.borrow_mut();
        if inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no data queued"));
        }
        let n = buf.len().min(inbound.len());
        for slot in &mut buf[..n] {
            *slot = inbound.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A writer that accepts at most `cap` bytes total, then reports
/// `WouldBlock` forever — used to exercise backpressure and the hard cap.
pub struct BlockingAfter {
    pub cap: usize,
    pub written: usize,
}

impl Write for BlockingAfter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.cap {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "full"));
        }
        let n = buf.len().min(self.cap - self.written);
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for BlockingAfter {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
    }
}

/// An ordered, list-flavored reference container: `push_back`/`set`/`delete`
/// etc. notify every live subscriber synchronously, matching the in-line
/// callback contract `container::Container` documents.
#[derive(Default)]
pub struct ListContainer {
    records: RefCell<Vec<(TioData, TioData, TioData)>>,
    subscribers: RefCell<Vec<(u64, EventCallback)>>,
    next_cookie: RefCell<u64>,
}

impl ListContainer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn notify(&self, kind: EventKind, key: TioData, value: TioData, metadata: TioData) {
        for (_, cb) in self.subscribers.borrow_mut().iter_mut() {
            cb(kind, key.clone(), value.clone(), metadata.clone());
        }
    }

    pub fn push_back(&self, value: TioData) {
        let idx = self.records.borrow().len() as i64;
        self.records.borrow_mut().push((TioData::Int(idx), value.clone(), TioData::Null));
        self.notify(EventKind::PushBack, TioData::Int(idx), value, TioData::Null);
    }

    pub fn delete_at(&self, index: i64) {
        let i = index as usize;
        if i < self.records.borrow().len() {
            self.records.borrow_mut().remove(i);
        }
        self.notify(EventKind::Delete, TioData::Int(index), TioData::Null, TioData::Null);
    }

    pub fn insert_at(&self, index: i64, value: TioData) {
        let i = index as usize;
        if i <= self.records.borrow().len() {
            self.records.borrow_mut().insert(i, (TioData::Int(index), value.clone(), TioData::Null));
        }
        self.notify(EventKind::Insert, TioData::Int(index), value, TioData::Null);
    }
}

impl Container for ListContainer {
    fn kind(&self) -> ContainerKind {
        ContainerKind::List
    }

    fn type_name(&self) -> &str {
        "list"
    }

    fn record_count(&self) -> usize {
        self.records.borrow().len()
    }

    fn get_record(&self, key: &TioData) -> Option<(TioData, TioData, TioData)> {
        let i = key.as_int()? as usize;
        self.records.borrow().get(i).cloned()
    }

    fn query(&self, _start: i64, _count: i64, _query: Option<&TioData>) -> Option<Box<dyn ResultCursor>> {
        None
    }

    fn subscribe(&self, _start: &str, callback: EventCallback) -> Result<u64, SessionError> {
        let mut next = self.next_cookie.borrow_mut();
        *next += 1;
        let cookie = *next;
        self.subscribers.borrow_mut().push((cookie, callback));
        Ok(cookie)
    }

    fn unsubscribe(&self, cookie: u64) {
        self.subscribers.borrow_mut().retain(|(c, _)| *c != cookie);
    }

    fn wait_and_pop_next(&self, callback: PopCallback) -> u64 {
        if self.records.borrow().is_empty() {
            return 0;
        }
        let (key, value, metadata) = self.records.borrow_mut().remove(0);
        callback(EventKind::WaitAndPopNext, key, value, metadata);
        1
    }

    fn cancel_wait_and_pop_next(&self, _pop_id: u64) {}

    fn set(&self, key: TioData, value: TioData, metadata: TioData) {
        let Some(i) = key.as_int() else { return };
        let i = i as usize;
        let mut records = self.records.borrow_mut();
        if i < records.len() {
            records[i] = (key.clone(), value.clone(), metadata.clone());
        } else {
            records.push((key.clone(), value.clone(), metadata.clone()));
        }
        drop(records);
        self.notify(EventKind::Set, key, value, metadata);
    }

    fn delete(&self, key: TioData, metadata: TioData) {
        if let Some(i) = key.as_int() {
            let i = i as usize;
            if i < self.records.borrow().len() {
                self.records.borrow_mut().remove(i);
            }
        }
        self.notify(EventKind::Delete, key, TioData::Null, metadata);
    }

    fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

/// Parses an outbound byte buffer as a sequence of text-wire lines, useful
/// for asserting on the overall shape of what a session sent without
/// hand-indexing offsets.
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .split("\r\n")
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[allow(dead_code)]
pub fn event(kind: EventKind, key: TioData, value: TioData, metadata: TioData) -> Event {
    Event::new(kind, key, value, metadata)
}
