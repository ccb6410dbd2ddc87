use std::rc::Rc;

use indexmap::IndexMap;

use crate::{container::Container, data::TioData, error::SessionError, event::EventKind, handle::Handle};

/// Sentinel `start` value a diff mirror subscribes with to suppress the
/// usual initial snapshot: the mirror only cares about mutations from here
/// on, not the source's current contents.
pub const NO_SNAPSHOT_START: &str = "__none__";

struct Diff {
    cookie: u64,
    source: Rc<dyn Container>,
}

/// Live source->destination container mirrors set up on this session.
///
/// Grounded on `MapContainerMirror`: every `set`/`insert`/`delete`/`clear` on
/// the source is replayed onto the destination as it happens. Unlike a live
/// subscription there is no client on the other end — the callback writes
/// straight into another container instead of framing bytes.
#[derive(Default)]
pub struct DiffTable {
    diffs: IndexMap<Handle, Diff>,
}

impl DiffTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, handle: Handle) -> bool {
        self.diffs.contains_key(&handle)
    }

    /// Subscribes to `source` with [`NO_SNAPSHOT_START`] and wires its
    /// mutations into `destination`. The callback holds only a `Weak`
    /// reference to nothing session-specific — it closes over `destination`
    /// directly, so it keeps working even if the session later drops this
    /// `DiffTable` entry without calling `stop` (the container still owns
    /// the strong `Rc<dyn Container>` for `destination` via the closure).
    pub fn start(
        &mut self,
        handle: Handle,
        source: Rc<dyn Container>,
        destination: Rc<dyn Container>,
    ) -> Result<(), SessionError> {
        if self.diffs.contains_key(&handle) {
            return Err(SessionError::AlreadySubscribed);
        }

        let dest = destination;
        let mirror_source = source.clone();
        let cookie = source.subscribe(
            NO_SNAPSHOT_START,
            Box::new(move |kind, key, value, metadata| {
                mirror_event(mirror_source.as_ref(), dest.as_ref(), kind, key, value, metadata)
            }),
        )?;

        self.diffs.insert(handle, Diff { cookie, source });
        Ok(())
    }

    pub fn stop(&mut self, handle: Handle) {
        if let Some(diff) = self.diffs.shift_remove(&handle) {
            diff.source.unsubscribe(diff.cookie);
        }
    }

    pub fn stop_all(&mut self) {
        for (_, diff) in self.diffs.drain(..) {
            diff.source.unsubscribe(diff.cookie);
        }
    }
}

/// Replays one source mutation onto a destination container.
///
/// `set`/`insert` both become a `set` on the destination (an insert has no
/// positional meaning once mirrored into an unordered destination); `delete`
/// and the pop family shrink it the same way. This is the intended reading
/// of the original's mirror callback; the original's literal `if`/`else if`
/// chain conflates `insert` with `push_back` in a way that would silently
/// drop plain inserts on some container types, which this rewrite does not
/// reproduce — see `DESIGN.md`.
///
/// `clear` does not call `destination.clear()`: it queries every record
/// still in `source` and replays it as a `set(key, null, meta="delete")`,
/// matching the original's `MapContainerMirror` exactly (`SPEC_FULL.md`
/// §4.7) — an intentional re-materialization that leaves the destination
/// without meaningful values but preserves one deletion marker per key.
fn mirror_event(source: &dyn Container, destination: &dyn Container, kind: EventKind, key: TioData, value: TioData, metadata: TioData) {
    match kind {
        EventKind::Set | EventKind::Insert | EventKind::PushBack | EventKind::PushFront => {
            destination.set(key, value, metadata);
        }
        EventKind::Delete | EventKind::PopBack | EventKind::PopFront => {
            destination.delete(key, metadata);
        }
        EventKind::Clear => match source.query(0, 0, None) {
            Some(mut cursor) => {
                while let Some((key, _value, _metadata)) = cursor.current() {
                    destination.set(key, TioData::Null, TioData::from("delete"));
                    if !cursor.advance() {
                        break;
                    }
                }
            }
            None => {
                for i in 0..source.record_count() as i64 {
                    if let Some((key, _value, _metadata)) = source.get_record(&TioData::Int(i)) {
                        destination.set(key, TioData::Null, TioData::from("delete"));
                    }
                }
            }
        },
        EventKind::WaitAndPopNext | EventKind::SnapshotEnd => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerKind, EventCallback, PopCallback, ResultCursor};
    use std::cell::RefCell as Cell2;

    struct Recording(Cell2<Vec<(TioData, Option<TioData>)>>);
    impl Container for Recording {
        fn kind(&self) -> ContainerKind {
            ContainerKind::Map
        }
        fn type_name(&self) -> &str {
            "recording"
        }
        fn record_count(&self) -> usize {
            self.0.borrow().len()
        }
        fn get_record(&self, _key: &TioData) -> Option<(TioData, TioData, TioData)> {
            None
        }
        fn query(&self, _s: i64, _c: i64, _q: Option<&TioData>) -> Option<Box<dyn ResultCursor>> {
            None
        }
        fn subscribe(&self, _start: &str, _cb: EventCallback) -> Result<u64, SessionError> {
            Ok(9)
        }
        fn unsubscribe(&self, _cookie: u64) {}
        fn wait_and_pop_next(&self, _cb: PopCallback) -> u64 {
            0
        }
        fn cancel_wait_and_pop_next(&self, _pop_id: u64) {}
        fn set(&self, key: TioData, value: TioData, _metadata: TioData) {
            self.0.borrow_mut().push((key, Some(value)));
        }
        fn delete(&self, key: TioData, _metadata: TioData) {
            self.0.borrow_mut().push((key, None));
        }
        fn clear(&self) {
            self.0.borrow_mut().clear();
        }
    }

    /// A source container with fixed records, exposed only via indexed
    /// `get_record` (no `query` cursor) to exercise the clear-replay fallback.
    struct IndexedSource(Vec<(TioData, TioData, TioData)>);
    impl Container for IndexedSource {
        fn kind(&self) -> ContainerKind {
            ContainerKind::Map
        }
        fn type_name(&self) -> &str {
            "indexed-source"
        }
        fn record_count(&self) -> usize {
            self.0.len()
        }
        fn get_record(&self, key: &TioData) -> Option<(TioData, TioData, TioData)> {
            let i = key.as_int()? as usize;
            self.0.get(i).cloned()
        }
        fn query(&self, _s: i64, _c: i64, _q: Option<&TioData>) -> Option<Box<dyn ResultCursor>> {
            None
        }
        fn subscribe(&self, _start: &str, _cb: EventCallback) -> Result<u64, SessionError> {
            Ok(9)
        }
        fn unsubscribe(&self, _cookie: u64) {}
        fn wait_and_pop_next(&self, _cb: PopCallback) -> u64 {
            0
        }
        fn cancel_wait_and_pop_next(&self, _pop_id: u64) {}
        fn set(&self, _key: TioData, _value: TioData, _metadata: TioData) {}
        fn delete(&self, _key: TioData, _metadata: TioData) {}
        fn clear(&self) {}
    }

    #[test]
    fn mirror_event_routes_set_and_delete() {
        let source = Recording(Cell2::new(Vec::new()));
        let dest = Recording(Cell2::new(Vec::new()));
        mirror_event(&source, &dest, EventKind::Set, TioData::from("k"), TioData::from("v"), TioData::Null);
        mirror_event(&source, &dest, EventKind::Delete, TioData::from("k"), TioData::Null, TioData::Null);
        let log = dest.0.borrow();
        assert_eq!(log[0], (TioData::from("k"), Some(TioData::from("v"))));
        assert_eq!(log[1], (TioData::from("k"), None));
    }

    #[test]
    fn mirror_event_clear_replays_delete_marker_per_source_record() {
        let source = IndexedSource(vec![
            (TioData::Int(0), TioData::from("a"), TioData::Null),
            (TioData::Int(1), TioData::from("b"), TioData::Null),
        ]);
        let dest = Recording(Cell2::new(Vec::new()));
        mirror_event(&source, &dest, EventKind::Clear, TioData::Null, TioData::Null, TioData::Null);
        let log = dest.0.borrow();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, v)| *v == Some(TioData::Null)));
    }

    #[test]
    fn duplicate_diff_on_same_handle_rejected() {
        let mut diffs = DiffTable::new();
        let source: Rc<dyn Container> = Rc::new(Recording(Cell2::new(Vec::new())));
        let dest: Rc<dyn Container> = Rc::new(Recording(Cell2::new(Vec::new())));
        diffs.start(1, source.clone(), dest.clone()).unwrap();
        assert_eq!(diffs.start(1, source, dest), Err(SessionError::AlreadySubscribed));
    }
}
