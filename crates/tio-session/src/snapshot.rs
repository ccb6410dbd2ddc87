use std::rc::Rc;

use indexmap::IndexSet;

use crate::{
    container::{Container, ResultCursor},
    data::TioData,
    event::{Event, EventKind},
    handle::Handle,
};

/// One handle's in-flight snapshot: either a cursor from
/// [`Container::query`] or, when the container has none, a plain indexed walk
/// driven by `get_record`.
enum Cursor {
    ResultSet(Box<dyn ResultCursor>),
    Indexed { container: Rc<dyn Container>, next: u64 },
}

struct PendingSnapshot {
    handle: Handle,
    cursor: Cursor,
    /// The event kind synthesized for each record streamed off this cursor,
    /// matching the original's `info->event_name` — a map's snapshot records
    /// as `set`, a list's as `push_back`.
    event_name: EventKind,
}

/// Tracks handles currently streaming their initial contents before going
/// live. A handle lives here or in the live subscription table, never both.
///
/// Grounded on `SendPendingSnapshots`: each call pumps a bounded number of
/// steps across every pending handle so one slow/huge container can't starve
/// the others sharing this session's write pipeline.
#[derive(Default)]
pub struct SnapshotPump {
    pending: IndexSet<Handle>,
    cursors: Vec<PendingSnapshot>,
}

/// A single step of pumping: either a synthesized event to rewrite and send,
/// or a signal that the given handle's snapshot just finished.
pub enum PumpStep {
    Event { handle: Handle, event: Event },
    Finished { handle: Handle },
}

impl SnapshotPump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, handle: Handle) -> bool {
        self.pending.contains(&handle)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Begins streaming `container`'s contents for `handle`, starting at
    /// `start_index` (used only by the indexed-walk fallback). `event_name`
    /// is the kind synthesized for every record this cursor yields.
    pub fn start(&mut self, handle: Handle, container: Rc<dyn Container>, start_index: u64, query: Option<&TioData>, event_name: EventKind) {
        self.pending.insert(handle);
        let cursor = match container.query(start_index as i64, 0, query) {
            Some(rs) => Cursor::ResultSet(rs),
            None => Cursor::Indexed { container, next: start_index },
        };
        self.cursors.push(PendingSnapshot { handle, cursor, event_name });
    }

    pub fn cancel(&mut self, handle: Handle) {
        self.pending.shift_remove(&handle);
        self.cursors.retain(|p| p.handle != handle);
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
        self.cursors.clear();
    }

    /// Pumps up to `burst` total steps across all pending handles, in
    /// round-robin order, returning the steps produced. A step is either one
    /// record becoming an `Event` (caller still must run it through the
    /// subscription's slice rewrite before sending) or a handle finishing.
    ///
    /// Mirrors `SendPendingSnapshots`'s `for(...) if(iterationCount++ >
    /// MAX_BURST) break;` cooperative loop, generalized to also drive the
    /// `ITioResultSet` cursor path.
    pub fn pump(&mut self, burst: usize) -> Vec<PumpStep> {
        let mut steps = Vec::new();
        let mut finished = Vec::new();

        'outer: for entry in &mut self.cursors {
            loop {
                if steps.len() >= burst {
                    break 'outer;
                }

                let record = match &mut entry.cursor {
                    Cursor::ResultSet(rs) => {
                        let current = rs.current();
                        if current.is_some() {
                            rs.advance();
                        }
                        current
                    }
                    Cursor::Indexed { container, next } => {
                        if *next as usize >= container.record_count() {
                            None
                        } else {
                            let key = TioData::Int(*next as i64);
                            *next += 1;
                            container.get_record(&key)
                        }
                    }
                };

                match record {
                    Some((key, value, metadata)) => {
                        steps.push(PumpStep::Event {
                            handle: entry.handle,
                            event: Event::new(entry.event_name, key, value, metadata),
                        });
                    }
                    None => {
                        finished.push(entry.handle);
                        steps.push(PumpStep::Finished { handle: entry.handle });
                        break;
                    }
                }
            }
        }

        for handle in finished {
            self.pending.shift_remove(&handle);
            self.cursors.retain(|p| p.handle != handle);
        }

        steps
    }
}
