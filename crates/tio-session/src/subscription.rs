use std::rc::Rc;

use crate::{
    container::{Container, ResultCursor},
    data::TioData,
    event::{Event, EventKind},
    handle::Handle,
};

/// Resolves a possibly-negative, Python-style index against the current
/// record count, clamping into `[0, record_count - 1]`. `-1` denotes the
/// last element. An empty container normalizes everything to `0`.
fn normalize_index(idx: i64, record_count: usize) -> i64 {
    if record_count == 0 {
        return 0;
    }
    let rc = record_count as i64;
    let mut i = idx;
    if i < 0 {
        i += rc;
    }
    i.clamp(0, rc - 1)
}

/// Per-handle live event delivery, optionally preceded by a snapshot.
///
/// Invariant upheld by the caller (`Session`): a handle is either present in
/// `pending_snapshots` (streaming its initial contents, `cookie == 0`) or has
/// `cookie != 0` (live), never both.
pub struct Subscription {
    pub handle: Handle,
    pub container: Rc<dyn Container>,
    pub cookie: u64,
    pub binary: bool,
    pub event_name: EventKind,
    pub filter_start: i64,
    pub filter_end: i64,
    pub next_record: u64,
    pub result_set: Option<Box<dyn ResultCursor>>,
}

impl Subscription {
    pub fn new(handle: Handle, container: Rc<dyn Container>, binary: bool, event_name: EventKind) -> Self {
        Self {
            handle,
            container,
            cookie: 0,
            binary,
            event_name,
            filter_start: 0,
            filter_end: -1,
            next_record: 0,
            result_set: None,
        }
    }

    pub fn is_default_window(&self) -> bool {
        self.filter_start == 0 && self.filter_end == -1
    }

    /// The slice rewrite rule: given a container-observed mutation,
    /// translates it into the sequence of client-visible events for this
    /// subscription's window, in emission order (window-growing refill
    /// first, then the primary/rewritten event, then the window-shrinking
    /// companion).
    ///
    /// Returns an empty vec when the event should be dropped entirely.
    pub fn rewrite(
        &self,
        kind: EventKind,
        key: TioData,
        value: TioData,
        metadata: TioData,
        record_count: usize,
    ) -> Vec<Event> {
        if self.is_default_window() {
            return vec![Event::new(kind, key, value, metadata)];
        }

        let rc = record_count as i64;

        let local_name = match kind {
            EventKind::PopFront => Some(("delete", 0i64)),
            EventKind::PopBack => Some(("delete", rc - 1)),
            EventKind::PushFront => Some(("insert", 0i64)),
            EventKind::PushBack => key.as_int().map(|i| ("push_back", i)),
            EventKind::Delete => key.as_int().map(|i| ("delete", i)),
            EventKind::Insert => key.as_int().map(|i| ("insert", i)),
            EventKind::Set => key.as_int().map(|i| ("set", i)),
            _ => None,
        };

        let Some((local_name, current_index)) = local_name else {
            return vec![Event::new(kind, key, value, metadata)];
        };

        let s = normalize_index(self.filter_start, record_count);
        let e = normalize_index(self.filter_end, record_count);

        let mut out = Vec::new();

        match local_name {
            "push_back" => {
                if current_index < s || current_index > e {
                    return Vec::new();
                }
                if s == 0 {
                    out.push(Event::new(kind, key, value, metadata));
                } else {
                    out.push(Event::new(EventKind::PushBack, TioData::Int(current_index - s), value, metadata));
                }
            }

            "delete" => {
                if current_index > e {
                    return Vec::new();
                }

                let mut should_send = true;
                let mut shrink_extra = None;

                if current_index <= s {
                    shrink_extra =
                        Some(Event::new(EventKind::PopFront, TioData::Int(0), TioData::Null, TioData::Null));
                    should_send = false;
                }

                if rc > 0 && rc > e {
                    // Refetch the new tail rather than reusing the incoming
                    // (deleted) row's value/metadata — see DESIGN.md for why
                    // this departs from the source's literal behavior here.
                    let (_, refill_value, refill_metadata) = self
                        .container
                        .get_record(&TioData::Int(e))
                        .unwrap_or_else(|| (TioData::Null, value.clone(), metadata.clone()));
                    out.push(Event::new(EventKind::PushBack, TioData::Int(e + 1 - s), refill_value, refill_metadata));
                }

                if should_send {
                    if s > 0 {
                        out.push(Event::new(
                            EventKind::Delete,
                            TioData::Int(current_index - s),
                            TioData::Null,
                            TioData::Null,
                        ));
                    } else {
                        out.push(Event::new(kind, key, value, metadata));
                    }
                }

                if let Some(extra) = shrink_extra {
                    out.push(extra);
                }
            }

            "insert" => {
                let mut should_send = true;
                let mut shrink_extra = None;

                if current_index < s {
                    out.push(Event::new(EventKind::PushFront, TioData::Int(0), value.clone(), metadata.clone()));
                    should_send = false;
                }

                if rc - 1 > e {
                    shrink_extra =
                        Some(Event::new(EventKind::PopBack, TioData::Int(e - s), TioData::Null, TioData::Null));
                }

                if should_send {
                    if s > 0 {
                        out.push(Event::new(EventKind::Insert, TioData::Int(current_index - s), value, metadata));
                    } else {
                        out.push(Event::new(kind, key, value, metadata));
                    }
                }

                if let Some(extra) = shrink_extra {
                    out.push(extra);
                }
            }

            "set" => {
                if current_index < s || current_index > e {
                    return Vec::new();
                }
                out.push(Event::new(EventKind::Set, TioData::Int(current_index - s), value, metadata));
            }

            _ => unreachable!("local_name is one of the four literals matched above"),
        }

        out
    }
}
