use crate::data::TioData;

/// Closed set of event kinds a container can emit. Represented as a tagged
/// variant internally; converted to wire strings/codes only at the
/// text/binary boundary (see `wire::text`, `wire::binary`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    PushBack,
    PushFront,
    PopBack,
    PopFront,
    Delete,
    Clear,
    Set,
    Insert,
    WaitAndPopNext,
    SnapshotEnd,
}

impl EventKind {
    /// Name used in the text wire and as the dictionary key for binary event
    /// codes.
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::PushBack => "push_back",
            EventKind::PushFront => "push_front",
            EventKind::PopBack => "pop_back",
            EventKind::PopFront => "pop_front",
            EventKind::Delete => "delete",
            EventKind::Clear => "clear",
            EventKind::Set => "set",
            EventKind::Insert => "insert",
            EventKind::WaitAndPopNext => "wnp_next",
            EventKind::SnapshotEnd => "snapshot_end",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Some(match name {
            "push_back" => EventKind::PushBack,
            "push_front" => EventKind::PushFront,
            "pop_back" => EventKind::PopBack,
            "pop_front" => EventKind::PopFront,
            "delete" => EventKind::Delete,
            "clear" => EventKind::Clear,
            "set" => EventKind::Set,
            "insert" => EventKind::Insert,
            "wnp_next" => EventKind::WaitAndPopNext,
            "snapshot_end" => EventKind::SnapshotEnd,
            _ => return None,
        })
    }

    /// Binary wire event code. Unknown names map to 0; there are none here
    /// since the set is closed, but `pop_back`/`pop_front`/`delete` all share
    /// the `DELETE` code as specified.
    pub fn wire_code(self) -> u32 {
        match self {
            EventKind::PushBack => 1,
            EventKind::PushFront => 2,
            EventKind::PopBack | EventKind::PopFront | EventKind::Delete => 3,
            EventKind::Clear => 4,
            EventKind::Set => 5,
            EventKind::Insert => 6,
            EventKind::WaitAndPopNext => 7,
            EventKind::SnapshotEnd => 8,
        }
    }
}

/// A fully formed event ready to be framed and sent. `key`/`value`/`metadata`
/// are absent (`TioData::Null`) when the container didn't supply them.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub key: TioData,
    pub value: TioData,
    pub metadata: TioData,
}

impl Event {
    pub fn new(kind: EventKind, key: TioData, value: TioData, metadata: TioData) -> Self {
        Self { kind, key, value, metadata }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_variants_share_delete_code() {
        assert_eq!(EventKind::PopBack.wire_code(), EventKind::Delete.wire_code());
        assert_eq!(EventKind::PopFront.wire_code(), EventKind::Delete.wire_code());
    }

    #[test]
    fn wire_name_round_trips() {
        for kind in [
            EventKind::PushBack,
            EventKind::PushFront,
            EventKind::PopBack,
            EventKind::PopFront,
            EventKind::Delete,
            EventKind::Clear,
            EventKind::Set,
            EventKind::Insert,
            EventKind::WaitAndPopNext,
            EventKind::SnapshotEnd,
        ] {
            let name = kind.wire_name();
            assert!(EventKind::from_wire_name(name).is_some());
        }
    }
}
