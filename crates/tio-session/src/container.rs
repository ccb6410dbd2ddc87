use crate::{data::TioData, event::EventKind, error::SessionError};

/// Kind of storage a container provides. Drives which synthesized event name
/// a snapshot uses (`push_back` for ordered lists, `set` for keyed maps).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Map,
}

impl ContainerKind {
    pub fn snapshot_event(self) -> EventKind {
        match self {
            ContainerKind::List => EventKind::PushBack,
            ContainerKind::Map => EventKind::Set,
        }
    }
}

/// Callback invoked by a container for every mutation a live subscription
/// should observe. Not `Send`: containers and sessions share a single
/// cooperative event loop thread (see module docs on [`crate::session`]), so
/// the callback is invoked in-line from the call stack that performed the
/// mutation.
pub type EventCallback = Box<dyn FnMut(EventKind, TioData, TioData, TioData)>;

/// One-shot callback for [`Container::wait_and_pop_next`].
pub type PopCallback = Box<dyn FnOnce(EventKind, TioData, TioData, TioData)>;

/// Lazy cursor returned by [`Container::query`], driving snapshot streaming
/// in preference to indexed `get_record` walking when available.
///
/// Mirrors the original `ITioResultSet::GetRecord`/`MoveNext` pair: a call to
/// `current` does not advance the cursor; `advance` does, and returns `false`
/// once the cursor is exhausted.
pub trait ResultCursor {
    /// The record the cursor currently points at, if any.
    fn current(&self) -> Option<(TioData, TioData, TioData)>;

    /// Advances the cursor. Returns `false` when there is nothing left.
    fn advance(&mut self) -> bool;
}

/// The server-side storage engine backing a handle. Implemented by the
/// container registry (out of scope for this crate); the session only calls
/// the methods below.
pub trait Container {
    fn kind(&self) -> ContainerKind;

    fn type_name(&self) -> &str;

    fn record_count(&self) -> usize;

    /// Fetch a single record by key (used by the indexed-walk snapshot path
    /// and by direct `get` operations).
    fn get_record(&self, key: &TioData) -> Option<(TioData, TioData, TioData)>;

    /// Opens a lazy cursor starting at `start`, for `count` records (`0`
    /// means "to the end"), optionally filtered by `query`. Returns `None`
    /// when the container has no efficient cursor support, in which case the
    /// indexed walk is used instead.
    fn query(&self, start: i64, count: i64, query: Option<&TioData>) -> Option<Box<dyn ResultCursor>>;

    /// Registers a live event callback. `start` is the opaque sentinel passed
    /// by the caller: a numeric string when driving a snapshot-then-live
    /// subscription, `""` when attaching live-only after a snapshot
    /// completed, or a container-specific sentinel such as `"__none__"` used
    /// by the diff mirror to suppress any snapshot.
    fn subscribe(&self, start: &str, callback: EventCallback) -> Result<u64, SessionError>;

    fn unsubscribe(&self, cookie: u64);

    /// Arms a one-shot pop. Returns `0` if no pop could be armed (the
    /// container doesn't support it or immediately failed); a non-zero pop id
    /// otherwise.
    fn wait_and_pop_next(&self, callback: PopCallback) -> u64;

    fn cancel_wait_and_pop_next(&self, pop_id: u64);

    /// Used by the diff mirror to write into the destination container.
    fn set(&self, key: TioData, value: TioData, metadata: TioData);

    fn delete(&self, key: TioData, metadata: TioData);

    /// Used by the diff mirror to re-materialize a `clear` on the source.
    fn clear(&self);
}
