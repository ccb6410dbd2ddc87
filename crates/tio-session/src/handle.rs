use std::rc::Rc;

use indexmap::IndexMap;

use crate::{container::Container, error::SessionError};

/// A positive integer, unique per session, never reused within a session.
pub type Handle = u64;

struct HandleEntry {
    container: Rc<dyn Container>,
    name: String,
}

/// handle -> (container reference, declared name). Created by
/// [`HandleTable::register`], destroyed by [`HandleTable::close`].
#[derive(Default)]
pub struct HandleTable {
    entries: IndexMap<Handle, HandleEntry>,
    last_handle: Handle,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh handle by incrementing a counter; values are never
    /// reused within a session.
    pub fn register(&mut self, name: impl Into<String>, container: Rc<dyn Container>) -> Handle {
        self.last_handle += 1;
        let handle = self.last_handle;
        self.entries.insert(handle, HandleEntry { container, name: name.into() });
        handle
    }

    pub fn get(&self, handle: Handle) -> Result<Rc<dyn Container>, SessionError> {
        self.entries
            .get(&handle)
            .map(|e| e.container.clone())
            .ok_or(SessionError::InvalidHandle(handle))
    }

    pub fn name(&self, handle: Handle) -> Result<&str, SessionError> {
        self.entries.get(&handle).map(|e| e.name.as_str()).ok_or(SessionError::InvalidHandle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Removes the handle. Callers are responsible for tearing down any
    /// subscription on it first (see `Session::close_handle`).
    pub fn close(&mut self, handle: Handle) -> Result<(), SessionError> {
        self.entries.shift_remove(&handle).map(|_| ()).ok_or(SessionError::InvalidHandle(handle))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
