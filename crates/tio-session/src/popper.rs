use std::rc::Rc;

use indexmap::IndexMap;

use crate::{container::Container, error::SessionError, handle::Handle};

struct ArmedPop {
    container: Rc<dyn Container>,
    pop_id: u64,
}

/// Tracks in-flight `wait_and_pop_next` requests, one per handle.
///
/// A second request on a handle that already has one pending is rejected
/// with [`SessionError::AlreadyPendingPop`] rather than silently replacing
/// it, matching the "once_" guard in the original `WaitAndPopNext` handler.
#[derive(Default)]
pub struct PopperTable {
    armed: IndexMap<Handle, ArmedPop>,
}

impl PopperTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, handle: Handle) -> bool {
        self.armed.contains_key(&handle)
    }

    /// Records that `pop_id` (returned by `Container::wait_and_pop_next`) is
    /// now outstanding for `handle`. Callers must check [`Self::is_armed`]
    /// before calling the container, since the container call itself has no
    /// notion of "already pending".
    pub fn arm(&mut self, handle: Handle, container: Rc<dyn Container>, pop_id: u64) -> Result<(), SessionError> {
        if self.armed.contains_key(&handle) {
            return Err(SessionError::AlreadyPendingPop(handle));
        }
        self.armed.insert(handle, ArmedPop { container, pop_id });
        Ok(())
    }

    /// The callback fired (container delivered a popped record, or the
    /// handle was closed out from under it); clears the bookkeeping entry
    /// without touching the container, since firing already consumed it.
    pub fn clear(&mut self, handle: Handle) {
        self.armed.shift_remove(&handle);
    }

    /// Cancels one outstanding pop, telling the container to drop the
    /// callback so it never fires after the session tears down.
    pub fn cancel(&mut self, handle: Handle) {
        if let Some(entry) = self.armed.shift_remove(&handle) {
            entry.container.cancel_wait_and_pop_next(entry.pop_id);
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, entry) in self.armed.drain(..) {
            entry.container.cancel_wait_and_pop_next(entry.pop_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerKind, EventCallback, PopCallback, ResultCursor};
    use crate::data::TioData;
    use std::cell::Cell;

    struct Stub {
        cancelled: Cell<Option<u64>>,
    }
    impl Container for Stub {
        fn kind(&self) -> ContainerKind {
            ContainerKind::List
        }
        fn type_name(&self) -> &str {
            "stub"
        }
        fn record_count(&self) -> usize {
            0
        }
        fn get_record(&self, _key: &TioData) -> Option<(TioData, TioData, TioData)> {
            None
        }
        fn query(&self, _s: i64, _c: i64, _q: Option<&TioData>) -> Option<Box<dyn ResultCursor>> {
            None
        }
        fn subscribe(&self, _start: &str, _cb: EventCallback) -> Result<u64, SessionError> {
            Ok(1)
        }
        fn unsubscribe(&self, _cookie: u64) {}
        fn wait_and_pop_next(&self, _cb: PopCallback) -> u64 {
            42
        }
        fn cancel_wait_and_pop_next(&self, pop_id: u64) {
            self.cancelled.set(Some(pop_id));
        }
        fn set(&self, _key: TioData, _value: TioData, _metadata: TioData) {}
        fn delete(&self, _key: TioData, _metadata: TioData) {}
        fn clear(&self) {}
    }

    #[test]
    fn second_arm_on_same_handle_is_rejected() {
        let mut table = PopperTable::new();
        let c: Rc<dyn Container> = Rc::new(Stub { cancelled: Cell::new(None) });
        table.arm(1, c.clone(), 42).unwrap();
        assert_eq!(table.arm(1, c, 43), Err(SessionError::AlreadyPendingPop(1)));
    }

    #[test]
    fn cancel_tells_container_and_clears_bookkeeping() {
        let mut table = PopperTable::new();
        let c: Rc<dyn Container> = Rc::new(Stub { cancelled: Cell::new(None) });
        table.arm(5, c, 42).unwrap();
        table.cancel(5);
        assert!(!table.is_armed(5));
    }
}
