//! Per-client session for an in-memory, multi-container TCP data server.
//!
//! A `Session` multiplexes one client connection across any number of
//! containers registered on its handle table: subscriptions rewritten to a
//! windowed slice, bounded-burst snapshot streaming, a backpressured send
//! pipeline, source->destination diff mirrors, and one-shot
//! wait-and-pop-next requests. Containers and the concrete command grammar a
//! dispatcher interprets are out of scope — this crate only defines the
//! [`container::Container`] collaborator trait and the session-side state
//! machines built on top of it.

pub mod config;
pub mod container;
pub mod data;
pub mod diff;
pub mod error;
pub mod event;
pub mod handle;
pub mod pipeline;
pub mod popper;
pub mod session;
pub mod snapshot;
pub mod subscription;
pub mod wire;

pub use config::SessionConfig;
pub use container::{Container, ContainerKind, EventCallback, PopCallback, ResultCursor};
pub use data::TioData;
pub use error::SessionError;
pub use event::{Event, EventKind};
pub use handle::Handle;
pub use session::{DispatchCommand, Session};
