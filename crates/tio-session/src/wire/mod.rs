//! Wire framing: text-mode lines and binary-mode TLV messages.
//!
//! Only event/answer/query framing lives here — the concrete command
//! grammar a dispatcher would interpret (what `subscribe`'s parameters mean,
//! authentication tokens, and so on) is out of scope for this crate.

pub mod binary;
pub mod text;
