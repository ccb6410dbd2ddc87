use std::collections::VecDeque;
use std::io::{self, Write};

/// Outcome of a [`SendPipeline::drive`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The queue emptied out. The caller should treat this exactly like the
    /// original's `OnWrite` completion handler finding nothing left to send:
    /// drive the snapshot pump for a chance to queue more.
    Idle,
    /// The socket isn't ready for more right now; bytes remain queued.
    Blocked,
}

/// A per-session outbound byte queue with backpressure accounting.
///
/// Generalizes `flux_network::tcp::TcpStream`'s `send_backlog` /
/// `drain_backlog` pattern (a `VecDeque<Vec<u8>>` drained with partial-write
/// tracking) from raw frames to whatever this crate composes — text command
/// lines or binary TLV frames — and adds the hard byte cap the original
/// session enforces that a generic stream has no notion of.
#[derive(Default)]
pub struct SendPipeline {
    queue: VecDeque<Vec<u8>>,
    pending_bytes: usize,
    sent_bytes: u64,
}

impl SendPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues a fully composed buffer for sending. Does not attempt to write
    /// it; call [`Self::drive`] afterward.
    pub fn enqueue(&mut self, buf: Vec<u8>) {
        if buf.is_empty() {
            return;
        }
        self.pending_bytes += buf.len();
        self.queue.push_back(buf);
    }

    /// `true` once queued bytes exceed `cap`. The session treats this as
    /// terminal: the client isn't draining fast enough and gets disconnected
    /// rather than let memory grow without bound.
    pub fn exceeds_hard_cap(&self, cap: usize) -> bool {
        self.pending_bytes > cap
    }

    /// Drains as much of the queue as `w` will currently accept, without
    /// blocking. A short write leaves the remainder at the front of the
    /// queue for the next call.
    pub fn drive<W: Write>(&mut self, w: &mut W) -> io::Result<DrainOutcome> {
        while let Some(front) = self.queue.front_mut() {
            match w.write(front) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed during write")),
                Ok(n) => {
                    self.pending_bytes -= n;
                    self.sent_bytes += n as u64;
                    if n == front.len() {
                        self.queue.pop_front();
                    } else {
                        front.drain(..n);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(DrainOutcome::Blocked),
                Err(e) => return Err(e),
            }
        }
        Ok(DrainOutcome::Idle)
    }
}
