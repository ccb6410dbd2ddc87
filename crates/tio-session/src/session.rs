//! The per-client session. Ties together the handle table, subscription
//! engine, snapshot pump, diff mirror, popper table and send pipeline around
//! one socket.
//!
//! Single-threaded and synchronous, mirroring `flux_network::tcp`: no
//! `Arc`/`Mutex`, no async runtime. A `Session` is always held behind
//! `Rc<RefCell<_>>` because containers invoke event callbacks back into it;
//! `Session` keeps a `Weak` reference to itself (set once at construction) so
//! those callbacks can be minted without the caller threading an `Rc` through
//! every method.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::config::SessionConfig;
use crate::container::{Container, ContainerKind};
use crate::data::TioData;
use crate::diff::DiffTable;
use crate::error::SessionError;
use crate::event::{Event, EventKind};
use crate::handle::{Handle, HandleTable};
use crate::pipeline::{DrainOutcome, SendPipeline};
use crate::popper::PopperTable;
use crate::snapshot::{PumpStep, SnapshotPump};
use crate::subscription::Subscription;
use crate::wire::{binary, text};

/// One fully-read command, handed to an external dispatcher. The text/binary
/// wire grammar beyond this framing (what a verb's parameters mean) is out
/// of scope here; the dispatcher interprets these and calls back into
/// `Session`'s public operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCommand {
    Text { verb: String, params: Vec<String>, payload: Option<Vec<u8>> },
    Binary(Vec<u8>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Binary,
}

enum TextReadState {
    /// Waiting for a `\n`-terminated command line.
    Line,
    /// A command line was parsed and handed to the dispatcher with
    /// `payload: None`; further lines are held back until the dispatcher
    /// calls [`CommandReader::request_more_data`] to say whether it needs a
    /// payload (`n = 0` meaning no).
    AwaitingMoreData { verb: String, params: Vec<String> },
    /// The dispatcher asked for `remaining` more raw bytes as the command's
    /// payload before re-dispatch.
    Payload { verb: String, params: Vec<String>, remaining: usize, buf: Vec<u8> },
}

/// Alternates between line-delimited text commands and length-prefixed
/// binary messages, one-way latched by a `protocol binary` command.
///
/// Grounded on the original's text/binary command loop: a text line is read
/// up to `\n` (trailing `\r` stripped); binary messages are a fixed
/// `message_size` header followed by exactly that many body bytes.
struct CommandReader {
    mode: Mode,
    rx_buf: Vec<u8>,
    text_state: TextReadState,
    max_payload: usize,
}

impl CommandReader {
    fn new(max_payload: usize) -> Self {
        Self { mode: Mode::Text, rx_buf: Vec::new(), text_state: TextReadState::Line, max_payload }
    }

    fn feed(&mut self, bytes: &[u8]) {
        self.rx_buf.extend_from_slice(bytes);
    }

    /// Resolves the `AwaitingMoreData` command the reader just handed out:
    /// `n = 0` means it needs no payload and parsing resumes at the next
    /// line; `n > 0` buffers that many more raw bytes before re-dispatching
    /// the same command with `payload: Some(..)`. A call that doesn't land
    /// on an `AwaitingMoreData` command (none pending, or called twice) is a
    /// no-op, matching the original's `more_data` continuation which is only
    /// ever consulted once per dispatched command.
    fn request_more_data(&mut self, n: usize) -> Result<(), SessionError> {
        if n >= self.max_payload {
            return Err(SessionError::ProtocolViolation(format!("payload of {n} bytes exceeds limit")));
        }
        if matches!(self.text_state, TextReadState::AwaitingMoreData { .. }) {
            let TextReadState::AwaitingMoreData { verb, params } = std::mem::replace(&mut self.text_state, TextReadState::Line)
            else {
                unreachable!()
            };
            if n > 0 {
                self.text_state = TextReadState::Payload { verb, params, remaining: n, buf: Vec::new() };
            }
        }
        Ok(())
    }

    fn is_binary(&self) -> bool {
        self.mode == Mode::Binary
    }

    fn switch_to_binary(&mut self) {
        self.mode = Mode::Binary;
    }

    /// Drains as many complete commands as are currently buffered.
    fn drain(&mut self) -> Result<Vec<DispatchCommand>, SessionError> {
        let mut out = Vec::new();
        loop {
            match self.mode {
                Mode::Text => match self.try_take_text()? {
                    Some(cmd) => out.push(cmd),
                    None => break,
                },
                Mode::Binary => match self.try_take_binary()? {
                    Some(msg) => out.push(DispatchCommand::Binary(msg)),
                    None => break,
                },
            }
        }
        Ok(out)
    }

    fn try_take_text(&mut self) -> Result<Option<DispatchCommand>, SessionError> {
        match &mut self.text_state {
            TextReadState::Payload { remaining, buf, .. } => {
                if buf.len() + self.rx_buf.len() < *remaining {
                    buf.append(&mut self.rx_buf);
                    return Ok(None);
                }
                let need = *remaining - buf.len();
                buf.extend(self.rx_buf.drain(..need));
                let TextReadState::Payload { verb, params, buf, .. } =
                    std::mem::replace(&mut self.text_state, TextReadState::Line)
                else {
                    unreachable!()
                };
                Ok(Some(DispatchCommand::Text { verb, params, payload: Some(buf) }))
            }
            // Parsing is paused on an already-dispatched command until the
            // dispatcher calls `request_more_data` to say whether it needs a
            // payload.
            TextReadState::AwaitingMoreData { .. } => Ok(None),
            TextReadState::Line => {
                let Some(pos) = self.rx_buf.iter().position(|&b| b == b'\n') else { return Ok(None) };
                let mut line: Vec<u8> = self.rx_buf.drain(..=pos).collect();
                line.pop(); // '\n'
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if line.is_empty() {
                    return self.try_take_text();
                }
                let line = String::from_utf8_lossy(&line).into_owned();
                let Some(cmd) = text::parse_line(&line) else { return self.try_take_text() };

                if cmd.verb == "protocol" && cmd.params.iter().any(|p| p == "binary") {
                    self.switch_to_binary();
                    return Ok(Some(DispatchCommand::Text {
                        verb: "protocol".to_string(),
                        params: vec!["binary".to_string()],
                        payload: None,
                    }));
                }

                self.text_state = TextReadState::AwaitingMoreData { verb: cmd.verb.clone(), params: cmd.params.clone() };
                Ok(Some(DispatchCommand::Text { verb: cmd.verb, params: cmd.params, payload: None }))
            }
        }
    }

    fn try_take_binary(&mut self) -> Result<Option<DispatchCommand>, SessionError> {
        if self.rx_buf.len() < binary::HEADER_SIZE {
            return Ok(None);
        }
        let header: [u8; binary::HEADER_SIZE] = self.rx_buf[..binary::HEADER_SIZE].try_into().unwrap();
        let size = binary::read_message_size(&header) as usize;
        if size >= self.max_payload {
            return Err(SessionError::ProtocolViolation(format!("binary message of {size} bytes exceeds limit")));
        }
        if self.rx_buf.len() < binary::HEADER_SIZE + size {
            return Ok(None);
        }
        self.rx_buf.drain(..binary::HEADER_SIZE);
        let body: Vec<u8> = self.rx_buf.drain(..size).collect();
        Ok(Some(body))
    }
}

/// The per-client session. See module docs.
pub struct Session<W> {
    self_weak: Weak<RefCell<Session<W>>>,
    stream: W,
    config: SessionConfig,
    valid: bool,
    handles: HandleTable,
    subscriptions: IndexMap<Handle, Subscription>,
    snapshots: SnapshotPump,
    diffs: DiffTable,
    poppers: PopperTable,
    pipeline: SendPipeline,
    reader: CommandReader,
}

impl<W: Read + Write + 'static> Session<W> {
    pub fn new(stream: W, config: SessionConfig) -> Rc<RefCell<Self>> {
        let session = Rc::new(RefCell::new(Self {
            self_weak: Weak::new(),
            stream,
            config,
            valid: true,
            handles: HandleTable::new(),
            subscriptions: IndexMap::new(),
            snapshots: SnapshotPump::new(),
            diffs: DiffTable::new(),
            poppers: PopperTable::new(),
            pipeline: SendPipeline::new(),
            reader: CommandReader::new(config.max_command_payload),
        }));
        session.borrow_mut().self_weak = Rc::downgrade(&session);
        session
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn pending_bytes(&self) -> usize {
        self.pipeline.pending_bytes()
    }

    // ---- Command Reader (§4.1) -------------------------------------------------

    /// Reads whatever the socket currently offers (non-blocking) and returns
    /// fully-parsed commands ready for dispatch. `protocol binary` is handled
    /// internally: the latch flips and the canned `going binary` reply is
    /// queued, without surfacing the command to the caller.
    pub fn poll_commands(&mut self) -> Result<Vec<DispatchCommand>, SessionError> {
        let mut tmp = [0u8; 64 * 1024];
        loop {
            match self.stream.read(&mut tmp) {
                Ok(0) => {
                    self.unsubscribe_all();
                    self.valid = false;
                    return Err(SessionError::Io("peer closed".to_string()));
                }
                Ok(n) => self.reader.feed(&tmp[..n]),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.unsubscribe_all();
                    self.valid = false;
                    return Err(SessionError::Io(e.to_string()));
                }
            }
        }

        let drained = match self.reader.drain() {
            Ok(cmds) => cmds,
            Err(e) => {
                self.unsubscribe_all();
                self.valid = false;
                return Err(e);
            }
        };

        let mut commands = Vec::with_capacity(drained.len());
        for cmd in drained {
            if let DispatchCommand::Text { verb, .. } = &cmd {
                if verb == "protocol" {
                    self.pipeline.enqueue(text::compose_going_binary());
                    self.drive_pipeline();
                    continue;
                }
            }
            commands.push(cmd);
        }
        Ok(commands)
    }

    /// Resolves the payload question for the command `poll_commands` just
    /// returned: `n = 0` means it needs none and the next call resumes
    /// parsing at the following line; `n > 0` asks the reader to buffer `n`
    /// more raw bytes before redelivering the command with that payload
    /// attached. An oversized `n` is a protocol violation and tears the
    /// session down like any other terminal error.
    pub fn request_more_data(&mut self, n: usize) -> Result<(), SessionError> {
        match self.reader.request_more_data(n) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.unsubscribe_all();
                self.valid = false;
                Err(e)
            }
        }
    }

    /// Whether the connection has latched into binary framing (one-way,
    /// flipped by `protocol binary`). Used to frame events that aren't tied
    /// to a per-handle subscription's own `binary` flag, such as a fired
    /// `wait_and_pop_next`.
    pub fn is_binary_mode(&self) -> bool {
        self.reader.is_binary()
    }

    // ---- Handle Table (§4.2) ----------------------------------------------------

    pub fn register_container(&mut self, name: impl Into<String>, container: Rc<dyn Container>) -> Handle {
        self.handles.register(name, container)
    }

    pub fn close_handle(&mut self, handle: Handle) -> Result<(), SessionError> {
        self.unsubscribe(handle).ok();
        self.diffs.stop(handle);
        self.poppers.cancel(handle);
        self.handles.close(handle)
    }

    // ---- Subscription Engine (§4.3) ---------------------------------------------

    pub fn subscribe(&mut self, handle: Handle, start: &str, filter_end: i64) -> Result<(), SessionError> {
        self.start_subscription(handle, start, filter_end, false)
    }

    pub fn binary_subscribe(&mut self, handle: Handle, start: &str, filter_end: i64) -> Result<(), SessionError> {
        self.start_subscription(handle, start, filter_end, true)
    }

    fn start_subscription(&mut self, handle: Handle, start: &str, filter_end: i64, binary: bool) -> Result<(), SessionError> {
        if self.subscriptions.contains_key(&handle) {
            let err = SessionError::AlreadySubscribed;
            self.answer_error(&err, binary);
            return Err(err);
        }

        let container = match self.handles.get(handle) {
            Ok(c) => c,
            Err(e) => {
                self.answer_error(&e, binary);
                return Err(e);
            }
        };

        let event_name = container.kind().snapshot_event();
        let mut sub = Subscription::new(handle, container.clone(), binary, event_name);
        sub.filter_end = filter_end;

        if let Ok(start_index) = start.parse::<i64>() {
            if container.kind() == ContainerKind::List && start_index >= 0 {
                sub.filter_start = start_index;
                sub.next_record = start_index as u64;
                self.subscriptions.insert(handle, sub);
                self.snapshots.start(handle, container, start_index as u64, None, event_name);
                // `answer_ok` drives the pipeline, which pumps the snapshot
                // once it goes idle — no separate kick needed here.
                self.answer_ok(binary);
                return Ok(());
            }
        }

        // Binary mode answers success *before* the subscribe call completes,
        // preserving the original's ordering quirk rather than fixing it —
        // see DESIGN.md.
        if binary {
            self.subscriptions.insert(handle, sub);
            self.answer_ok(true);
            let callback = self.event_callback(handle);
            match container.subscribe(start, callback) {
                Ok(cookie) => {
                    if let Some(s) = self.subscriptions.get_mut(&handle) {
                        s.cookie = cookie;
                    }
                    Ok(())
                }
                Err(e) => {
                    self.subscriptions.shift_remove(&handle);
                    Err(e)
                }
            }
        } else {
            self.subscriptions.insert(handle, sub);
            let callback = self.event_callback(handle);
            match container.subscribe(start, callback) {
                Ok(cookie) => {
                    if let Some(s) = self.subscriptions.get_mut(&handle) {
                        s.cookie = cookie;
                    }
                    self.answer_ok(false);
                    Ok(())
                }
                Err(e) => {
                    self.subscriptions.shift_remove(&handle);
                    self.answer_error(&e, false);
                    Err(e)
                }
            }
        }
    }

    pub fn unsubscribe(&mut self, handle: Handle) -> Result<(), SessionError> {
        match self.subscriptions.shift_remove(&handle) {
            Some(sub) if sub.cookie != 0 => {
                sub.container.unsubscribe(sub.cookie);
                Ok(())
            }
            Some(_) => {
                self.snapshots.cancel(handle);
                Ok(())
            }
            None => Ok(()), // idempotent: unsubscribing a non-subscribed handle is a no-op
        }
    }

    fn event_callback(&self, handle: Handle) -> crate::container::EventCallback {
        let weak = self.self_weak.clone();
        Box::new(move |kind, key, value, metadata| {
            if let Some(strong) = weak.upgrade() {
                strong.borrow_mut().on_container_event(handle, kind, key, value, metadata);
            }
        })
    }

    fn on_container_event(&mut self, handle: Handle, kind: EventKind, key: TioData, value: TioData, metadata: TioData) {
        if !self.valid {
            return;
        }
        let Some(sub) = self.subscriptions.get(&handle) else { return };
        let record_count = sub.container.record_count();
        let binary = sub.binary;
        let events = sub.rewrite(kind, key, value, metadata, record_count);
        for event in &events {
            self.enqueue_event(handle, event, binary);
        }
        self.after_enqueue();
    }

    fn enqueue_event(&mut self, handle: Handle, event: &Event, binary: bool) {
        let frame = if binary { binary::compose_event(handle, event) } else { text::compose_event(handle, event) };
        self.pipeline.enqueue(frame);
    }

    fn answer_ok(&mut self, binary: bool) {
        let frame = if binary { binary::compose_answer_ok() } else { text::compose_answer_ok() };
        self.pipeline.enqueue(frame);
        self.drive_pipeline();
    }

    fn answer_error(&mut self, error: &SessionError, binary: bool) {
        let frame =
            if binary { binary::compose_answer_error(&error.to_string()) } else { text::compose_answer_error(&error.to_string()) };
        self.pipeline.enqueue(frame);
        self.drive_pipeline();
    }

    // ---- Snapshot Pump (§4.4) ---------------------------------------------------

    fn pump_snapshots_now(&mut self) {
        if self.snapshots.is_empty() {
            return;
        }
        let steps = self.snapshots.pump(self.config.snapshot_burst);
        for step in steps {
            match step {
                PumpStep::Event { handle, event } => {
                    if let Some(sub) = self.subscriptions.get(&handle) {
                        let record_count = sub.container.record_count();
                        let binary = sub.binary;
                        let rewritten = sub.rewrite(event.kind, event.key, event.value, event.metadata, record_count);
                        for e in &rewritten {
                            self.enqueue_event(handle, e, binary);
                        }
                    }
                }
                PumpStep::Finished { handle } => self.attach_live(handle),
            }
        }
        if self.pipeline.exceeds_hard_cap(self.config.hard_cap_bytes) {
            tracing::warn!(pending = self.pipeline.pending_bytes(), "hard cap exceeded during snapshot pump");
            self.unsubscribe_all();
            self.valid = false;
            return;
        }
        self.drive_pipeline();
    }

    fn attach_live(&mut self, handle: Handle) {
        let Some(sub) = self.subscriptions.get(&handle) else { return };
        let container = sub.container.clone();
        let callback = self.event_callback(handle);
        match container.subscribe("", callback) {
            Ok(cookie) => {
                if let Some(s) = self.subscriptions.get_mut(&handle) {
                    s.cookie = cookie;
                }
            }
            Err(e) => {
                tracing::warn!(%handle, error = %e, "failed to attach live subscription after snapshot");
                self.subscriptions.shift_remove(&handle);
            }
        }
    }

    // ---- Send Pipeline (§4.5) ---------------------------------------------------

    /// Drives the outgoing queue and, once it empties, the snapshot pump —
    /// the write-completion hook described in §4.4/§4.5.
    pub fn drive_pipeline(&mut self) {
        if !self.valid {
            return;
        }
        match self.pipeline.drive(&mut self.stream) {
            Ok(DrainOutcome::Idle) => self.pump_snapshots_now(),
            Ok(DrainOutcome::Blocked) => {}
            Err(e) => {
                tracing::warn!(error = %e, "session write failed, tearing down");
                self.unsubscribe_all();
                self.valid = false;
            }
        }
    }

    // ---- Teardown (§4.6) ---------------------------------------------------------

    /// Releases every subscription resource, in the order the original's
    /// `UnsubscribeAll` does: snapshots first (they own no cookies), then
    /// live subscriptions, then poppers, then diffs, then the handle table.
    /// Does not itself mark the session invalid — callers that tear down due
    /// to a terminal error do that separately.
    pub fn unsubscribe_all(&mut self) {
        self.snapshots.cancel_all();

        for (_, sub) in self.subscriptions.drain(..) {
            if sub.cookie != 0 {
                sub.container.unsubscribe(sub.cookie);
            }
        }

        self.poppers.cancel_all();
        self.diffs.stop_all();
        self.handles.clear();
    }

    /// Full client-initiated teardown (e.g. a `quit` command or the
    /// connection being dropped by the dispatcher): releases every resource
    /// and marks the session invalid so any late, already-in-flight
    /// container callback becomes a no-op.
    pub fn shutdown(&mut self) {
        self.unsubscribe_all();
        self.valid = false;
    }

    // ---- Diff Mirror (§4.7) -------------------------------------------------------

    pub fn setup_diff(&mut self, source_handle: Handle, destination_handle: Handle) -> Result<(), SessionError> {
        let source = self.handles.get(source_handle)?;
        let destination = self.handles.get(destination_handle)?;
        self.diffs.start(source_handle, source, destination)
    }

    pub fn stop_diffs(&mut self) {
        self.diffs.stop_all();
    }

    // ---- Wait-and-Pop-Next (§4.8) --------------------------------------------------

    pub fn binary_wait_and_pop_next(&mut self, handle: Handle) -> Result<(), SessionError> {
        if self.poppers.is_armed(handle) {
            return Err(SessionError::AlreadyPendingPop(handle));
        }
        let container = self.handles.get(handle)?;
        let callback = self.pop_callback(handle);
        let pop_id = container.wait_and_pop_next(callback);
        if pop_id != 0 {
            self.poppers.arm(handle, container, pop_id)?;
        }
        Ok(())
    }

    fn pop_callback(&self, handle: Handle) -> crate::container::PopCallback {
        let weak = self.self_weak.clone();
        Box::new(move |kind, key, value, metadata| {
            if let Some(strong) = weak.upgrade() {
                strong.borrow_mut().on_pop_fired(handle, kind, key, value, metadata);
            }
        })
    }

    fn on_pop_fired(&mut self, handle: Handle, kind: EventKind, key: TioData, value: TioData, metadata: TioData) {
        self.poppers.clear(handle);
        if !self.valid {
            return;
        }
        // A pop isn't tied to a live subscription, so it has no per-handle
        // `binary` flag; it's framed on the connection's current protocol
        // mode instead, matching `OnPopEvent`'s branch on `binaryProtocol_`.
        let binary = self.reader.is_binary();
        let event = Event::new(kind, key, value, metadata);
        self.enqueue_event(handle, &event, binary);
        self.after_enqueue();
    }

    fn after_enqueue(&mut self) {
        if self.pipeline.exceeds_hard_cap(self.config.hard_cap_bytes) {
            tracing::warn!(pending = self.pipeline.pending_bytes(), "send pipeline exceeded hard cap, tearing down session");
            self.unsubscribe_all();
            self.valid = false;
            return;
        }
        self.drive_pipeline();
    }

    // ---- Ad hoc queries (§6 supplement) ---------------------------------------------

    /// Drives a one-off (non-subscription) query to completion immediately,
    /// framing it as `answer ok query <id>` / `query <id> item ...` /
    /// `query <id> end`, matching `SendResultSet`/`SendBinaryResultSet`.
    pub fn send_result_set(
        &mut self,
        query_id: u64,
        handle: Handle,
        start: i64,
        count: i64,
        query: Option<&TioData>,
        binary: bool,
    ) -> Result<(), SessionError> {
        let container = self.handles.get(handle)?;
        if binary {
            // Binary has no separate "query open" frame: the leading
            // COMMAND=ANSWER message doubles as the ack, and each item frame
            // below already carries `query_id`.
            self.pipeline.enqueue(binary::compose_answer_ok());
        } else {
            self.pipeline.enqueue(text::compose_query_open(query_id));
        }

        match container.query(start, count, query) {
            Some(mut cursor) => {
                while let Some((key, value, metadata)) = cursor.current() {
                    self.emit_query_item(query_id, &key, &value, &metadata, binary);
                    if !cursor.advance() {
                        break;
                    }
                }
            }
            None => {
                let mut next = start.max(0) as u64;
                let limit = if count > 0 { next + count as u64 } else { u64::MAX };
                while next < limit && (next as usize) < container.record_count() {
                    if let Some((key, value, metadata)) = container.get_record(&TioData::Int(next as i64)) {
                        self.emit_query_item(query_id, &key, &value, &metadata, binary);
                    }
                    next += 1;
                }
            }
        }

        if binary {
            self.pipeline.enqueue(binary::compose_query_item(query_id, None));
        } else {
            self.pipeline.enqueue(text::compose_query_end(query_id));
        }
        self.drive_pipeline();
        Ok(())
    }

    fn emit_query_item(&mut self, query_id: u64, key: &TioData, value: &TioData, metadata: &TioData, binary: bool) {
        let frame = if binary {
            binary::compose_query_item(query_id, Some((key, value, metadata)))
        } else {
            text::compose_query_item(query_id, key, value, metadata)
        };
        self.pipeline.enqueue(frame);
    }
}
