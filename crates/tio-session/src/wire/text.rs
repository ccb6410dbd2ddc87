use crate::data::TioData;
use crate::event::Event;
use crate::handle::Handle;

/// A parsed text-mode command line: `<verb> <params...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCommand {
    pub verb: String,
    pub params: Vec<String>,
}

/// Splits one CRLF/LF-terminated line (already stripped of its terminator)
/// into a verb and whitespace-separated parameters. Concrete command
/// grammar beyond this tokenization is the dispatcher's responsibility.
pub fn parse_line(line: &str) -> Option<TextCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?.to_string();
    let params = parts.map(str::to_string).collect();
    Some(TextCommand { verb, params })
}

fn push_field(out: &mut Vec<u8>, name: &str, data: &TioData) {
    if data.is_null() {
        return;
    }
    out.push(b' ');
    out.extend_from_slice(name.as_bytes());
    out.push(b' ');
    out.extend_from_slice(data.type_tag().unwrap_or("string").as_bytes());
    out.push(b' ');
    out.extend_from_slice(data.printable_len().to_string().as_bytes());
}

fn push_payload(out: &mut Vec<u8>, data: &TioData) {
    if data.is_null() {
        return;
    }
    out.extend_from_slice(&data.printable());
    out.extend_from_slice(b"\r\n");
}

/// Composes one `event` frame: the header line plus any present key/value/
/// metadata payload segments, each CRLF-terminated.
pub fn compose_event(handle: Handle, event: &Event) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"event ");
    out.extend_from_slice(handle.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(event.kind.wire_name().as_bytes());
    push_field(&mut out, "key", &event.key);
    push_field(&mut out, "value", &event.value);
    push_field(&mut out, "metadata", &event.metadata);
    out.extend_from_slice(b"\r\n");
    push_payload(&mut out, &event.key);
    push_payload(&mut out, &event.value);
    push_payload(&mut out, &event.metadata);
    out
}

pub fn compose_answer_ok() -> Vec<u8> {
    b"answer ok\r\n".to_vec()
}

pub fn compose_answer_ok_payload(payload: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"answer ok ");
    out.extend_from_slice(payload.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

pub fn compose_answer_error(message: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"answer error ");
    out.extend_from_slice(message.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

pub fn compose_going_binary() -> Vec<u8> {
    b"going binary\r\n".to_vec()
}

pub fn compose_query_open(query_id: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"answer ok query ");
    out.extend_from_slice(query_id.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// One `query <id> item ...` frame, same key/value/metadata layout as an
/// event frame.
pub fn compose_query_item(query_id: u64, key: &TioData, value: &TioData, metadata: &TioData) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"query ");
    out.extend_from_slice(query_id.to_string().as_bytes());
    out.extend_from_slice(b" item");
    push_field(&mut out, "key", key);
    push_field(&mut out, "value", value);
    push_field(&mut out, "metadata", metadata);
    out.extend_from_slice(b"\r\n");
    push_payload(&mut out, key);
    push_payload(&mut out, value);
    push_payload(&mut out, metadata);
    out
}

pub fn compose_query_end(query_id: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"query ");
    out.extend_from_slice(query_id.to_string().as_bytes());
    out.extend_from_slice(b" end\r\n");
    out
}
