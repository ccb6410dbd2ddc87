use crate::data::TioData;
use crate::event::Event;
use crate::handle::Handle;

const FIELD_COMMAND: u8 = 1;
const FIELD_HANDLE: u8 = 2;
const FIELD_EVENT: u8 = 3;
const FIELD_QUERY_ID: u8 = 4;
const FIELD_KEY: u8 = 5;
const FIELD_VALUE: u8 = 6;
const FIELD_METADATA: u8 = 7;
/// Supplemented beyond the distilled spec's field list: carries the message
/// for a structured binary error answer (see `SPEC_FULL.md` §7).
const FIELD_ERROR: u8 = 8;

const COMMAND_ANSWER: u8 = 1;
const COMMAND_EVENT: u8 = 2;
const COMMAND_QUERY_ITEM: u8 = 3;

const TYPE_INT: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;

/// Size of the fixed `message_size` header preceding every message body.
pub const HEADER_SIZE: usize = 4;

pub fn read_message_size(header: &[u8; HEADER_SIZE]) -> u32 {
    u32::from_le_bytes(*header)
}

fn write_u8_field(out: &mut Vec<u8>, field_id: u8, value: u8) {
    out.push(field_id);
    out.push(TYPE_INT);
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(&(value as i64).to_le_bytes()[..4]);
}

fn write_u64_field(out: &mut Vec<u8>, field_id: u8, value: u64) {
    out.push(field_id);
    out.push(TYPE_INT);
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&(value as i64).to_le_bytes());
}

fn write_string_field(out: &mut Vec<u8>, field_id: u8, value: &[u8]) {
    out.push(field_id);
    out.push(TYPE_STRING);
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
}

fn write_data_field(out: &mut Vec<u8>, field_id: u8, data: &TioData) {
    match data {
        TioData::Null => {}
        TioData::Int(n) => {
            out.push(field_id);
            out.push(TYPE_INT);
            out.extend_from_slice(&8u32.to_le_bytes());
            out.extend_from_slice(&n.to_le_bytes());
        }
        TioData::Double(d) => {
            out.push(field_id);
            out.push(TYPE_DOUBLE);
            out.extend_from_slice(&8u32.to_le_bytes());
            out.extend_from_slice(&d.to_le_bytes());
        }
        TioData::String(bytes) => write_string_field(out, field_id, bytes),
    }
}

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Composes one binary event message: `COMMAND = EVENT`, `HANDLE`,
/// `EVENT = <code>`, plus whichever of key/value/metadata are present.
pub fn compose_event(handle: Handle, event: &Event) -> Vec<u8> {
    let mut body = Vec::new();
    write_u8_field(&mut body, FIELD_COMMAND, COMMAND_EVENT);
    write_u64_field(&mut body, FIELD_HANDLE, handle);
    write_u8_field(&mut body, FIELD_EVENT, event.kind.wire_code() as u8);
    write_data_field(&mut body, FIELD_KEY, &event.key);
    write_data_field(&mut body, FIELD_VALUE, &event.value);
    write_data_field(&mut body, FIELD_METADATA, &event.metadata);
    frame(body)
}

pub fn compose_answer_ok() -> Vec<u8> {
    let mut body = Vec::new();
    write_u8_field(&mut body, FIELD_COMMAND, COMMAND_ANSWER);
    frame(body)
}

pub fn compose_answer_error(message: &str) -> Vec<u8> {
    let mut body = Vec::new();
    write_u8_field(&mut body, FIELD_COMMAND, COMMAND_ANSWER);
    write_string_field(&mut body, FIELD_ERROR, message.as_bytes());
    frame(body)
}

/// One query-result item. `record` is `None` for the empty terminator item
/// that signals end-of-stream.
pub fn compose_query_item(query_id: u64, record: Option<(&TioData, &TioData, &TioData)>) -> Vec<u8> {
    let mut body = Vec::new();
    write_u8_field(&mut body, FIELD_COMMAND, COMMAND_QUERY_ITEM);
    write_u64_field(&mut body, FIELD_QUERY_ID, query_id);
    if let Some((key, value, metadata)) = record {
        write_data_field(&mut body, FIELD_KEY, key);
        write_data_field(&mut body, FIELD_VALUE, value);
        write_data_field(&mut body, FIELD_METADATA, metadata);
    }
    frame(body)
}
