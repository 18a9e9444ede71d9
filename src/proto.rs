// raleigh-server: message table and body codecs
// Message types carried in the frame head; bodies are TLV fields (see
// raleighsl::wire). Helpers here are shared by the dispatcher, the test
// client and embedders.

use raleighsl::objects::counter;
use raleighsl::wire::{self, FIELD_CAS, FIELD_DELTA, FIELD_ERROR, FIELD_NAME, FIELD_OID, FIELD_TYPE_UUID, FIELD_VALUE};
use raleighsl::{StoreError, StoreResult};
use uuid::Uuid;

pub const MSG_PING: u64 = 0x01;
pub const MSG_OPEN_FS: u64 = 0x02;

pub const MSG_CREATE_OBJECT: u64 = 0x10;
pub const MSG_LOOKUP_OBJECT: u64 = 0x11;
pub const MSG_UNLINK_OBJECT: u64 = 0x12;

pub const MSG_COUNTER_GET: u64 = 0x20;
pub const MSG_COUNTER_SET: u64 = 0x21;
pub const MSG_COUNTER_CAS: u64 = 0x22;
pub const MSG_COUNTER_INCR: u64 = 0x23;
pub const MSG_COUNTER_DECR: u64 = 0x24;

/// Counter op code for a counter message type.
pub fn counter_op(msg_type: u64) -> Option<u32> {
    match msg_type {
        MSG_COUNTER_GET => Some(counter::OP_GET),
        MSG_COUNTER_SET => Some(counter::OP_SET),
        MSG_COUNTER_CAS => Some(counter::OP_CAS),
        MSG_COUNTER_INCR => Some(counter::OP_INCR),
        MSG_COUNTER_DECR => Some(counter::OP_DECR),
        _ => None,
    }
}

pub fn create_object_body(type_uuid: &Uuid, name: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    wire::put_bytes(&mut out, FIELD_TYPE_UUID, type_uuid.as_bytes());
    wire::put_bytes(&mut out, FIELD_NAME, name);
    out
}

pub fn name_body(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    wire::put_bytes(&mut out, FIELD_NAME, name);
    out
}

pub fn counter_set_body(name: &[u8], value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    wire::put_bytes(&mut out, FIELD_NAME, name);
    wire::put_u64(&mut out, FIELD_VALUE, value);
    out
}

pub fn counter_cas_body(name: &[u8], value: u64, expected_cas: u64) -> Vec<u8> {
    let mut out = Vec::new();
    wire::put_bytes(&mut out, FIELD_NAME, name);
    wire::put_u64(&mut out, FIELD_VALUE, value);
    wire::put_u64(&mut out, FIELD_CAS, expected_cas);
    out
}

pub fn counter_delta_body(name: &[u8], delta: u64) -> Vec<u8> {
    let mut out = Vec::new();
    wire::put_bytes(&mut out, FIELD_NAME, name);
    wire::put_u64(&mut out, FIELD_DELTA, delta);
    out
}

/// (value, cas) from a counter response body.
pub fn parse_counter_reply(body: &[u8]) -> StoreResult<(u64, u64)> {
    Ok((
        wire::need_u64(body, FIELD_VALUE)?,
        wire::need_u64(body, FIELD_CAS)?,
    ))
}

/// oid from a naming response body.
pub fn parse_oid_reply(body: &[u8]) -> StoreResult<u64> {
    wire::need_u64(body, FIELD_OID)
}

/// The error field of a response body, if any.
pub fn reply_error(body: &[u8]) -> Option<StoreError> {
    let code = wire::get_u64(body, FIELD_ERROR).ok()??;
    StoreError::from_code(code as u16)
}
