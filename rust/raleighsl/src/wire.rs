// raleighsl: TLV body fields
// Request and response bodies are flat sequences of (field_id, length)
// headers (zcl field codec) followed by the field payload. Decoders ignore
// unknown fields, which is what lets the dispatcher hand a whole request
// body to an object plugin.

use crate::error::{StoreError, StoreResult};
use zcl_core::coding::{decode_field, decode_uint, encode_field, encode_uint, uint_size, FIELD_MAX_SIZE};

pub const FIELD_NAME: u16 = 1;
pub const FIELD_TYPE_UUID: u16 = 2;
pub const FIELD_OID: u16 = 3;
pub const FIELD_VALUE: u16 = 4;
pub const FIELD_CAS: u16 = 5;
pub const FIELD_DELTA: u16 = 6;
pub const FIELD_ERROR: u16 = 7;

/// Append a raw bytes field.
pub fn put_bytes(out: &mut Vec<u8>, field_id: u16, data: &[u8]) {
    let mut head = [0u8; FIELD_MAX_SIZE];
    let n = encode_field(&mut head, field_id, data.len() as u64);
    out.extend_from_slice(&head[..n]);
    out.extend_from_slice(data);
}

/// Append a minimal-width u64 field.
pub fn put_u64(out: &mut Vec<u8>, field_id: u16, value: u64) {
    let width = uint_size(value);
    let mut head = [0u8; FIELD_MAX_SIZE];
    let n = encode_field(&mut head, field_id, width as u64);
    out.extend_from_slice(&head[..n]);
    let mut scratch = [0u8; 8];
    encode_uint(&mut scratch, width, value);
    out.extend_from_slice(&scratch[..width]);
}

/// Iterate `(field_id, payload)` pairs of a body. Truncated field headers
/// or payloads fail with `InvalidArgument`.
pub fn fields(body: &[u8]) -> impl Iterator<Item = StoreResult<(u16, &[u8])>> {
    let mut at = 0usize;
    std::iter::from_fn(move || {
        if at >= body.len() {
            return None;
        }
        match decode_field(&body[at..]) {
            Ok((id, len, consumed)) => {
                let start = at + consumed;
                let end = start + len as usize;
                if end > body.len() {
                    at = body.len();
                    return Some(Err(StoreError::InvalidArgument(
                        "field payload truncated".into(),
                    )));
                }
                at = end;
                Some(Ok((id, &body[start..end])))
            }
            Err(_) => {
                at = body.len();
                Some(Err(StoreError::InvalidArgument(
                    "field header truncated".into(),
                )))
            }
        }
    })
}

/// First occurrence of a bytes field.
pub fn get_bytes<'a>(body: &'a [u8], field_id: u16) -> StoreResult<Option<&'a [u8]>> {
    for field in fields(body) {
        let (id, payload) = field?;
        if id == field_id {
            return Ok(Some(payload));
        }
    }
    Ok(None)
}

/// First occurrence of a u64 field.
pub fn get_u64(body: &[u8], field_id: u16) -> StoreResult<Option<u64>> {
    match get_bytes(body, field_id)? {
        Some(payload) => {
            if payload.is_empty() || payload.len() > 8 {
                return Err(StoreError::InvalidArgument("bad integer width".into()));
            }
            Ok(Some(decode_uint(payload, payload.len())))
        }
        None => Ok(None),
    }
}

/// Required-field variant of [`get_u64`].
pub fn need_u64(body: &[u8], field_id: u16) -> StoreResult<u64> {
    get_u64(body, field_id)?
        .ok_or_else(|| StoreError::InvalidArgument(format!("missing field {field_id}")))
}

/// Required-field variant of [`get_bytes`].
pub fn need_bytes<'a>(body: &'a [u8], field_id: u16) -> StoreResult<&'a [u8]> {
    get_bytes(body, field_id)?
        .ok_or_else(|| StoreError::InvalidArgument(format!("missing field {field_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_fields_round_trip() {
        let mut body = Vec::new();
        put_bytes(&mut body, FIELD_NAME, b"hits");
        put_u64(&mut body, FIELD_VALUE, 500);
        put_u64(&mut body, FIELD_CAS, 0);
        assert_eq!(need_bytes(&body, FIELD_NAME).unwrap(), b"hits");
        assert_eq!(need_u64(&body, FIELD_VALUE).unwrap(), 500);
        assert_eq!(need_u64(&body, FIELD_CAS).unwrap(), 0);
        assert_eq!(get_u64(&body, FIELD_DELTA).unwrap(), None);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut body = Vec::new();
        put_bytes(&mut body, 200, b"opaque");
        put_u64(&mut body, FIELD_OID, 42);
        assert_eq!(need_u64(&body, FIELD_OID).unwrap(), 42);
    }

    #[test]
    fn test_truncated_body_is_invalid() {
        let mut body = Vec::new();
        put_bytes(&mut body, FIELD_NAME, b"counter");
        body.truncate(body.len() - 3);
        assert!(matches!(
            need_bytes(&body, FIELD_NAME),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_field_sequence_round_trip() {
        use proptest::prelude::*;
        proptest!(|(entries in proptest::collection::vec(
            (1u16..64, proptest::collection::vec(any::<u8>(), 0..40)), 0..16))| {
            let mut body = Vec::new();
            for (id, payload) in &entries {
                put_bytes(&mut body, *id, payload);
            }
            let decoded: Vec<(u16, Vec<u8>)> = fields(&body)
                .map(|f| f.map(|(id, p)| (id, p.to_vec())))
                .collect::<StoreResult<_>>()
                .unwrap();
            prop_assert_eq!(decoded, entries);
        });
    }
}
