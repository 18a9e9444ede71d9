// zcl-ipc: message head codec
//
//   head byte: bits 7..5 = msg_type width, bits 4..2 = req_id width,
//              bits 1..0 = req_type
//   then msg_type and req_id, big-endian. Widths range 1..=8 in a 3-bit
//   field, so a width of 8 encodes as 0.

use zcl_core::coding::{decode_uint, encode_uint, uint_size, Needed};

/// Largest encoded message head: head byte + 8-byte msg_type + 8-byte
/// req_id.
pub const MSG_HEAD_MAX: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqType {
    Request = 0,
    Response = 1,
    Event = 2,
    Reserved = 3,
}

impl From<u8> for ReqType {
    fn from(v: u8) -> Self {
        match v & 0x3 {
            0 => ReqType::Request,
            1 => ReqType::Response,
            2 => ReqType::Event,
            _ => ReqType::Reserved,
        }
    }
}

/// The typed head at the start of every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHead {
    pub msg_type: u64,
    pub req_id: u64,
    pub req_type: ReqType,
}

impl MsgHead {
    pub fn request(msg_type: u64, req_id: u64) -> Self {
        Self {
            msg_type,
            req_id,
            req_type: ReqType::Request,
        }
    }

    pub fn response(msg_type: u64, req_id: u64) -> Self {
        Self {
            msg_type,
            req_id,
            req_type: ReqType::Response,
        }
    }

    pub fn encoded_len(&self) -> usize {
        1 + uint_size(self.msg_type) + uint_size(self.req_id)
    }
}

pub fn encode_msg_head(out: &mut Vec<u8>, head: &MsgHead) {
    let mt_bytes = uint_size(head.msg_type);
    let ri_bytes = uint_size(head.req_id);
    out.push(
        (((mt_bytes as u8) & 0x7) << 5) | (((ri_bytes as u8) & 0x7) << 2) | (head.req_type as u8),
    );
    let mut scratch = [0u8; 8];
    encode_uint(&mut scratch, mt_bytes, head.msg_type);
    out.extend_from_slice(&scratch[..mt_bytes]);
    encode_uint(&mut scratch, ri_bytes, head.req_id);
    out.extend_from_slice(&scratch[..ri_bytes]);
}

/// Decode a message head; returns the head and the bytes consumed.
pub fn decode_msg_head(buf: &[u8]) -> Result<(MsgHead, usize), Needed> {
    if buf.is_empty() {
        return Err(Needed(1));
    }
    let byte0 = buf[0];
    let mt_bits = (byte0 >> 5) & 0x7;
    let ri_bits = (byte0 >> 2) & 0x7;
    let mt_bytes = if mt_bits == 0 { 8 } else { mt_bits as usize };
    let ri_bytes = if ri_bits == 0 { 8 } else { ri_bits as usize };
    let total = 1 + mt_bytes + ri_bytes;
    if buf.len() < total {
        return Err(Needed(total - buf.len()));
    }
    let msg_type = decode_uint(&buf[1..], mt_bytes);
    let req_id = decode_uint(&buf[1 + mt_bytes..], ri_bytes);
    Ok((
        MsgHead {
            msg_type,
            req_id,
            req_type: ReqType::from(byte0),
        },
        total,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_width_eight_encodes_as_zero() {
        let head = MsgHead::request(u64::MAX, u64::MAX - 1);
        let mut out = Vec::new();
        encode_msg_head(&mut out, &head);
        assert_eq!(out.len(), MSG_HEAD_MAX);
        assert_eq!(out[0] >> 5, 0);
        let (decoded, consumed) = decode_msg_head(&out).unwrap();
        assert_eq!(decoded, head);
        assert_eq!(consumed, MSG_HEAD_MAX);
    }

    proptest! {
        #[test]
        fn prop_msg_head_round_trip(msg_type in any::<u64>(), req_id in any::<u64>(), rt in 0u8..4) {
            // every (msg_type, req_id, req_type) round-trips bit-exactly
            let head = MsgHead { msg_type, req_id, req_type: ReqType::from(rt) };
            let mut out = Vec::new();
            encode_msg_head(&mut out, &head);
            prop_assert_eq!(out.len(), head.encoded_len());
            let (decoded, consumed) = decode_msg_head(&out).unwrap();
            prop_assert_eq!(decoded, head);
            prop_assert_eq!(consumed, out.len());

            for cut in 1..out.len() {
                prop_assert!(decode_msg_head(&out[..cut]).is_err());
            }
        }
    }
}
