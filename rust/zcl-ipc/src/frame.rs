// zcl-ipc: frame header codec
//
//   byte0: bits 7..4 = pkg_type, bits 3..2 = fwd_len_bytes (0..3),
//          bits 1..0 = frame_len_bytes - 1 (1..4)
//   then the frame length (big-endian), the forward length (may be absent)
//   and the opaque forward data. The frame length counts every byte after
//   the frame header: forward data plus payload.
//
// Minimum header is 2 bytes, maximum 8.

use zcl_core::coding::{decode_uint, encode_uint, uint_size, Needed};

pub const PKG_TYPE_REQUEST: u8 = 0;
pub const PKG_TYPE_RESPONSE: u8 = 1;

/// Largest encoded frame header: byte0 + 4 length bytes + 3 forward-length
/// bytes.
pub const FRAME_HEAD_MAX: usize = 8;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHead {
    pub pkg_type: u8,
    /// Bytes after the frame header (forward data + payload).
    pub frame_len: u32,
    /// Leading bytes of `frame_len` that are opaque forward data.
    pub fwd_len: u32,
    /// Encoded header size.
    pub head_len: usize,
}

impl FrameHead {
    /// Payload bytes following the forward data.
    #[inline]
    pub fn payload_len(&self) -> u32 {
        self.frame_len - self.fwd_len
    }
}

/// Encode a frame header for `payload_len` payload bytes plus `fwd_data`,
/// appending to `out`, followed by the forward data itself.
pub fn encode_frame_head(out: &mut Vec<u8>, pkg_type: u8, fwd_data: &[u8], payload_len: u32) {
    debug_assert!(pkg_type <= 0xf);
    debug_assert!(fwd_data.len() < (1 << 24));
    let frame_len = fwd_data.len() as u32 + payload_len;
    let frame_len_bytes = uint_size(u64::from(frame_len)).min(4);
    let fwd_len_bytes = if fwd_data.is_empty() {
        0
    } else {
        uint_size(fwd_data.len() as u64).min(3)
    };
    out.push((pkg_type << 4) | ((fwd_len_bytes as u8) << 2) | ((frame_len_bytes as u8) - 1));
    let mut scratch = [0u8; 4];
    encode_uint(&mut scratch, frame_len_bytes, u64::from(frame_len));
    out.extend_from_slice(&scratch[..frame_len_bytes]);
    if fwd_len_bytes > 0 {
        encode_uint(&mut scratch, fwd_len_bytes, fwd_data.len() as u64);
        out.extend_from_slice(&scratch[..fwd_len_bytes]);
        out.extend_from_slice(fwd_data);
    }
}

/// Decode a frame header from the start of `buf`. Truncated input is
/// recoverable: the caller keeps reading.
pub fn decode_frame_head(buf: &[u8]) -> Result<FrameHead, Needed> {
    if buf.is_empty() {
        return Err(Needed(1));
    }
    let byte0 = buf[0];
    let fwd_len_bytes = ((byte0 >> 2) & 0x3) as usize;
    let frame_len_bytes = ((byte0 & 0x3) as usize) + 1;
    let head_len = 1 + frame_len_bytes + fwd_len_bytes;
    if buf.len() < head_len {
        return Err(Needed(head_len - buf.len()));
    }
    let frame_len = decode_uint(&buf[1..], frame_len_bytes) as u32;
    let fwd_len = if fwd_len_bytes > 0 {
        decode_uint(&buf[1 + frame_len_bytes..], fwd_len_bytes) as u32
    } else {
        0
    };
    Ok(FrameHead {
        pkg_type: byte0 >> 4,
        frame_len,
        fwd_len,
        head_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_minimum_header_is_two_bytes() {
        let mut out = Vec::new();
        encode_frame_head(&mut out, PKG_TYPE_REQUEST, &[], 5);
        assert_eq!(out.len(), 2);
        let head = decode_frame_head(&out).unwrap();
        assert_eq!(head.head_len, 2);
        assert_eq!(head.frame_len, 5);
        assert_eq!(head.fwd_len, 0);
    }

    #[test]
    fn test_forward_data_counts_into_frame_len() {
        let mut out = Vec::new();
        encode_frame_head(&mut out, PKG_TYPE_RESPONSE, b"route", 100);
        let head = decode_frame_head(&out).unwrap();
        assert_eq!(head.pkg_type, PKG_TYPE_RESPONSE);
        assert_eq!(head.fwd_len, 5);
        assert_eq!(head.frame_len, 105);
        assert_eq!(head.payload_len(), 100);
        assert_eq!(&out[head.head_len..], b"route");
    }

    #[test]
    fn test_truncated_header_is_recoverable() {
        let mut out = Vec::new();
        encode_frame_head(&mut out, 3, b"fw", 70_000);
        let head = decode_frame_head(&out).unwrap();
        for cut in 0..head.head_len {
            match decode_frame_head(&out[..cut]) {
                Err(Needed(n)) => {
                    assert_eq!(cut + n, if cut == 0 { 1 } else { head.head_len })
                }
                Ok(_) => panic!("decoded a truncated header"),
            }
        }
    }

    proptest! {
        #[test]
        fn prop_frame_head_round_trip(
            pkg_type in 0u8..16,
            fwd in proptest::collection::vec(any::<u8>(), 0..64),
            payload_len in 0u32..16_000_000,
        ) {
            let mut out = Vec::new();
            encode_frame_head(&mut out, pkg_type, &fwd, payload_len);
            let head = decode_frame_head(&out).unwrap();
            prop_assert_eq!(head.pkg_type, pkg_type);
            prop_assert_eq!(head.fwd_len as usize, fwd.len());
            prop_assert_eq!(head.payload_len(), payload_len);
            prop_assert_eq!(&out[head.head_len..], &fwd[..]);
        }
    }
}
