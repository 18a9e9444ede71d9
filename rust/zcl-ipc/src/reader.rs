// zcl-ipc: inbound frame reader
// Resumable state machine: bytes arrive in arbitrary slices, leftovers are
// carried in a chunk queue, and no state advances past what has been fully
// validated. Each complete frame drives a MsgSink through alloc -> parse*
// -> exec, with exec invoked exactly once.

use crate::frame::{decode_frame_head, FRAME_HEAD_MAX};
use crate::head::{decode_msg_head, MsgHead, MSG_HEAD_MAX};
use crate::IpcError;
use zcl_buffers::ChunkQ;

/// Read scratch used by connection drivers; the reader itself accepts any
/// slice size.
pub const READ_BUF_SIZE: usize = 256;

/// Outcome of one `parse` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parse {
    /// This many bytes were consumed; the rest stays buffered.
    Consumed(usize),
    /// Unrecoverable request; the connection must close.
    Fatal,
}

/// Receives inbound messages from a [`FrameReader`].
pub trait MsgSink {
    type Ctx;

    /// Allocate the context for a frame; `None` is fatal.
    fn alloc(&mut self, head: &MsgHead, body_len: u32) -> Option<Self::Ctx>;

    /// Stream body bytes into the context.
    fn parse(&mut self, ctx: &mut Self::Ctx, data: &[u8]) -> Parse;

    /// The frame is complete.
    fn exec(&mut self, ctx: Self::Ctx);
}

enum ReaderState<C> {
    /// Waiting for a complete frame header.
    FrameHead,
    /// Discarding opaque forward data.
    ForwardData { remaining: u32, payload_len: u32 },
    /// Waiting for a complete message head.
    MsgHead { payload_len: u32 },
    /// Streaming the body into the sink.
    Body { ctx: C, remaining: u32 },
}

/// Inbound frame assembler.
pub struct FrameReader<S: MsgSink> {
    carry: ChunkQ,
    state: ReaderState<S::Ctx>,
}

impl<S: MsgSink> FrameReader<S> {
    pub fn new() -> Self {
        Self {
            carry: ChunkQ::with_chunk_size(READ_BUF_SIZE),
            state: ReaderState::FrameHead,
        }
    }

    /// Bytes buffered but not yet consumed by a frame.
    pub fn buffered(&self) -> usize {
        self.carry.size()
    }

    /// Feed freshly-read bytes and drive the sink as far as possible.
    pub fn feed(&mut self, data: &[u8], sink: &mut S) -> Result<(), IpcError> {
        self.carry.append(data);
        loop {
            match std::mem::replace(&mut self.state, ReaderState::FrameHead) {
                ReaderState::FrameHead => {
                    let mut scratch = [0u8; FRAME_HEAD_MAX];
                    let got = self.carry.read_at(0, &mut scratch);
                    match decode_frame_head(&scratch[..got]) {
                        Ok(frame) => {
                            if frame.fwd_len > frame.frame_len {
                                return Err(IpcError::Protocol("forward length exceeds frame"));
                            }
                            self.carry.remove(frame.head_len);
                            self.state = ReaderState::ForwardData {
                                remaining: frame.fwd_len,
                                payload_len: frame.payload_len(),
                            };
                        }
                        Err(_) => {
                            // partial header: wait for more bytes
                            self.state = ReaderState::FrameHead;
                            return Ok(());
                        }
                    }
                }
                ReaderState::ForwardData {
                    remaining,
                    payload_len,
                } => {
                    // the core does not interpret forward data
                    let dropped = self.carry.remove(remaining as usize) as u32;
                    if dropped < remaining {
                        self.state = ReaderState::ForwardData {
                            remaining: remaining - dropped,
                            payload_len,
                        };
                        return Ok(());
                    }
                    self.state = ReaderState::MsgHead { payload_len };
                }
                ReaderState::MsgHead { payload_len } => {
                    let mut scratch = [0u8; MSG_HEAD_MAX];
                    let got = self.carry.read_at(0, &mut scratch);
                    match decode_msg_head(&scratch[..got]) {
                        Ok((head, consumed)) => {
                            if consumed as u32 > payload_len {
                                return Err(IpcError::Protocol("message head exceeds payload"));
                            }
                            self.carry.remove(consumed);
                            let body_len = payload_len - consumed as u32;
                            let Some(ctx) = sink.alloc(&head, body_len) else {
                                return Err(IpcError::Protocol("message context refused"));
                            };
                            self.state = ReaderState::Body {
                                ctx,
                                remaining: body_len,
                            };
                        }
                        Err(_) => {
                            self.state = ReaderState::MsgHead { payload_len };
                            return Ok(());
                        }
                    }
                }
                ReaderState::Body { mut ctx, remaining } => {
                    let mut remaining = remaining;
                    while remaining > 0 && !self.carry.is_empty() {
                        let mut scratch = [0u8; READ_BUF_SIZE];
                        let want = (remaining as usize).min(scratch.len());
                        let got = self.carry.read_at(0, &mut scratch[..want]);
                        match sink.parse(&mut ctx, &scratch[..got]) {
                            Parse::Consumed(n) => {
                                debug_assert!(n <= got);
                                self.carry.remove(n);
                                remaining -= n as u32;
                                if n < got {
                                    // parser wants a longer contiguous run
                                    break;
                                }
                            }
                            Parse::Fatal => {
                                return Err(IpcError::Protocol("request body rejected"));
                            }
                        }
                    }
                    if remaining > 0 {
                        self.state = ReaderState::Body { ctx, remaining };
                        return Ok(());
                    }
                    sink.exec(ctx);
                    // fall through: another frame may already be buffered
                }
            }
        }
    }
}

impl<S: MsgSink> Default for FrameReader<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame_head;
    use crate::head::encode_msg_head;
    use crate::PKG_TYPE_REQUEST;

    struct CollectSink {
        frames: Vec<(MsgHead, Vec<u8>)>,
        execs: usize,
    }

    impl CollectSink {
        fn new() -> Self {
            Self {
                frames: Vec::new(),
                execs: 0,
            }
        }
    }

    impl MsgSink for CollectSink {
        type Ctx = (MsgHead, Vec<u8>);

        fn alloc(&mut self, head: &MsgHead, body_len: u32) -> Option<Self::Ctx> {
            Some((*head, Vec::with_capacity(body_len as usize)))
        }

        fn parse(&mut self, ctx: &mut Self::Ctx, data: &[u8]) -> Parse {
            ctx.1.extend_from_slice(data);
            Parse::Consumed(data.len())
        }

        fn exec(&mut self, ctx: Self::Ctx) {
            self.execs += 1;
            self.frames.push(ctx);
        }
    }

    fn encode_request(msg_type: u64, req_id: u64, body: &[u8], fwd: &[u8]) -> Vec<u8> {
        let head = MsgHead::request(msg_type, req_id);
        let mut payload = Vec::new();
        encode_msg_head(&mut payload, &head);
        payload.extend_from_slice(body);
        let mut out = Vec::new();
        encode_frame_head(&mut out, PKG_TYPE_REQUEST, fwd, payload.len() as u32);
        out.extend_from_slice(&payload);
        out
    }

    #[test]
    fn test_single_frame() {
        let wire = encode_request(42, 7, b"hello body", &[]);
        let mut sink = CollectSink::new();
        let mut reader = FrameReader::new();
        reader.feed(&wire, &mut sink).unwrap();
        assert_eq!(sink.execs, 1);
        assert_eq!(sink.frames[0].0.msg_type, 42);
        assert_eq!(sink.frames[0].0.req_id, 7);
        assert_eq!(sink.frames[0].1, b"hello body");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_resumption_across_odd_chunks() {
        // a 1024-byte frame delivered as [2, 1, 5, 1000, 16] execs once
        let body = vec![0x5au8; 1004];
        let wire = encode_request(9, 1, &body, &[]);
        assert!(wire.len() > 1024);
        let mut sink = CollectSink::new();
        let mut reader = FrameReader::new();
        let mut at = 0usize;
        for size in [2usize, 1, 5, 1000, wire.len() - 1008] {
            let end = (at + size).min(wire.len());
            reader.feed(&wire[at..end], &mut sink).unwrap();
            at = end;
        }
        assert_eq!(sink.execs, 1);
        assert_eq!(sink.frames[0].1, body);
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let wire = encode_request(3, 2, b"tiny", b"fw");
        let mut sink = CollectSink::new();
        let mut reader = FrameReader::new();
        for b in &wire {
            reader.feed(std::slice::from_ref(b), &mut sink).unwrap();
        }
        assert_eq!(sink.execs, 1);
        assert_eq!(sink.frames[0].1, b"tiny");
    }

    #[test]
    fn test_back_to_back_frames_in_one_read() {
        let mut wire = encode_request(1, 1, b"first", &[]);
        wire.extend_from_slice(&encode_request(2, 2, b"second", &[]));
        let mut sink = CollectSink::new();
        let mut reader = FrameReader::new();
        reader.feed(&wire, &mut sink).unwrap();
        assert_eq!(sink.execs, 2);
        assert_eq!(sink.frames[0].1, b"first");
        assert_eq!(sink.frames[1].1, b"second");
    }

    #[test]
    fn test_forward_data_is_skipped() {
        let wire = encode_request(5, 5, b"payload", b"proxy-route");
        let mut sink = CollectSink::new();
        let mut reader = FrameReader::new();
        reader.feed(&wire, &mut sink).unwrap();
        assert_eq!(sink.execs, 1);
        assert_eq!(sink.frames[0].1, b"payload");
    }

    #[test]
    fn test_fatal_on_bad_lengths() {
        // frame header whose forward length exceeds the frame length
        let wire = [0x04u8, 0x01, 0x05];
        let mut sink = CollectSink::new();
        let mut reader = FrameReader::new();
        assert!(reader.feed(&wire, &mut sink).is_err());
    }
}
