// zcl-ipc: outbound message queue
// Messages are framed at enqueue time: a contiguous header (frame header +
// message head) followed by a dbuf body that may hold zero-copy reference
// records. flush() gathers up to 16 iovec slices from the head of the
// queue, writes once, and removes exactly the bytes written; a partially
// written message stays at the head with its offsets advanced.

use crate::frame::encode_frame_head;
use crate::head::{encode_msg_head, MsgHead};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::io::IoSlice;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use zcl_buffers::DBuf;

/// Max gather entries per flush write.
pub const FLUSH_IOVS: usize = 16;

/// One framed outbound message.
pub struct OutMsg {
    header: Vec<u8>,
    header_off: usize,
    body: DBuf,
    enqueued_at: Instant,
}

impl OutMsg {
    pub fn new(pkg_type: u8, head: &MsgHead, fwd_data: &[u8], body: DBuf) -> Self {
        let mut payload_head = Vec::with_capacity(crate::head::MSG_HEAD_MAX);
        encode_msg_head(&mut payload_head, head);
        let payload_len = (payload_head.len() + body.size()) as u32;
        let mut header = Vec::with_capacity(crate::frame::FRAME_HEAD_MAX + payload_head.len());
        encode_frame_head(&mut header, pkg_type, fwd_data, payload_len);
        header.extend_from_slice(&payload_head);
        Self {
            header,
            header_off: 0,
            body,
            enqueued_at: Instant::now(),
        }
    }

    /// Total unwritten bytes.
    pub fn remaining(&self) -> usize {
        (self.header.len() - self.header_off) + self.body.size()
    }

    fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Microseconds since the message was enqueued.
    pub fn queue_micros(&self) -> u64 {
        self.enqueued_at.elapsed().as_micros() as u64
    }

    fn io_slices<'a>(&'a self, out: &mut SmallVec<[IoSlice<'a>; FLUSH_IOVS]>) {
        if self.header_off < self.header.len() {
            out.push(IoSlice::new(&self.header[self.header_off..]));
        }
        for slice in self.body.iov_slices(FLUSH_IOVS - out.len()) {
            if out.len() == FLUSH_IOVS {
                break;
            }
            out.push(IoSlice::new(slice));
        }
    }

    /// Drop `n` written bytes from the front of the message.
    fn consume(&mut self, mut n: usize) -> usize {
        let from_header = n.min(self.header.len() - self.header_off);
        self.header_off += from_header;
        n -= from_header;
        let from_body = self.body.remove(n);
        from_header + from_body
    }
}

/// Per-client outbound FIFO.
pub struct MsgQueue {
    inner: Mutex<VecDeque<OutMsg>>,
}

impl MsgQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue a message; returns true when the queue was empty (the
    /// caller should arm writability).
    pub fn push(&self, msg: OutMsg) -> bool {
        let mut queue = self.inner.lock();
        let was_empty = queue.is_empty();
        queue.push_back(msg);
        was_empty
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    fn take_head_batch(&self) -> Vec<OutMsg> {
        let mut queue = self.inner.lock();
        let mut batch = Vec::new();
        let mut iovs = 0usize;
        while iovs < FLUSH_IOVS {
            let Some(msg) = queue.pop_front() else {
                break;
            };
            // header + a conservative one slice per body record chunk
            iovs += 1 + msg.body.iov_slices(FLUSH_IOVS).len();
            batch.push(msg);
        }
        batch
    }

    fn requeue_front(&self, pending: Vec<OutMsg>) {
        let mut queue = self.inner.lock();
        for msg in pending.into_iter().rev() {
            queue.push_front(msg);
        }
    }

    /// Write queued messages to `writer`. Returns `(written, has_more)`;
    /// the per-message queue latency is reported through `on_sent` for each
    /// fully flushed message. Only one flusher (the connection driver) may
    /// run at a time.
    pub async fn flush<W, F>(
        &self,
        writer: &mut W,
        mut on_sent: F,
    ) -> std::io::Result<(usize, bool)>
    where
        W: AsyncWriteExt + Unpin,
        F: FnMut(u64),
    {
        let mut batch = self.take_head_batch();
        if batch.is_empty() {
            return Ok((0, false));
        }

        let written = {
            let mut iovs: SmallVec<[IoSlice<'_>; FLUSH_IOVS]> = SmallVec::new();
            for msg in &batch {
                if iovs.len() == FLUSH_IOVS {
                    break;
                }
                msg.io_slices(&mut iovs);
            }
            let result = writer.write_vectored(&iovs).await;
            drop(iovs);
            match result {
                Ok(n) => n,
                Err(err) => {
                    self.requeue_front(batch);
                    return Err(err);
                }
            }
        };

        let mut left = written;
        let mut pending = Vec::new();
        for mut msg in batch {
            if left > 0 {
                left -= msg.consume(left);
            }
            if msg.is_done() {
                on_sent(msg.queue_micros());
            } else {
                pending.push(msg);
            }
        }
        self.requeue_front(pending);
        Ok((written, !self.is_empty()))
    }
}

impl Default for MsgQueue {
    fn default() -> Self {
        Self::new()
    }
}
