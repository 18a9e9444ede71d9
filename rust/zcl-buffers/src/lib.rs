// zcl-buffers: buffering primitives for the zcl I/O stack

//! # zcl-buffers
//!
//! - **chunkq**: FIFO of fixed-size chunks used to coalesce TCP reads, with
//!   search/tokenize/compare helpers for byte-stream parsing.
//! - **dbuf**: a chain of 256-byte nodes aggregating many small writes into
//!   length-prefixed records, with zero-copy reference records and an
//!   iovec-style gather reader. Outbound messages are built on this.
//! - **ringbuf**: power-of-two byte ring used to stage large inbound frame
//!   bodies.

pub mod chunkq;
pub mod dbuf;
pub mod ringbuf;

pub use chunkq::{ChunkQ, Extent};
pub use dbuf::DBuf;
pub use ringbuf::RingBuf;
