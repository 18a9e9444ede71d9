// zcl-core: primitives shared by the zcl runtime and the raleighsl store

//! # zcl-core
//!
//! Foundation crate for the zcl runtime:
//!
//! - **coding**: big-endian fixed-width codecs, minimal-byte variable-width
//!   integers and the `(field_id, length)` field codec used by the wire
//!   protocol bodies.
//! - **bytes**: a reference-counted immutable byte buffer with cheap clones
//!   and sub-slicing, for decoded payloads that must outlive the parse
//!   buffer.
//! - **rwcsem**: the read/write/commit/lock semaphore coordinating
//!   concurrent access to store objects.
//! - **histogram**: fixed-bound latency histograms (5us..5s) used by the
//!   event loop and ipc latency accounting.

pub mod bytes;
pub mod coding;
pub mod histogram;
pub mod rwcsem;

pub use bytes::Bytes;
pub use coding::{decode_field, encode_field, uint_size, Needed};
pub use histogram::{Histogram, HistogramSnapshot};
pub use rwcsem::{LockMode, RwCSem};
