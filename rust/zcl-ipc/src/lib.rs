// zcl-ipc: RPC wire framing and the IPC server/client scaffolding

//! # zcl-ipc
//!
//! Length-prefixed frames carrying a compact typed message head and an
//! opaque body:
//!
//! - **frame**: the outer frame header codec (pkg type, frame length,
//!   forward data for proxies).
//! - **head**: the message head codec (`msg_type`, `req_id`, `req_type`).
//! - **reader**: inbound state machine with partial-frame resumption; it
//!   drives a [`MsgSink`] through alloc/parse/exec.
//! - **writer**: per-client outbound FIFO of framed messages with
//!   iovec-gather flushing.
//! - **server**/**client**: tokio TCP endpoints placed on the reactor's
//!   cores.

pub mod client;
pub mod frame;
pub mod head;
pub mod reader;
pub mod server;
pub mod writer;

use thiserror::Error;

pub use client::IpcClient;
pub use frame::{FrameHead, PKG_TYPE_REQUEST, PKG_TYPE_RESPONSE};
pub use head::{MsgHead, ReqType};
pub use reader::{FrameReader, MsgSink, Parse};
pub use server::{ClientState, IpcClientHandle, IpcServer, IpcService};
pub use writer::{MsgQueue, OutMsg};

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error("connection closed")]
    Closed,
}
