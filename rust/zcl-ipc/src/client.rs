// zcl-ipc: IPC client
// Thin request/response client for embedders and tests: call() assigns a
// req_id, parks the caller on a oneshot channel, and the read task resolves
// it when the matching response frame arrives.

use crate::frame::PKG_TYPE_REQUEST;
use crate::head::MsgHead;
use crate::reader::{FrameReader, MsgSink, Parse, READ_BUF_SIZE};
use crate::writer::{MsgQueue, OutMsg};
use crate::IpcError;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Notify};
use tracing::trace;
use zcl_buffers::DBuf;
use zcl_collections::OpenHashMap;

type Pending = Arc<Mutex<OpenHashMap<u64, oneshot::Sender<(MsgHead, Vec<u8>)>>>>;

/// Request/response client over one TCP connection. Dropping the client
/// tears the connection down; callers parked in [`IpcClient::call`] see
/// [`IpcError::Closed`].
pub struct IpcClient {
    next_req: AtomicU64,
    pending: Pending,
    queue: Arc<MsgQueue>,
    writable: Arc<Notify>,
    closed: Arc<AtomicBool>,
    reader_task: tokio::task::JoinHandle<()>,
    writer_task: tokio::task::JoinHandle<()>,
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        self.pending.lock().drain();
    }
}

struct ClientSink {
    pending: Pending,
}

impl MsgSink for ClientSink {
    type Ctx = (MsgHead, Vec<u8>);

    fn alloc(&mut self, head: &MsgHead, body_len: u32) -> Option<Self::Ctx> {
        Some((*head, Vec::with_capacity(body_len as usize)))
    }

    fn parse(&mut self, ctx: &mut Self::Ctx, data: &[u8]) -> Parse {
        ctx.1.extend_from_slice(data);
        Parse::Consumed(data.len())
    }

    fn exec(&mut self, ctx: Self::Ctx) {
        let (head, body) = ctx;
        let waiter = self.pending.lock().remove(&head.req_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send((head, body));
            }
            None => trace!(req_id = head.req_id, "response without a waiter"),
        }
    }
}

impl IpcClient {
    /// Connect and spawn the connection's read/write tasks on the current
    /// tokio runtime.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Arc<IpcClient>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut rd, mut wr) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(OpenHashMap::new()));
        let queue = Arc::new(MsgQueue::new());
        let writable = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));

        // writer task: flush whenever a call enqueues a request
        let writer_task = {
            let queue = Arc::clone(&queue);
            let writable = Arc::clone(&writable);
            tokio::spawn(async move {
                loop {
                    writable.notified().await;
                    loop {
                        match queue.flush(&mut wr, |_| {}).await {
                            Ok((_, true)) => continue,
                            Ok((_, false)) => break,
                            Err(_) => return,
                        }
                    }
                }
            })
        };

        // reader task: resolve pending calls; on close, drop every waiter
        let reader_task = {
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                let mut reader = FrameReader::<ClientSink>::new();
                let mut sink = ClientSink {
                    pending: Arc::clone(&pending),
                };
                let mut scratch = [0u8; READ_BUF_SIZE];
                loop {
                    match rd.read(&mut scratch).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if reader.feed(&scratch[..n], &mut sink).is_err() {
                                break;
                            }
                        }
                    }
                }
                // waking the waiters with a dropped sender surfaces Closed
                closed.store(true, Ordering::Release);
                pending.lock().drain();
            })
        };

        Ok(Arc::new(IpcClient {
            next_req: AtomicU64::new(1),
            pending,
            queue,
            writable,
            closed,
            reader_task,
            writer_task,
        }))
    }

    /// Issue a request and wait for the matching response.
    pub async fn call(&self, msg_type: u64, body: Vec<u8>) -> Result<(MsgHead, Vec<u8>), IpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IpcError::Closed);
        }
        let req_id = self.next_req.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(req_id, tx);

        let mut dbuf = DBuf::new();
        dbuf.add(&body);
        let msg = OutMsg::new(
            PKG_TYPE_REQUEST,
            &MsgHead::request(msg_type, req_id),
            &[],
            dbuf,
        );
        self.queue.push(msg);
        self.writable.notify_one();

        rx.await.map_err(|_| IpcError::Closed)
    }
}
