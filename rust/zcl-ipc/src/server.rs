// zcl-ipc: IPC server
// Accepts on one core and spreads connections round-robin across the
// reactor's workers. Every connection is an entity of its core: a single
// local task that alternates between reading frames and flushing the
// outbound queue, so client callbacks are never re-entered concurrently.
//
// Lifecycle: Accepted -> Connected -> Draining -> Closed. A disconnect
// only marks the client Draining; the handle's memory is released when the
// last in-flight request drops its reference.

use crate::head::MsgHead;
use crate::reader::{FrameReader, MsgSink, Parse, READ_BUF_SIZE};
use crate::writer::{MsgQueue, OutMsg};
use crate::PKG_TYPE_RESPONSE;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};
use zcl_buffers::{DBuf, RingBuf};
use zcl_core::Histogram;
use zcl_reactor::{ReactorHandle, WorkerCtx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    Accepted = 0,
    Connected = 1,
    Draining = 2,
    Closed = 3,
}

impl From<u8> for ClientState {
    fn from(v: u8) -> Self {
        match v {
            0 => ClientState::Accepted,
            1 => ClientState::Connected,
            2 => ClientState::Draining,
            _ => ClientState::Closed,
        }
    }
}

/// Shared per-connection state handed to the service.
pub struct IpcClientHandle {
    id: u64,
    core: usize,
    peer: SocketAddr,
    queue: MsgQueue,
    writable: Notify,
    state: AtomicU8,
    inflight: AtomicU32,
    out_latency: Arc<Histogram>,
}

impl IpcClientHandle {
    fn new(id: u64, core: usize, peer: SocketAddr, out_latency: Arc<Histogram>) -> Self {
        Self {
            id,
            core,
            peer,
            queue: MsgQueue::new(),
            writable: Notify::new(),
            state: AtomicU8::new(ClientState::Accepted as u8),
            inflight: AtomicU32::new(0),
            out_latency,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn core(&self) -> usize {
        self.core
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ClientState {
        ClientState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Take a request reference; prevents the client memory from being
    /// reclaimed while the request executes.
    pub fn begin_request(&self) {
        self.inflight.fetch_add(1, Ordering::AcqRel);
    }

    /// Release a request reference; the last one on a draining client
    /// closes it.
    pub fn end_request(&self) {
        let left = self.inflight.fetch_sub(1, Ordering::AcqRel) - 1;
        if left == 0 && self.state() == ClientState::Draining {
            self.set_state(ClientState::Closed);
            debug!(client = self.id, "draining client closed");
        }
    }

    pub fn in_flight(&self) -> u32 {
        self.inflight.load(Ordering::Acquire)
    }

    /// Enqueue a response. Returns false (and discards the message) when
    /// the client is already disconnecting.
    pub fn respond(&self, head: MsgHead, body: DBuf) -> bool {
        if self.state() >= ClientState::Draining {
            trace!(client = self.id, "response discarded, client draining");
            return false;
        }
        let msg = OutMsg::new(PKG_TYPE_RESPONSE, &head, &[], body);
        self.queue.push(msg);
        self.writable.notify_one();
        true
    }
}

/// Application hooks for an [`IpcServer`]. `request` runs to completion on
/// the connection's core; long work must be cut into reactor tasks.
pub trait IpcService: Send + Sync + 'static {
    /// A connection reached Connected; return false to reject it.
    fn connected(&self, client: &Arc<IpcClientHandle>) -> bool {
        let _ = client;
        true
    }

    /// The connection began draining.
    fn disconnected(&self, client: &Arc<IpcClientHandle>);

    /// A complete request frame. Implementations pair every
    /// `begin_request` (already taken by the reader) with
    /// [`IpcClientHandle::end_request`] once the response is enqueued or
    /// dropped.
    fn request(&self, client: &Arc<IpcClientHandle>, head: MsgHead, body: Vec<u8>);
}

struct ConnSink<S> {
    service: Arc<S>,
    client: Arc<IpcClientHandle>,
}

impl<S: IpcService> MsgSink for ConnSink<S> {
    type Ctx = (MsgHead, RingBuf);

    fn alloc(&mut self, head: &MsgHead, body_len: u32) -> Option<Self::Ctx> {
        Some((*head, RingBuf::new((body_len as usize).max(2))))
    }

    fn parse(&mut self, ctx: &mut Self::Ctx, data: &[u8]) -> Parse {
        Parse::Consumed(ctx.1.push(data))
    }

    fn exec(&mut self, ctx: Self::Ctx) {
        let (head, body) = ctx;
        // hold a request reference across execution so a disconnect cannot
        // reclaim the client under us
        self.client.begin_request();
        self.service.request(&self.client, head, body.to_vec());
    }
}

async fn drive_connection<S: IpcService>(
    stream: TcpStream,
    client: Arc<IpcClientHandle>,
    service: Arc<S>,
) {
    if !service.connected(&client) {
        client.set_state(ClientState::Closed);
        return;
    }
    client.set_state(ClientState::Connected);
    debug!(client = client.id(), peer = %client.peer(), "connected");

    let (mut rd, mut wr) = stream.into_split();
    let mut reader = FrameReader::<ConnSink<S>>::new();
    let mut sink = ConnSink {
        service: Arc::clone(&service),
        client: Arc::clone(&client),
    };
    let mut scratch = [0u8; READ_BUF_SIZE];

    'conn: loop {
        tokio::select! {
            res = rd.read(&mut scratch) => {
                match res {
                    Ok(0) => break 'conn,
                    Ok(n) => {
                        if let Err(err) = reader.feed(&scratch[..n], &mut sink) {
                            warn!(client = client.id(), %err, "protocol error");
                            break 'conn;
                        }
                    }
                    Err(err) => {
                        trace!(client = client.id(), %err, "read failed");
                        break 'conn;
                    }
                }
            }
            _ = client.writable.notified() => {
                loop {
                    let latency = Arc::clone(&client.out_latency);
                    match client.queue.flush(&mut wr, |us| latency.add(us)).await {
                        Ok((_, true)) => continue,
                        Ok((_, false)) => break,
                        Err(err) => {
                            trace!(client = client.id(), %err, "write failed");
                            break 'conn;
                        }
                    }
                }
            }
        }
    }

    client.set_state(ClientState::Draining);
    service.disconnected(&client);
    client.queue.clear();
    if client.in_flight() == 0 {
        client.set_state(ClientState::Closed);
    }
    debug!(
        client = client.id(),
        in_flight = client.in_flight(),
        "disconnected"
    );
}

/// TCP server bound onto the reactor.
pub struct IpcServer {
    local_addr: SocketAddr,
    out_latency: Arc<Histogram>,
}

impl IpcServer {
    /// Bind `addr` and start accepting. The accept loop lives on core 0;
    /// connections are distributed round-robin over all cores.
    pub fn start<S: IpcService>(
        reactor: ReactorHandle,
        addr: SocketAddr,
        service: Arc<S>,
    ) -> std::io::Result<IpcServer> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let out_latency = Arc::new(Histogram::new());

        let accept_latency = Arc::clone(&out_latency);
        let accept_reactor = reactor.clone();
        reactor.spawn_on(0, move || {
            let ctx = WorkerCtx::current().expect("accept loop outside worker");
            ctx.add_entity(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(err) => {
                        warn!(%err, "listener registration failed");
                        return;
                    }
                };
                let next_core = AtomicUsize::new(0);
                let next_client = AtomicU64::new(1);
                loop {
                    let (stream, peer) = match listener.accept().await {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!(%err, "accept failed");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            continue;
                        }
                    };
                    let core =
                        next_core.fetch_add(1, Ordering::Relaxed) % accept_reactor.cores();
                    let id = next_client.fetch_add(1, Ordering::Relaxed);
                    let client = Arc::new(IpcClientHandle::new(
                        id,
                        core,
                        peer,
                        Arc::clone(&accept_latency),
                    ));
                    let std_stream = match stream.into_std() {
                        Ok(s) => s,
                        Err(err) => {
                            warn!(%err, "detach accepted stream failed");
                            continue;
                        }
                    };
                    let service = Arc::clone(&service);
                    accept_reactor.spawn_on(core, move || {
                        let ctx = WorkerCtx::current().expect("connection outside worker");
                        ctx.add_entity(async move {
                            match TcpStream::from_std(std_stream) {
                                Ok(stream) => {
                                    drive_connection(stream, client, service).await
                                }
                                Err(err) => {
                                    warn!(%err, "register accepted stream failed")
                                }
                            }
                        });
                    });
                }
            });
        });

        Ok(IpcServer {
            local_addr,
            out_latency,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Enqueue-to-write latency of outbound messages.
    pub fn out_latency(&self) -> &Histogram {
        &self.out_latency
    }
}
