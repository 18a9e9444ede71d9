// raleigh-server: server glue

//! # raleigh-server
//!
//! The executable face of RaleighSL: wires the default plugin set into a
//! [`raleighsl::Storage`], hosts it behind the zcl ipc server on a
//! multi-core reactor, and translates wire messages into store operations.

pub mod config;
pub mod dispatch;
pub mod proto;

use config::ServerConfig;
use dispatch::StoreDispatcher;
use raleighsl::device::{MemDevice, MEM_DEVICE_UUID};
use raleighsl::format::{FormatV1, FORMAT_V1_UUID};
use raleighsl::key::{FlatKey, FLAT_KEY_UUID};
use raleighsl::objects::CounterObject;
use raleighsl::semantic::{FlatSemantic, FLAT_SEMANTIC_UUID};
use raleighsl::space::{ExtentSpace, EXTENT_SPACE_UUID};
use raleighsl::{PluginRegistry, Storage, StoreError, StoreResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use zcl_ipc::IpcServer;
use zcl_reactor::{Reactor, ReactorConfig};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad bind address: {0}")]
    BadBind(String),
}

/// Registry with the stock plugin set: flat semantic, flat key, extent
/// space, in-memory device, format v1 and the counter object.
pub fn default_registry(device_capacity: u64) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register_semantic(Arc::new(FlatSemantic::new()));
    registry.register_key(Arc::new(FlatKey::new()));
    registry.register_space(Arc::new(ExtentSpace::new()));
    registry.register_device(Arc::new(MemDevice::new(device_capacity)));
    registry.register_object(Arc::new(CounterObject::new()));
    registry.register_format(Arc::new(FormatV1::new(
        FLAT_SEMANTIC_UUID,
        EXTENT_SPACE_UUID,
        FLAT_KEY_UUID,
    )));
    Arc::new(registry)
}

/// Open a store against the stock format/device pair.
pub fn open_store(registry: Arc<PluginRegistry>, cache_buckets: u32) -> StoreResult<Storage> {
    Storage::open(registry, &FORMAT_V1_UUID, &MEM_DEVICE_UUID, cache_buckets)
}

/// A running server: reactor, listener and the store it fronts.
pub struct ServerRuntime {
    pub reactor: Reactor,
    pub ipc: IpcServer,
    pub store: Arc<Storage>,
}

impl ServerRuntime {
    pub fn local_addr(&self) -> SocketAddr {
        self.ipc.local_addr()
    }

    pub fn shutdown(self) {
        self.reactor.shutdown();
    }
}

/// Bring the whole stack up from a config.
pub fn start(config: &ServerConfig) -> Result<ServerRuntime, ServerError> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|_| ServerError::BadBind(config.server.bind.clone()))?;

    let registry = default_registry(config.store.device_capacity);
    let store = Arc::new(open_store(registry, config.store.cache_buckets)?);

    let cores = if config.reactor.cores == 0 {
        num_cpus::get()
    } else {
        config.reactor.cores
    };
    let reactor = Reactor::start(ReactorConfig {
        cores,
        exec_quantum: Duration::from_micros(config.reactor.exec_quantum_us),
        park_timeout: Duration::from_millis(config.reactor.park_timeout_ms),
    });

    let dispatcher = Arc::new(StoreDispatcher::new(Arc::clone(&store)));
    let ipc = IpcServer::start(reactor.handle(), addr, dispatcher)?;
    info!(addr = %ipc.local_addr(), cores, "raleigh-server listening");

    // periodic loop-stats snapshot on core 0
    let stats_handle = reactor.handle();
    reactor.schedule_timer(0, Duration::from_secs(60), move || {
        match serde_json::to_string(&stats_handle.stats().snapshot()) {
            Ok(snapshot) => tracing::debug!(target: "raleigh::stats", %snapshot),
            Err(err) => tracing::warn!(%err, "stats snapshot failed"),
        }
    });

    Ok(ServerRuntime {
        reactor,
        ipc,
        store,
    })
}
