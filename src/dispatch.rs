// raleigh-server: request dispatch
// Translates inbound messages into store operations: decode the body,
// resolve the target object, run the operation under the right access
// mode, and answer with the same req_id. Every request releases its client
// reference once the response is enqueued (or discarded).

use crate::proto::{self, counter_op};
use raleighsl::objects::counter;
use raleighsl::wire::{self, FIELD_ERROR, FIELD_NAME, FIELD_OID, FIELD_TYPE_UUID};
use raleighsl::{Storage, StoreError, StoreResult};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;
use zcl_buffers::DBuf;
use zcl_ipc::{IpcClientHandle, IpcService, MsgHead};

/// The ipc -> store bridge.
pub struct StoreDispatcher {
    store: Arc<Storage>,
}

impl StoreDispatcher {
    pub fn new(store: Arc<Storage>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Storage> {
        &self.store
    }

    fn handle(&self, msg_type: u64, body: &[u8]) -> (Vec<u8>, Option<StoreError>) {
        match self.execute(msg_type, body) {
            Ok(reply) => (reply, None),
            Err(err) => {
                // cas conflicts still answer with the current pair
                if err == StoreError::ConcurrencyConflict {
                    if let Ok(reply) = self.current_counter_pair(body) {
                        return (reply, Some(err));
                    }
                }
                trace!(msg_type, %err, "request failed");
                (Vec::new(), Some(err))
            }
        }
    }

    fn execute(&self, msg_type: u64, body: &[u8]) -> StoreResult<Vec<u8>> {
        match msg_type {
            proto::MSG_PING => Ok(Vec::new()),
            proto::MSG_OPEN_FS => {
                // the embedder opened the store at startup; report identity
                let mut reply = Vec::new();
                wire::put_bytes(
                    &mut reply,
                    FIELD_TYPE_UUID,
                    self.store.format().info().uuid.as_bytes(),
                );
                Ok(reply)
            }
            proto::MSG_CREATE_OBJECT => {
                let name = wire::need_bytes(body, FIELD_NAME)?;
                let raw = wire::need_bytes(body, FIELD_TYPE_UUID)?;
                let type_uuid = Uuid::from_slice(raw)
                    .map_err(|_| StoreError::InvalidArgument("bad type uuid".into()))?;
                let oid = self.store.create(name, &type_uuid)?;
                let mut reply = Vec::new();
                wire::put_u64(&mut reply, FIELD_OID, oid);
                Ok(reply)
            }
            proto::MSG_LOOKUP_OBJECT => {
                let name = wire::need_bytes(body, FIELD_NAME)?;
                let oid = self.store.lookup_oid(name)?;
                let mut reply = Vec::new();
                wire::put_u64(&mut reply, FIELD_OID, oid);
                Ok(reply)
            }
            proto::MSG_UNLINK_OBJECT => {
                let name = wire::need_bytes(body, FIELD_NAME)?;
                let oid = self.store.unlink(name)?;
                let mut reply = Vec::new();
                wire::put_u64(&mut reply, FIELD_OID, oid);
                Ok(reply)
            }
            _ => {
                let Some(op) = counter_op(msg_type) else {
                    return Err(StoreError::NotSupported);
                };
                let name = wire::need_bytes(body, FIELD_NAME)?;
                let object = self.store.lookup(name)?;
                if op == counter::OP_GET {
                    self.store.query(&object, op, body)
                } else {
                    self.store.update(&object, op, body)
                }
            }
        }
    }

    fn current_counter_pair(&self, body: &[u8]) -> StoreResult<Vec<u8>> {
        let name = wire::need_bytes(body, FIELD_NAME)?;
        let object = self.store.lookup(name)?;
        self.store.query(&object, counter::OP_GET, body)
    }
}

impl IpcService for StoreDispatcher {
    fn disconnected(&self, client: &Arc<IpcClientHandle>) {
        debug!(client = client.id(), "client draining");
    }

    fn request(&self, client: &Arc<IpcClientHandle>, head: MsgHead, body: Vec<u8>) {
        let (mut reply, err) = self.handle(head.msg_type, &body);
        if let Some(err) = err {
            wire::put_u64(&mut reply, FIELD_ERROR, u64::from(err.code()));
        }
        let mut out = DBuf::new();
        out.add(&reply);
        client.respond(MsgHead::response(head.msg_type, head.req_id), out);
        client.end_request();
    }
}
