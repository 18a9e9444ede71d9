// raleighsl: in-memory object

use crate::plugins::ObjectPlugin;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use zcl_core::RwCSem;

/// Plugin-owned object state, opaque to the rest of the store.
pub trait ObjectState: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A live object: stable oid, its type plugin, the access-mode semaphore
/// and the plugin state behind a data lock. The RwCSem arbitrates who may
/// enter; the RwLock makes the actual state access sound.
pub struct Object {
    pub oid: u64,
    pub plug: Arc<dyn ObjectPlugin>,
    pub lock: RwCSem,
    state: RwLock<Box<dyn ObjectState>>,
}

impl Object {
    pub fn new(oid: u64, plug: Arc<dyn ObjectPlugin>, state: Box<dyn ObjectState>) -> Self {
        Self {
            oid,
            plug,
            lock: RwCSem::new(),
            state: RwLock::new(state),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&dyn ObjectState) -> R) -> R {
        let state = self.state.read();
        f(state.as_ref())
    }

    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut dyn ObjectState) -> R) -> R {
        let mut state = self.state.write();
        f(state.as_mut())
    }

}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("oid", &self.oid)
            .field("type", &self.plug.info().label)
            .finish()
    }
}
