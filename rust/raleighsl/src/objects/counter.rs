// raleighsl: counter object
// State is (value, cas). Every successful mutation bumps cas by one;
// increments and decrements wrap. A cas-set whose expected tag mismatches
// mutates nothing and surfaces ConcurrencyConflict.

use crate::error::{StoreError, StoreResult};
use crate::object::ObjectState;
use crate::plugins::{ObjectPlugin, PlugInfo, PlugKind, TxnAtomOp};
use crate::wire::{self, FIELD_CAS, FIELD_DELTA, FIELD_VALUE};
use std::any::Any;
use uuid::Uuid;

pub const COUNTER_OBJECT_UUID: Uuid = Uuid::from_bytes([
    79, 200, 57, 106, 240, 49, 72, 129, 155, 42, 43, 128, 199, 18, 183, 175,
]);

pub const OP_GET: u32 = 1;
pub const OP_SET: u32 = 2;
pub const OP_CAS: u32 = 3;
pub const OP_INCR: u32 = 4;
pub const OP_DECR: u32 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub value: u64,
    pub cas: u64,
}

impl ObjectState for CounterState {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn counter_of(state: &dyn ObjectState) -> StoreResult<&CounterState> {
    state
        .as_any()
        .downcast_ref::<CounterState>()
        .ok_or_else(|| StoreError::Corrupt("counter state of the wrong type".into()))
}

fn counter_of_mut(state: &mut dyn ObjectState) -> StoreResult<&mut CounterState> {
    state
        .as_any_mut()
        .downcast_mut::<CounterState>()
        .ok_or_else(|| StoreError::Corrupt("counter state of the wrong type".into()))
}

/// (value, cas) response body.
pub fn encode_reply(value: u64, cas: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    wire::put_u64(&mut out, FIELD_VALUE, value);
    wire::put_u64(&mut out, FIELD_CAS, cas);
    out
}

enum CounterOp {
    Set { value: u64 },
    Cas { value: u64, expected_cas: u64 },
    Incr { delta: u64 },
    Decr { delta: u64 },
}

struct CounterAtom {
    op_code: u32,
    op: CounterOp,
    pre_value: u64,
    pre_cas: u64,
}

impl TxnAtomOp for CounterAtom {
    fn op_code(&self) -> u32 {
        self.op_code
    }

    fn apply(&mut self, state: &mut dyn ObjectState) -> StoreResult<Vec<u8>> {
        let counter = counter_of_mut(state)?;
        self.pre_value = counter.value;
        self.pre_cas = counter.cas;
        match self.op {
            CounterOp::Set { value } => {
                counter.value = value;
                counter.cas = counter.cas.wrapping_add(1);
            }
            CounterOp::Cas {
                value,
                expected_cas,
            } => {
                if counter.cas != expected_cas {
                    return Err(StoreError::ConcurrencyConflict);
                }
                counter.value = value;
                counter.cas = counter.cas.wrapping_add(1);
            }
            CounterOp::Incr { delta } => {
                counter.value = counter.value.wrapping_add(delta);
                counter.cas = counter.cas.wrapping_add(1);
            }
            CounterOp::Decr { delta } => {
                counter.value = counter.value.wrapping_sub(delta);
                counter.cas = counter.cas.wrapping_add(1);
            }
        }
        Ok(encode_reply(counter.value, counter.cas))
    }

    fn revert(&mut self, state: &mut dyn ObjectState) {
        if let Ok(counter) = counter_of_mut(state) {
            counter.value = self.pre_value;
            counter.cas = self.pre_cas;
        }
    }
}

pub struct CounterObject {
    info: PlugInfo,
}

impl CounterObject {
    pub fn new() -> Self {
        Self {
            info: PlugInfo {
                uuid: COUNTER_OBJECT_UUID,
                label: "object-counter",
                description: "Counter Object",
                kind: PlugKind::Object,
            },
        }
    }
}

impl Default for CounterObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectPlugin for CounterObject {
    fn info(&self) -> &PlugInfo {
        &self.info
    }

    fn create(&self) -> StoreResult<Box<dyn ObjectState>> {
        Ok(Box::new(CounterState::default()))
    }

    fn query(&self, state: &dyn ObjectState, op_code: u32, _body: &[u8]) -> StoreResult<Vec<u8>> {
        match op_code {
            OP_GET => {
                let counter = counter_of(state)?;
                Ok(encode_reply(counter.value, counter.cas))
            }
            _ => Err(StoreError::NotSupported),
        }
    }

    fn prepare(
        &self,
        _state: &dyn ObjectState,
        op_code: u32,
        body: &[u8],
    ) -> StoreResult<Box<dyn TxnAtomOp>> {
        let op = match op_code {
            OP_SET => CounterOp::Set {
                value: wire::need_u64(body, FIELD_VALUE)?,
            },
            OP_CAS => CounterOp::Cas {
                value: wire::need_u64(body, FIELD_VALUE)?,
                expected_cas: wire::need_u64(body, FIELD_CAS)?,
            },
            OP_INCR => CounterOp::Incr {
                delta: wire::need_u64(body, FIELD_DELTA)?,
            },
            OP_DECR => CounterOp::Decr {
                delta: wire::need_u64(body, FIELD_DELTA)?,
            },
            _ => return Err(StoreError::NotSupported),
        };
        Ok(Box::new(CounterAtom {
            op_code,
            op,
            pre_value: 0,
            pre_cas: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(plug: &CounterObject, state: &mut CounterState, op: u32, body: &[u8]) -> StoreResult<Vec<u8>> {
        let mut atom = plug.prepare(state, op, body)?;
        atom.apply(state)
    }

    fn body_value(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        wire::put_u64(&mut out, FIELD_VALUE, value);
        out
    }

    fn body_delta(delta: u64) -> Vec<u8> {
        let mut out = Vec::new();
        wire::put_u64(&mut out, FIELD_DELTA, delta);
        out
    }

    fn body_cas(value: u64, cas: u64) -> Vec<u8> {
        let mut out = Vec::new();
        wire::put_u64(&mut out, FIELD_VALUE, value);
        wire::put_u64(&mut out, FIELD_CAS, cas);
        out
    }

    fn reply_pair(reply: &[u8]) -> (u64, u64) {
        (
            wire::need_u64(reply, FIELD_VALUE).unwrap(),
            wire::need_u64(reply, FIELD_CAS).unwrap(),
        )
    }

    #[test]
    fn test_get_is_idempotent() {
        // Get never changes value or cas
        let plug = CounterObject::new();
        let state = CounterState { value: 9, cas: 4 };
        for _ in 0..3 {
            let reply = plug.query(&state, OP_GET, &[]).unwrap();
            assert_eq!(reply_pair(&reply), (9, 4));
        }
        assert_eq!(state, CounterState { value: 9, cas: 4 });
    }

    #[test]
    fn test_mutations_bump_cas_by_one() {
        let plug = CounterObject::new();
        let mut state = CounterState::default();
        let reply = apply(&plug, &mut state, OP_INCR, &body_delta(5)).unwrap();
        assert_eq!(reply_pair(&reply), (5, 1));
        let reply = apply(&plug, &mut state, OP_INCR, &body_delta(3)).unwrap();
        assert_eq!(reply_pair(&reply), (8, 2));
        let reply = apply(&plug, &mut state, OP_SET, &body_value(100)).unwrap();
        assert_eq!(reply_pair(&reply), (100, 3));
        let reply = apply(&plug, &mut state, OP_DECR, &body_delta(1)).unwrap();
        assert_eq!(reply_pair(&reply), (99, 4));
    }

    #[test]
    fn test_cas_match_and_mismatch() {
        let plug = CounterObject::new();
        let mut state = CounterState { value: 10, cas: 7 };
        let reply = apply(&plug, &mut state, OP_CAS, &body_cas(20, 7)).unwrap();
        assert_eq!(reply_pair(&reply), (20, 8));
        // a mismatch leaves value and cas unchanged
        let err = apply(&plug, &mut state, OP_CAS, &body_cas(30, 7)).unwrap_err();
        assert_eq!(err, StoreError::ConcurrencyConflict);
        assert_eq!(state, CounterState { value: 20, cas: 8 });
    }

    #[test]
    fn test_wrap_around() {
        let plug = CounterObject::new();
        let mut state = CounterState {
            value: u64::MAX,
            cas: 0,
        };
        let reply = apply(&plug, &mut state, OP_INCR, &body_delta(2)).unwrap();
        assert_eq!(reply_pair(&reply).0, 1);
        let reply = apply(&plug, &mut state, OP_DECR, &body_delta(3)).unwrap();
        assert_eq!(reply_pair(&reply).0, u64::MAX - 1);
    }

    #[test]
    fn test_atom_revert_restores_pre_image() {
        let plug = CounterObject::new();
        let mut state = CounterState { value: 41, cas: 6 };
        let mut atom = plug.prepare(&state, OP_INCR, &body_delta(1)).unwrap();
        atom.apply(&mut state).unwrap();
        assert_eq!(state, CounterState { value: 42, cas: 7 });
        atom.revert(&mut state);
        assert_eq!(state, CounterState { value: 41, cas: 6 });
    }

    #[test]
    fn test_unknown_op_not_supported() {
        let plug = CounterObject::new();
        let state = CounterState::default();
        assert_eq!(
            plug.query(&state, 99, &[]).unwrap_err(),
            StoreError::NotSupported
        );
        assert!(plug.prepare(&state, 99, &[]).is_err());
    }
}
