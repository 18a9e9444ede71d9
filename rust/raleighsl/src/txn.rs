// raleighsl: transactions
// A transaction is an ordered list of applied atoms plus the set of object
// write locks it holds. Commit quiesces each touched object through its
// commit phase; rollback reverts atoms newest-first and undoes the
// journaled naming mutations.

use crate::error::{StoreError, StoreResult};
use crate::object::Object;
use crate::plugins::{SemanticPlugin, TxnAtomOp};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Pending,
    Committed,
    RolledBack,
}

pub struct TxnAtom {
    pub object: Arc<Object>,
    pub op: Box<dyn TxnAtomOp>,
}

pub struct Transaction {
    pub id: u64,
    state: TxnState,
    atoms: Vec<TxnAtom>,
    /// oids whose write slot this transaction holds.
    write_held: Vec<Arc<Object>>,
}

impl Transaction {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: TxnState::Pending,
            atoms: Vec::new(),
            write_held: Vec::new(),
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    fn holds_write(&self, oid: u64) -> bool {
        self.write_held.iter().any(|o| o.oid == oid)
    }
}

/// Allocates transaction ids and tracks in-flight transactions.
pub struct TxnManager {
    next_id: AtomicU64,
    active: DashMap<u64, Transaction>,
}

impl TxnManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: DashMap::new(),
        }
    }

    pub fn begin(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.insert(id, Transaction::new(id));
        trace!(txn = id, "transaction started");
        id
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Run `op.apply` against `object` under the transaction's write slot
    /// and record the atom. The write slot is acquired on first touch and
    /// held until commit/rollback.
    pub fn apply(
        &self,
        txn_id: u64,
        object: &Arc<Object>,
        mut op: Box<dyn TxnAtomOp>,
    ) -> StoreResult<Vec<u8>> {
        let needs_lock = {
            let entry = self.active.get(&txn_id).ok_or(StoreError::NotFound)?;
            !entry.holds_write(object.oid)
        };
        if needs_lock {
            // spin outside the transaction table so a stalled acquisition
            // cannot wedge unrelated transactions on the same shard
            while !object.lock.try_acquire_write() {
                std::hint::spin_loop();
            }
        }
        let mut entry = match self.active.get_mut(&txn_id) {
            Some(entry) => entry,
            None => {
                if needs_lock {
                    object.lock.release_write();
                }
                return Err(StoreError::NotFound);
            }
        };
        if needs_lock {
            entry.write_held.push(Arc::clone(object));
        }
        let reply = object.with_state_mut(|state| op.apply(state));
        match reply {
            Ok(reply) => {
                entry.atoms.push(TxnAtom {
                    object: Arc::clone(object),
                    op,
                });
                Ok(reply)
            }
            // a refused atom (cas mismatch) mutated nothing; keep the lock
            // for the rest of the transaction
            Err(err) => Err(err),
        }
    }

    /// Commit: semantic layer first, then every touched object goes
    /// through its commit phase with readers drained.
    pub fn commit(&self, txn_id: u64, semantic: &dyn SemanticPlugin) -> StoreResult<()> {
        let (_, mut txn) = self
            .active
            .remove(&txn_id)
            .ok_or(StoreError::NotFound)?;
        semantic.commit()?;
        for i in 0..txn.write_held.len() {
            let object = &txn.write_held[i];
            object.lock.release_write();
            object.lock.set_commit_flag();
            while !object.lock.try_acquire_commit() {
                std::hint::spin_loop();
            }
            let result = object.with_state_mut(|state| object.plug.commit(state));
            object.lock.release_commit();
            if let Err(err) = result {
                // a failed commit hook rolls the whole transaction back
                trace!(txn = txn_id, oid = object.oid, "commit hook failed");
                for remaining in &txn.write_held[i + 1..] {
                    remaining.lock.release_write();
                }
                self.revert_atoms(&mut txn);
                semantic.rollback()?;
                txn.state = TxnState::RolledBack;
                return Err(err);
            }
        }
        txn.state = TxnState::Committed;
        trace!(txn = txn_id, atoms = txn.atoms.len(), "committed");
        Ok(())
    }

    /// Roll back: naming first, then atoms in reverse insertion order.
    pub fn rollback(&self, txn_id: u64, semantic: &dyn SemanticPlugin) -> StoreResult<()> {
        let (_, mut txn) = self
            .active
            .remove(&txn_id)
            .ok_or(StoreError::NotFound)?;
        semantic.rollback()?;
        self.revert_atoms(&mut txn);
        for object in &txn.write_held {
            object.lock.release_write();
        }
        txn.state = TxnState::RolledBack;
        trace!(txn = txn_id, "rolled back");
        Ok(())
    }

    fn revert_atoms(&self, txn: &mut Transaction) {
        for atom in txn.atoms.iter_mut().rev() {
            atom.object.with_state_mut(|state| atom.op.revert(state));
        }
        txn.atoms.clear();
    }
}

impl Default for TxnManager {
    fn default() -> Self {
        Self::new()
    }
}
