//! Ledger substrate: entity reads and atomic multi-entity commits
//!
//! Entities are stored under `<kind>:<address>` keys as bincode. A mutating
//! operation stages every put/delete in a [`WriteSet`] and hands it to
//! [`Ledger::commit`], which applies all of it or none of it.

pub mod memory;
pub mod rocks;

use crate::common::types::Address;
use crate::errors::{FairroundResult, IntegrityError};
use serde::{de::DeserializeOwned, Serialize};

pub use memory::MemoryLedger;
pub use rocks::RocksLedger;

/// A value stored in the ledger under its derived address.
pub trait Entity: Serialize + DeserializeOwned {
    /// Key prefix, e.g. `game`.
    const KIND: &'static str;
}

pub fn entity_key<E: Entity>(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(E::KIND.len() + 1 + 32);
    key.extend_from_slice(E::KIND.as_bytes());
    key.push(b':');
    key.extend_from_slice(address.as_ref());
    key
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Staged writes of one operation.
#[derive(Debug, Default)]
pub struct WriteSet {
    ops: Vec<WriteOp>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<E: Entity>(&mut self, address: &Address, entity: &E) -> FairroundResult<()> {
        let value = bincode::serialize(entity).map_err(|e| IntegrityError::CorruptedEntity {
            kind: E::KIND,
            address: *address,
            reason: format!("encode failed: {}", e),
        })?;
        self.ops.push(WriteOp::Put(entity_key::<E>(address), value));
        Ok(())
    }

    pub fn delete<E: Entity>(&mut self, address: &Address) {
        self.ops.push(WriteOp::Delete(entity_key::<E>(address)));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Key-value substrate the round engine persists into.
pub trait Ledger: Send + Sync {
    fn get(&self, key: &[u8]) -> FairroundResult<Option<Vec<u8>>>;

    /// Applies every op in `writes` atomically.
    fn commit(&self, writes: WriteSet) -> FairroundResult<()>;
}

/// Typed reads on top of [`Ledger`].
pub trait LedgerExt: Ledger {
    fn read<E: Entity>(&self, address: &Address) -> FairroundResult<Option<E>> {
        let Some(bytes) = self.get(&entity_key::<E>(address))? else {
            return Ok(None);
        };
        bincode::deserialize(&bytes).map(Some).map_err(|e| {
            IntegrityError::CorruptedEntity {
                kind: E::KIND,
                address: *address,
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn exists<E: Entity>(&self, address: &Address) -> FairroundResult<bool> {
        Ok(self.get(&entity_key::<E>(address))?.is_some())
    }
}

impl<L: Ledger + ?Sized> LedgerExt for L {}
