use super::{Ledger, WriteOp, WriteSet};
use crate::errors::{FairroundResult, StorageError};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process ledger backed by a single `HashMap`.
///
/// `commit` applies a write set under one write lock, so readers see either
/// none or all of it.
#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.write().unwrap().insert(key, value);
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &[u8]) -> FairroundResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::ReadFailed("memory ledger lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn commit(&self, writes: WriteSet) -> FairroundResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::WriteFailed("memory ledger lock poisoned".to_string()))?;
        for op in writes.into_ops() {
            match op {
                WriteOp::Put(key, value) => {
                    entries.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Address;
    use crate::ledger::{Entity, LedgerExt};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter(u64);

    impl Entity for Counter {
        const KIND: &'static str = "counter";
    }

    #[test]
    fn test_put_then_delete_in_one_commit() {
        let ledger = MemoryLedger::new();
        let a = Address::new([1u8; 32]);
        let b = Address::new([2u8; 32]);

        let mut writes = WriteSet::new();
        writes.put(&a, &Counter(1)).unwrap();
        writes.put(&b, &Counter(2)).unwrap();
        ledger.commit(writes).unwrap();
        assert_eq!(ledger.len(), 2);

        let mut writes = WriteSet::new();
        writes.delete::<Counter>(&a);
        writes.put(&b, &Counter(3)).unwrap();
        ledger.commit(writes).unwrap();

        assert!(ledger.read::<Counter>(&a).unwrap().is_none());
        assert_eq!(ledger.read::<Counter>(&b).unwrap(), Some(Counter(3)));
    }

    #[test]
    fn test_empty_commit_leaves_ledger_untouched() {
        let ledger = MemoryLedger::new();
        let writes = WriteSet::new();
        assert!(writes.is_empty());
        assert_eq!(writes.len(), 0);
        ledger.commit(writes).unwrap();
        assert_eq!(ledger.len(), 0);
    }
}
