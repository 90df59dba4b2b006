//! RocksDB-backed ledger

use super::{Ledger, WriteOp, WriteSet};
use crate::errors::{FairroundResult, StorageError};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct RocksLedger {
    db: Arc<DB>,
}

impl RocksLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> FairroundResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(16 * 1024 * 1024);
        opts.set_max_write_buffer_number(2);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            StorageError::DatabaseOpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        tracing::info!(path = %path.as_ref().display(), "Opened RocksDB ledger");

        Ok(Self { db: Arc::new(db) })
    }
}

impl Ledger for RocksLedger {
    fn get(&self, key: &[u8]) -> FairroundResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    fn commit(&self, writes: WriteSet) -> FairroundResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        tracing::trace!(ops = writes.len(), "Writing batch");
        let mut batch = WriteBatch::default();
        for op in writes.into_ops() {
            match op {
                WriteOp::Put(key, value) => batch.put(key, value),
                WriteOp::Delete(key) => batch.delete(key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }
}
