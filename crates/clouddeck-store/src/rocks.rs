//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksCredentialStore` implementation of the
//! `CredentialStore` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::StoredValue;
use crate::CredentialStore;

/// RocksDB-backed credential store.
pub struct RocksCredentialStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksCredentialStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        tracing::debug!("Opened credential store");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::MissingColumnFamily(name.to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize(value: &StoredValue) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize(data: &[u8]) -> Result<StoredValue> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl CredentialStore for RocksCredentialStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let cf = self.cf(cf::SETTINGS)?;
        self.db
            .get_cf(&cf, keys::encode(key))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put(&self, key: &str, value: StoredValue) -> Result<()> {
        let cf = self.cf(cf::SETTINGS)?;
        let data = Self::serialize(&value)?;
        Ok(self.db.put_cf(&cf, keys::encode(key), data)?)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let cf = self.cf(cf::SETTINGS)?;
        Ok(self.db.delete_cf(&cf, keys::encode(key))?)
    }
}
