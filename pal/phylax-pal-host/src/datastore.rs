//! In-memory datastore

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use phylax_pal::{Datastore, DatastoreError, RecordId};

/// Maximum record size the in-memory store accepts
const MAX_RECORD_LEN: usize = 256;

/// HashMap-backed [`Datastore`] for tests and tooling
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<RecordId, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-provisioned with a platform binding secret
    pub fn with_binding_secret(secret: &[u8]) -> Self {
        let mut store = Self::new();
        store
            .records
            .insert(RecordId::PlatformBindingSecret, secret.to_vec());
        store
    }

    /// True when a record exists
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }
}

impl Datastore for MemoryStore {
    fn read(&mut self, id: RecordId, buf: &mut [u8]) -> Result<usize, DatastoreError> {
        let record = self.records.get(&id).ok_or(DatastoreError::NotFound)?;
        if record.len() > buf.len() {
            return Err(DatastoreError::BufferTooSmall);
        }
        buf[..record.len()].copy_from_slice(record);
        Ok(record.len())
    }

    fn write(&mut self, id: RecordId, data: &[u8]) -> Result<(), DatastoreError> {
        if data.len() > MAX_RECORD_LEN {
            return Err(DatastoreError::RecordTooLarge);
        }
        self.records.insert(id, data.to_vec());
        Ok(())
    }

    fn erase(&mut self, id: RecordId) -> Result<(), DatastoreError> {
        self.records.remove(&id);
        Ok(())
    }
}

/// Clonable handle onto one [`MemoryStore`], for tests that close one
/// stack and open another over the same persisted records
#[derive(Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemoryStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding_secret(secret: &[u8]) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStore::with_binding_secret(secret))),
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.inner.lock().expect("store lock").contains(id)
    }
}

impl Datastore for SharedStore {
    fn read(&mut self, id: RecordId, buf: &mut [u8]) -> Result<usize, DatastoreError> {
        self.inner.lock().expect("store lock").read(id, buf)
    }

    fn write(&mut self, id: RecordId, data: &[u8]) -> Result<(), DatastoreError> {
        self.inner.lock().expect("store lock").write(id, data)
    }

    fn erase(&mut self, id: RecordId) -> Result<(), DatastoreError> {
        self.inner.lock().expect("store lock").erase(id)
    }
}
