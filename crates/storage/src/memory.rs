//! In-memory backend
//!
//! Terminal fallback when no durable medium is available. Data lives for the
//! lifetime of the process. Records are copied on the way in and on the way
//! out, so a caller holding a returned record can never change stored state.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::backend::{BackendError, BackendKind, QueryOptions, Result, StorageBackend};
use crate::record::{record_id, Collection, Record};

/// Process-lifetime backend keyed `"{collection}_{id}"`
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, Record>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn key(collection: Collection, id: &str) -> String {
        format!("{}_{}", collection.as_str(), id)
    }

    /// Number of stored records across all collections
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn save(&self, collection: Collection, record: &Record) -> Result<String> {
        let id = record_id(record)
            .ok_or(BackendError::MissingId(collection))?
            .to_string();

        self.data
            .write()
            .insert(Self::key(collection, &id), record.clone());

        Ok(id)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        Ok(self.data.read().get(&Self::key(collection, id)).cloned())
    }

    async fn get_all(&self, collection: Collection, options: &QueryOptions) -> Result<Vec<Record>> {
        let prefix = format!("{}_", collection.as_str());
        let records = self
            .data
            .read()
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .collect();

        Ok(options.apply(records))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        Ok(self.data.write().remove(&Self::key(collection, id)).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}
