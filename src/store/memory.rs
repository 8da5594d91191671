//! In-process store backed by a map.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BoxFuture, CacheError, Store};
use crate::record::Record;

/// Keeps entries in process memory. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns `true` if an entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }
}

impl Store for MemoryStore {
    fn put<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            // Bytes clones share the record's buffer.
            self.entries
                .write()
                .await
                .insert(record.key().to_owned(), record.payload().clone());
            debug!(key = record.key(), bytes = record.len(), "cache entry stored in memory");
            Ok(())
        })
    }

    fn query<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        Box::pin(async move {
            self.entries
                .read()
                .await
                .get(record.key())
                .cloned()
                .ok_or_else(|| CacheError::NotFound {
                    key: record.key().to_owned(),
                    source: None,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn miss_has_no_io_source() {
        let store = MemoryStore::new();
        match store.query(&Record::with_key("nope")).await {
            Err(CacheError::NotFound { source: None, .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_overwrites_in_place() {
        let store = MemoryStore::with_capacity(4);
        store.put(&Record::with_key("k").with_payload("one")).await.unwrap();
        store.put(&Record::with_key("k").with_payload("two")).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.contains("k").await);
        assert_eq!(store.query(&Record::with_key("k")).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn concurrent_puts_on_distinct_keys() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let record = Record::with_key(format!("key-{i}")).with_payload(format!("value-{i}"));
                store.put(&record).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len().await, 32);
        assert_eq!(
            store.query(&Record::with_key("key-7")).await.unwrap(),
            "value-7"
        );
    }
}
