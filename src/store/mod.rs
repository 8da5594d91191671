//! Response stores: where cached payloads live.
//!
//! A [`Store`] holds one byte sequence per cache key. Two backends ship with
//! the crate:
//!
//! - [`DirStore`] — one file per key directly under a root directory.
//! - [`MemoryStore`] — a process-local map, lost on restart.
//!
//! Both are safe to share between concurrent callers: a [`Store::query`] racing
//! a [`Store::put`] for the same key returns either the old or the new payload
//! in full.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::record::Record;

pub mod dir;
pub mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

/// A heap-allocated, `Send` future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced by a [`Store`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// No entry exists for the key.
    #[error("no cache entry for key {key}")]
    NotFound {
        key: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The backend failed to read or write the entry.
    #[error("storage I/O error for key {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    /// Returns `true` for a cache miss, as opposed to a backend failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the key the failed operation was for.
    pub fn key(&self) -> &str {
        match self {
            Self::NotFound { key, .. } | Self::Storage { key, .. } => key,
        }
    }
}

/// Key → bytes persistence used by the cache policies.
///
/// # Contract
///
/// - `put` stores `record.payload()` under `record.key()`, replacing any
///   previous value.
/// - `query` returns the bytes stored for `record.key()`, or
///   [`CacheError::NotFound`] when there are none. Any other failure is
///   [`CacheError::Storage`].
pub trait Store: Send + Sync {
    /// Stores the record's payload under its key.
    fn put<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Looks up the payload stored under the record's key.
    fn query<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<Bytes, CacheError>>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn put<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<(), CacheError>> {
        (**self).put(record)
    }

    fn query<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        (**self).query(record)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn put<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<(), CacheError>> {
        (**self).put(record)
    }

    fn query<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        (**self).query(record)
    }
}
