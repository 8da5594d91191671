//! Directory-backed store: one file per key.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{BoxFuture, CacheError, Store};
use crate::record::Record;

/// Stores each entry as a regular file named after its key, directly under
/// `root`. File contents are the exact payload bytes.
///
/// The root is created on first use. Writes go to a temporary file in the same
/// directory which is then renamed over the entry, so readers never observe a
/// partially written payload.
///
/// # Examples
///
/// ```
/// use httpcache::record::Record;
/// use httpcache::store::{DirStore, Store};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let root = tempfile::tempdir().unwrap();
/// let store = DirStore::new(root.path());
///
/// store.put(&Record::with_key("abc.json").with_payload(r#"{"a":1}"#)).await.unwrap();
///
/// assert_eq!(std::fs::read(root.path().join("abc.json")).unwrap(), br#"{"a":1}"#);
/// assert_eq!(store.query(&Record::with_key("abc.json")).await.unwrap(), r#"{"a":1}"#);
/// # });
/// ```
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    ready: OnceCell<()>,
    // Distinguishes temporary files of concurrent writers.
    sequence: AtomicU64,
}

impl DirStore {
    /// Creates a store rooted at `root`. An empty path means the current directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut root = root.into();
        if root.as_os_str().is_empty() {
            root = PathBuf::from(".");
        }
        Self {
            root,
            ready: OnceCell::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path an entry for `key` lives at.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn ensure_root(&self) -> io::Result<()> {
        self.ready
            .get_or_try_init(|| async {
                // create_dir_all treats an existing directory as success.
                fs::create_dir_all(&self.root).await?;
                debug!(root = %self.root.display(), "cache directory ready");
                Ok::<(), io::Error>(())
            })
            .await
            .map(|_| ())
    }

    async fn write_entry(&self, key: &str, payload: &Bytes) -> io::Result<()> {
        self.ensure_root().await?;

        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let tmp = self.root.join(format!(".{key}.{n}.tmp"));
        let target = self.entry_path(key);

        if let Err(e) = fs::write(&tmp, payload).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, &target).await {
            warn!(key, error = %e, "failed to move cache entry into place");
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn read_entry(&self, key: &str) -> Result<Bytes, CacheError> {
        if let Err(source) = self.ensure_root().await {
            return Err(CacheError::Storage {
                key: key.to_owned(),
                source,
            });
        }
        match fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CacheError::NotFound {
                key: key.to_owned(),
                source: Some(e),
            }),
            Err(source) => Err(CacheError::Storage {
                key: key.to_owned(),
                source,
            }),
        }
    }
}

impl Default for DirStore {
    /// A store rooted at the current directory.
    fn default() -> Self {
        Self::new(".")
    }
}

/// Rejects keys that would escape the root or name a directory.
fn validate_key(key: &str) -> Result<(), CacheError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CacheError::Storage {
            key: key.to_owned(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "cache key must be a single file name",
            ),
        });
    }
    Ok(())
}

impl Store for DirStore {
    fn put<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let key = record.key();
            validate_key(key)?;
            self.write_entry(key, record.payload())
                .await
                .map_err(|source| CacheError::Storage {
                    key: key.to_owned(),
                    source,
                })?;
            debug!(key, bytes = record.len(), "cache entry written");
            Ok(())
        })
    }

    fn query<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        Box::pin(async move {
            let key = record.key();
            validate_key(key)?;
            self.read_entry(key).await
        })
    }
}
