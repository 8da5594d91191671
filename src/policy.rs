//! Cache policies: when to serve from the store and when to write to it.
//!
//! A [`Policy`] contributes two hooks to every exchange:
//!
//! - [`Policy::pre`] runs before the network call and may return cached bytes,
//!   in which case the transport is skipped;
//! - [`Policy::post`] runs after a successful fetch and may persist the fresh
//!   payload.
//!
//! | Policy | `pre` | `post` |
//! |---|---|---|
//! | [`AlwaysFresh`](PolicyKind::AlwaysFresh) | never serves | always stores |
//! | [`FetchOnce`](PolicyKind::FetchOnce) | serves keys already fetched by this policy | stores the first fetch of a key only |
//! | [`CacheFirst`](PolicyKind::CacheFirst) | serves whatever the store holds | stores unless the key was served from the store |
//! | [`Passthrough`](PolicyKind::Passthrough) | serves whatever the store holds | always stores |
//!
//! Stateful policies keep their key set behind one async mutex that is held
//! across the membership test, the paired store access and the update.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::record::Record;
use crate::store::{CacheError, Store};

/// The four policy behaviours, without state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Every call goes to the network; every response is stored.
    AlwaysFresh,
    /// One network fetch per key for the lifetime of the policy.
    FetchOnce,
    /// Serve from the store when possible, otherwise fetch and store.
    #[default]
    CacheFirst,
    /// Read-through, write-through.
    Passthrough,
}

impl PolicyKind {
    /// All variants, in declaration order.
    pub const ALL: [PolicyKind; 4] = [
        Self::AlwaysFresh,
        Self::FetchOnce,
        Self::CacheFirst,
        Self::Passthrough,
    ];

    /// Returns the kebab-case name of the policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysFresh => "always-fresh",
            Self::FetchOnce => "fetch-once",
            Self::CacheFirst => "cache-first",
            Self::Passthrough => "passthrough",
        }
    }

    /// Returns `true` when concurrent exchanges for one key must be serialized
    /// end to end for the policy to hold its guarantee.
    pub fn single_flight(self) -> bool {
        matches!(self, Self::FetchOnce | Self::CacheFirst)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Error)]
#[error("unknown cache policy: {0:?} (expected always-fresh, fetch-once, cache-first or passthrough)")]
pub struct UnknownPolicy(pub String);

impl FromStr for PolicyKind {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownPolicy(s.to_owned()))
    }
}

/// Keys observed by a stateful policy.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Mutex<HashSet<String>>,
}

impl KeySet {
    /// Returns `true` if `key` has been recorded.
    pub async fn contains(&self, key: &str) -> bool {
        self.keys.lock().await.contains(key)
    }

    /// Number of recorded keys.
    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }

    /// Returns `true` if no key has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.keys.lock().await.is_empty()
    }
}

/// A cache policy together with the state it owns.
///
/// # Examples
///
/// ```
/// use httpcache::policy::{Policy, PolicyKind};
/// use httpcache::record::Record;
/// use httpcache::store::{MemoryStore, Store};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// let policy = Policy::new(PolicyKind::CacheFirst);
/// let record = Record::with_key("k").with_payload("fresh");
///
/// assert!(policy.pre(&store, &record).await.unwrap().is_none());
/// policy.post(&store, &record).await.unwrap();
/// assert_eq!(policy.pre(&store, &record).await.unwrap().unwrap(), "fresh");
/// # });
/// ```
#[derive(Debug)]
pub enum Policy {
    AlwaysFresh,
    /// Holds the keys fetched and stored so far.
    FetchOnce(KeySet),
    /// Holds the keys served from the store so far.
    CacheFirst(KeySet),
    Passthrough,
}

impl Policy {
    /// Builds a fresh policy of the given kind with empty state.
    pub fn new(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::AlwaysFresh => Self::AlwaysFresh,
            PolicyKind::FetchOnce => Self::FetchOnce(KeySet::default()),
            PolicyKind::CacheFirst => Self::CacheFirst(KeySet::default()),
            PolicyKind::Passthrough => Self::Passthrough,
        }
    }

    pub fn always_fresh() -> Self {
        Self::new(PolicyKind::AlwaysFresh)
    }

    pub fn fetch_once() -> Self {
        Self::new(PolicyKind::FetchOnce)
    }

    pub fn cache_first() -> Self {
        Self::new(PolicyKind::CacheFirst)
    }

    pub fn passthrough() -> Self {
        Self::new(PolicyKind::Passthrough)
    }

    /// Returns the behaviour of this policy.
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::AlwaysFresh => PolicyKind::AlwaysFresh,
            Self::FetchOnce(_) => PolicyKind::FetchOnce,
            Self::CacheFirst(_) => PolicyKind::CacheFirst,
            Self::Passthrough => PolicyKind::Passthrough,
        }
    }

    /// Returns the key set of a stateful policy.
    pub fn keys(&self) -> Option<&KeySet> {
        match self {
            Self::FetchOnce(keys) | Self::CacheFirst(keys) => Some(keys),
            Self::AlwaysFresh | Self::Passthrough => None,
        }
    }

    /// Decides whether `record` can be answered from `store`.
    ///
    /// Returns the cached payload on a hit and `None` when the exchange must go
    /// to the network. A store miss is `Ok(None)`; other store failures are
    /// returned as errors.
    pub async fn pre<S>(&self, store: &S, record: &Record) -> Result<Option<Bytes>, CacheError>
    where
        S: Store + ?Sized,
    {
        let key = record.key();
        match self {
            Self::AlwaysFresh => Ok(None),
            Self::FetchOnce(seen) => {
                let mut seen = seen.keys.lock().await;
                if !seen.contains(key) {
                    return Ok(None);
                }
                match store.query(record).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.is_not_found() => {
                        // Entry vanished from the store; fetch and persist it again.
                        debug!(key, "fetched key missing from store, refetching");
                        seen.remove(key);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Self::CacheFirst(served) => {
                let mut served = served.keys.lock().await;
                match store.query(record).await {
                    Ok(bytes) => {
                        served.insert(key.to_owned());
                        Ok(Some(bytes))
                    }
                    Err(e) if e.is_not_found() => {
                        // A served entry that vanished must be fetched and stored again.
                        if served.remove(key) {
                            debug!(key, "served key missing from store, refetching");
                        }
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Self::Passthrough => match store.query(record).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Decides whether a freshly fetched `record` is written to `store`, and
    /// writes it.
    pub async fn post<S>(&self, store: &S, record: &Record) -> Result<(), CacheError>
    where
        S: Store + ?Sized,
    {
        let key = record.key();
        match self {
            Self::AlwaysFresh | Self::Passthrough => store.put(record).await,
            Self::FetchOnce(seen) => {
                let mut seen = seen.keys.lock().await;
                if seen.contains(key) {
                    return Ok(());
                }
                store.put(record).await?;
                seen.insert(key.to_owned());
                Ok(())
            }
            Self::CacheFirst(served) => {
                let served = served.keys.lock().await;
                if served.contains(key) {
                    debug!(key, "key was served from the store, skipping write");
                    return Ok(());
                }
                store.put(record).await
            }
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(PolicyKind::default())
    }
}

impl From<PolicyKind> for Policy {
    fn from(kind: PolicyKind) -> Self {
        Self::new(kind)
    }
}
