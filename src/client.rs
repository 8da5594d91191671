//! The caching client: wires a store and a policy around a transport.
//!
//! Every call to [`Client::execute`] follows the same lifecycle:
//!
//! 1. derive a [`Record`] from the request URL;
//! 2. ask the policy's `pre` hook; on a hit, answer `200 OK` with the cached
//!    bytes and never touch the network;
//! 3. otherwise perform the request, buffer the response body into the record
//!    and hand it to the policy's `post` hook;
//! 4. return the response.
//!
//! Transport failures are returned as-is; the cache is never used as a
//! fallback for an unreachable origin.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::http::request::RequestError;
use crate::http::{Request, Response, StatusCode};
use crate::policy::{Policy, PolicyKind};
use crate::record::Record;
use crate::store::{CacheError, DirStore, Store};
use crate::transport::{TcpTransport, Transport, TransportError};

/// Errors produced by [`Client::execute`] and its conveniences.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to buffer response body: {0}")]
    Body(#[source] std::io::Error),

    /// The response was fetched but the policy failed to store it. The
    /// response is still usable; see [`ClientError::into_response`].
    #[error("response fetched but cache write failed: {source}")]
    PolicyWrite {
        response: Box<Response>,
        #[source]
        source: CacheError,
    },
}

impl ClientError {
    /// Returns `true` if only the cache write failed.
    pub fn is_policy_write(&self) -> bool {
        matches!(self, Self::PolicyWrite { .. })
    }

    /// Recovers the fetched response from a [`ClientError::PolicyWrite`].
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::PolicyWrite { response, .. } => Some(*response),
            _ => None,
        }
    }
}

/// Per-key async locks. Entries are dropped once no caller holds them.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(key.to_owned(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }
}

/// A caching HTTP client.
///
/// Cloning is cheap; clones share the store, the policy state and the
/// transport.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use httpcache::{Client, MemoryStore, PolicyKind, Request, Response, StatusCode};
/// use httpcache::transport::TransportError;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&calls);
/// let client = Client::builder()
///     .store(MemoryStore::new())
///     .policy(PolicyKind::FetchOnce)
///     .transport(move |_req: Request| {
///         counter.fetch_add(1, Ordering::SeqCst);
///         async { Ok::<_, TransportError>(Response::new(StatusCode::OK).body("fresh")) }
///     })
///     .build();
///
/// for _ in 0..3 {
///     let mut response = client.get("http://example.com/data.json").await.unwrap();
///     assert_eq!(response.text().await.unwrap(), "fresh");
/// }
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    policy: Arc<Policy>,
    in_flight: Arc<KeyLocks>,
}

impl Client {
    /// The default client: plain HTTP over TCP, a directory store rooted at
    /// the current directory, and the [`CacheFirst`](PolicyKind::CacheFirst)
    /// policy.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Builds a client over a [`TcpTransport`] from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut transport = TcpTransport::new().max_head_size(config.max_head_size);
        if let Some(agent) = &config.user_agent {
            transport = transport.user_agent(agent.clone());
        }
        Self::builder()
            .shared_store(config.build_store())
            .policy(config.policy)
            .transport(transport)
            .build()
    }

    /// Returns the store shared by this client.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Returns the policy and its state.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Sends `request` through the cache.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Transport`] — the transport failed; nothing was read
    ///   from or written to the store as a fallback.
    /// - [`ClientError::Body`] — the response body could not be read.
    /// - [`ClientError::PolicyWrite`] — the response was fetched but storing it
    ///   failed; the error carries the response.
    pub async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        let mut record = Record::from_url(request.url());

        // Held until the exchange completes, so a second caller for the same
        // key sees the first caller's result.
        let _flight = if self.policy.kind().single_flight() {
            Some(self.in_flight.lock(record.key()).await)
        } else {
            None
        };

        match self.policy.pre(self.store.as_ref(), &record).await {
            Ok(Some(payload)) => {
                debug!(key = record.key(), url = %request.url(), bytes = payload.len(), "served from cache");
                return Ok(cached_response(payload));
            }
            Ok(None) => {
                debug!(key = record.key(), url = %request.url(), "cache miss");
            }
            Err(e) => {
                warn!(key = record.key(), error = %e, "cache lookup failed, fetching from origin");
            }
        }

        let mut response = self.transport.perform(request).await?;
        record
            .buffer_response(&mut response)
            .await
            .map_err(ClientError::Body)?;

        if let Err(source) = self.policy.post(self.store.as_ref(), &record).await {
            warn!(key = record.key(), error = %source, "failed to store fetched response");
            return Err(ClientError::PolicyWrite {
                response: Box::new(response),
                source,
            });
        }
        Ok(response)
    }

    /// Sends a `GET` request for `url`.
    pub async fn get(&self, url: &str) -> Result<Response, ClientError> {
        self.execute(Request::get(url)?).await
    }

    /// Sends a `POST` request with the given content type and body.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response, ClientError> {
        self.execute(Request::post(url, content_type, body)?).await
    }

    /// Sends a form-encoded `POST` request.
    pub async fn post_form<I, K, V>(&self, url: &str, pairs: I) -> Result<Response, ClientError>
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<(K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.execute(Request::post_form(url, pairs)?).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("policy", &self.policy.kind())
            .finish_non_exhaustive()
    }
}

fn cached_response(payload: Bytes) -> Response {
    Response::new(StatusCode::OK).body(payload)
}

/// Builder for [`Client`]. Unset parts fall back to the [`Client::new`] defaults.
#[derive(Default)]
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn Store>>,
    policy: Option<Policy>,
}

impl ClientBuilder {
    /// Uses `transport` for network calls.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Uses `store` for cached payloads.
    #[must_use]
    pub fn store(mut self, store: impl Store + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Uses a store that is also held elsewhere.
    #[must_use]
    pub fn shared_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a fresh policy of the given kind, or a prepared [`Policy`].
    #[must_use]
    pub fn policy(mut self, policy: impl Into<Policy>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Finishes the client.
    pub fn build(self) -> Client {
        Client {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(TcpTransport::new())),
            store: self.store.unwrap_or_else(|| Arc::new(DirStore::default())),
            policy: Arc::new(self.policy.unwrap_or_default()),
            in_flight: Arc::new(KeyLocks::default()),
        }
    }
}
