//! # httpcache
//!
//! A transparent response cache that sits between an HTTP client and its
//! transport. Each request is mapped to a deterministic cache key; a pluggable
//! [`Policy`] decides whether the stored payload answers the request or the
//! origin is asked, and whether a fresh payload is written back to the
//! [`Store`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use httpcache::{CacheConfig, Client, PolicyKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig::new()
//!         .with_directory("./http-cache")
//!         .with_policy(PolicyKind::CacheFirst);
//!     let client = Client::from_config(&config);
//!
//!     // The first call goes to the origin and is stored; the second is served
//!     // from ./http-cache without touching the network.
//!     let mut first = client.get("http://example.com/index.html").await?;
//!     let mut second = client.get("http://example.com/index.html").await?;
//!     assert_eq!(first.bytes().await?, second.bytes().await?);
//!     Ok(())
//! }
//! ```

// ── Cache core ────────────────────────────────────────────────────────────────
pub mod client;
pub mod policy;
pub mod record;
pub mod store;

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod http;
pub mod transport;

pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use client::{Client, ClientBuilder, ClientError};
pub use config::{CacheConfig, StoreConfig};
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use policy::{Policy, PolicyKind};
pub use record::Record;
pub use store::{CacheError, DirStore, MemoryStore, Store};
pub use transport::{TcpTransport, Transport, TransportError};
