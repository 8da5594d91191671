//! Fetches a URL twice through a directory cache.
//!
//! ```text
//! cargo run --example fetch -- http://example.com/ [policy]
//! ```
//!
//! The cache directory defaults to `./http-cache` and honours the
//! `HTTPCACHE_*` environment variables.

use std::time::Instant;

use httpcache::{CacheConfig, Client, ClientError, PolicyKind, StoreConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("httpcache=debug,fetch=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().ok_or("usage: fetch <url> [policy]")?;

    let mut config = CacheConfig::new().with_directory("./http-cache");
    config.apply_env(|name| std::env::var(name).ok())?;
    if let Some(policy) = args.next() {
        config.policy = policy.parse::<PolicyKind>()?;
    }
    if let StoreConfig::Directory { root } = &config.store {
        info!(root = %root.display(), policy = %config.policy, "using directory cache");
    }

    let client = Client::from_config(&config);
    for attempt in 1..=2 {
        let started = Instant::now();
        let mut response = match client.get(&url).await {
            Ok(response) => response,
            Err(e @ ClientError::PolicyWrite { .. }) => {
                warn!(error = %e, "response not cached");
                e.into_response().ok_or("missing response")?
            }
            Err(e) => return Err(e.into()),
        };
        let body = response.bytes().await?;
        info!(
            attempt,
            status = %response.status(),
            bytes = body.len(),
            elapsed = ?started.elapsed(),
            "fetched"
        );
    }
    Ok(())
}
