//! Client library for the Double-O secret-management and API-proxy service.
//!
//! Resolves opaque tokens to secret values, fetches whole environment
//! mappings, and forwards HTTP requests to third-party APIs through the
//! service's authenticated proxy endpoint. Transient failures are retried
//! with exponential backoff and fetched values can be cached per call with a
//! TTL.
//!
//! Simple usage goes through the module-level functions, which share one
//! default-configured client:
//!
//! ```no_run
//! let secret = double_o::get_secret("YOUR_TOKEN", None)?;
//! let env = double_o::get_env("YOUR_VIRTUAL_ENV_TOKEN", None)?;
//! # Ok::<(), double_o::Error>(())
//! ```
//!
//! Explicit clients control the endpoint, timeout and retry budget:
//!
//! ```no_run
//! use std::time::Duration;
//! use double_o::{Config, ProxyOptions, blocking};
//!
//! let client = blocking::Client::with_config(Config {
//!     base_url: "http://localhost:3001".to_string(),
//!     retries: 3,
//!     ..Config::default()
//! })?;
//! let secret = client.get_secret("TOKEN", Some(Duration::from_secs(300)))?;
//! let result = client.proxy(
//!     "v1/chat/completions",
//!     "TOKEN",
//!     ProxyOptions::with_payload(serde_json::json!({"model": "gpt-4o-mini", "messages": []})),
//! )?;
//! # Ok::<(), double_o::Error>(())
//! ```
//!
//! The async variant exposes the same operations on the shared engine:
//!
//! ```no_run
//! # async fn run() -> Result<(), double_o::Error> {
//! use double_o::AsyncClient;
//!
//! let client = AsyncClient::new()?;
//! let secret = client.get_secret("TOKEN", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
mod retry;
pub mod types;

pub use cache::{CachedValue, SecretCache};
pub use client::AsyncClient;
pub use config::{Config, DEFAULT_BASE_URL};
pub use error::Error;
pub use types::{ChatMessage, ChatOptions, DEFAULT_CHAT_MODEL, ProxyOptions};

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use serde_json::Value;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The process-wide client backing the module-level convenience functions.
///
/// Lazily initialized with [`Config::default`] on first use and reused for
/// the lifetime of the process. Its cache is not shared with explicitly
/// constructed clients.
static DEFAULT_CLIENT: OnceLock<blocking::Client> = OnceLock::new();

fn default_client() -> Result<&'static blocking::Client> {
    if let Some(client) = DEFAULT_CLIENT.get() {
        return Ok(client);
    }
    let client = blocking::Client::new()?;
    // A racing initializer may win; either way a client is present afterwards.
    let _ = DEFAULT_CLIENT.set(client);
    DEFAULT_CLIENT
        .get()
        .ok_or_else(|| Error::Config("default client initialization failed".to_string()))
}

/// Fetches a secret value using the default client.
pub fn get_secret(token: &str, cache_ttl: Option<Duration>) -> Result<String> {
    default_client()?.get_secret(token, cache_ttl)
}

/// Fetches an environment mapping using the default client.
pub fn get_env(token: &str, cache_ttl: Option<Duration>) -> Result<HashMap<String, String>> {
    default_client()?.get_env(token, cache_ttl)
}

/// Fetches an environment mapping and writes it into the process environment
/// using the default client. See [`AsyncClient::load_env`] for the
/// thread-safety caveat.
pub fn load_env(token: &str, cache_ttl: Option<Duration>) -> Result<HashMap<String, String>> {
    default_client()?.load_env(token, cache_ttl)
}

/// Forwards a request through the proxy endpoint using the default client.
pub fn proxy(path: &str, token: &str, options: ProxyOptions) -> Result<Value> {
    default_client()?.proxy(path, token, options)
}

/// Chat-completion convenience call using the default client and the
/// default model.
pub fn chat(token: &str, messages: &[ChatMessage]) -> Result<Value> {
    default_client()?.chat_completion(token, messages, ChatOptions::default())
}

/// Invalidates the default client's cache: one token's entries, or all of
/// them when `token` is `None`. A no-op if the default client was never used.
pub fn invalidate_cache(token: Option<&str>) {
    if let Some(client) = DEFAULT_CLIENT.get() {
        client.invalidate_cache(token);
    }
}
