//! Blocking client facade.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::client::AsyncClient;
use crate::config::Config;
use crate::error::Error;
use crate::types::{ChatMessage, ChatOptions, ProxyOptions};

/// Blocking Double-O client.
///
/// Drives the same request engine as [`AsyncClient`] on an owned
/// current-thread runtime: every operation blocks the calling thread until
/// the underlying async call completes, and retry delays block the same way.
///
/// Must not be used from within an async runtime (the runtime will refuse to
/// block its own worker thread); use [`AsyncClient`] there instead. Dropping
/// the client releases the runtime and the connection resource.
#[derive(Debug)]
pub struct Client {
    inner: AsyncClient,
    runtime: tokio::runtime::Runtime,
}

impl Client {
    /// Creates a client with the default configuration.
    pub fn new() -> Result<Self, Error> {
        Self::with_config(Config::default())
    }

    /// Creates a client from `config`, validating it up front.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to start client runtime: {e}")))?;
        Ok(Self {
            inner: AsyncClient::with_config(config)?,
            runtime,
        })
    }

    /// The resolved configuration.
    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    /// Fetches the secret value behind `token`. See
    /// [`AsyncClient::get_secret`].
    pub fn get_secret(&self, token: &str, cache_ttl: Option<Duration>) -> Result<String, Error> {
        self.runtime.block_on(self.inner.get_secret(token, cache_ttl))
    }

    /// Fetches the environment mapping behind a virtual-env `token`. See
    /// [`AsyncClient::get_env`].
    pub fn get_env(
        &self,
        token: &str,
        cache_ttl: Option<Duration>,
    ) -> Result<HashMap<String, String>, Error> {
        self.runtime.block_on(self.inner.get_env(token, cache_ttl))
    }

    /// Fetches the environment mapping and writes each pair into the process
    /// environment. See [`AsyncClient::load_env`] for the thread-safety
    /// caveat.
    pub fn load_env(
        &self,
        token: &str,
        cache_ttl: Option<Duration>,
    ) -> Result<HashMap<String, String>, Error> {
        self.runtime.block_on(self.inner.load_env(token, cache_ttl))
    }

    /// Forwards a request through the proxy endpoint. See
    /// [`AsyncClient::proxy`].
    pub fn proxy(&self, path: &str, token: &str, options: ProxyOptions) -> Result<Value, Error> {
        self.runtime.block_on(self.inner.proxy(path, token, options))
    }

    /// Convenience wrapper for chat completions through the proxy. See
    /// [`AsyncClient::chat_completion`].
    pub fn chat_completion(
        &self,
        token: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<Value, Error> {
        self.runtime
            .block_on(self.inner.chat_completion(token, messages, options))
    }

    /// Invalidates cached values; see [`AsyncClient::invalidate_cache`].
    pub fn invalidate_cache(&self, token: Option<&str>) {
        self.inner.invalidate_cache(token);
    }

    /// Releases the underlying connection resource and runtime.
    ///
    /// Dropping the client has the same effect; this form makes the release
    /// point explicit.
    pub fn close(self) {}
}
