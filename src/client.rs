//! Async client: the request engine shared by both facades.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Map, Value};

use crate::cache::{CachedValue, SecretCache};
use crate::config::Config;
use crate::error::{Error, Operation};
use crate::retry::{
    RetryPolicy, classify_service_error, classify_status, classify_transport, malformed_response,
};
use crate::types::{ChatMessage, ChatOptions, EnvResponse, ProxyOptions, SecretResponse};

/// Env mappings share the cache with secrets, namespaced by this prefix so a
/// token used for both kinds of fetch never collides with itself.
const ENV_CACHE_PREFIX: &str = "env:";

/// Async Double-O client for non-blocking secret management and proxy calls.
///
/// Owns one connection pool and one cache; separate clients share neither.
/// All operations suspend only at the HTTP call and between retry attempts.
/// Dropping the client releases the connection resource; in-flight calls can
/// be cancelled by dropping their futures, which never leaves the cache in a
/// half-written state.
#[derive(Debug)]
pub struct AsyncClient {
    http: reqwest::Client,
    config: Config,
    cache: SecretCache,
    policy: RetryPolicy,
}

impl AsyncClient {
    /// Creates a client with the default configuration.
    pub fn new() -> Result<Self, Error> {
        Self::with_config(Config::default())
    }

    /// Creates a client from `config`, validating it up front.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let config = config.validated()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        let policy = RetryPolicy {
            retries: config.retries,
            backoff_factor: config.backoff_factor,
        };
        Ok(Self {
            http,
            config,
            cache: SecretCache::new(),
            policy,
        })
    }

    /// The resolved configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetches the secret value behind `token`.
    ///
    /// The cache is consulted first; on a miss the secret endpoint is called
    /// with the token as bearer credential, retried per the configured
    /// policy. With `cache_ttl` set to a non-zero duration the fetched value
    /// is cached for that long; otherwise the call never populates the cache.
    #[tracing::instrument(skip(self, token))]
    pub async fn get_secret(
        &self,
        token: &str,
        cache_ttl: Option<Duration>,
    ) -> Result<String, Error> {
        if let Some(CachedValue::Secret(value)) = self.cache.get(token) {
            debug!("get_secret: cache hit");
            return Ok(value);
        }

        let url = format!("{}/api/secret", self.config.base_url);
        debug!("Fetching secret from {}...", url);

        let value = self
            .policy
            .run("get_secret", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = token.to_string();
                async move {
                    let response = http
                        .get(&url)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| classify_transport(Operation::Secret, e))?;

                    let status = response.status();
                    if !status.is_success() {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(classify_status(Operation::Secret, status, &detail));
                    }

                    let body: SecretResponse = response
                        .json()
                        .await
                        .map_err(|e| classify_transport(Operation::Secret, e))?;

                    match body {
                        SecretResponse {
                            value: Some(value), ..
                        } => Ok(value),
                        SecretResponse {
                            error: Some(message),
                            ..
                        } => Err(classify_service_error(Operation::Secret, &message)),
                        SecretResponse { .. } => Err(malformed_response(
                            Operation::Secret,
                            "response contained no value",
                        )),
                    }
                }
            })
            .await?;

        self.cache
            .put(token, CachedValue::Secret(value.clone()), cache_ttl);
        Ok(value)
    }

    /// Fetches the environment mapping behind a virtual-env `token`.
    ///
    /// Caching follows the same opt-in TTL rule as [`get_secret`], with the
    /// whole mapping stored as one entry.
    ///
    /// [`get_secret`]: AsyncClient::get_secret
    #[tracing::instrument(skip(self, token))]
    pub async fn get_env(
        &self,
        token: &str,
        cache_ttl: Option<Duration>,
    ) -> Result<HashMap<String, String>, Error> {
        let cache_key = format!("{ENV_CACHE_PREFIX}{token}");
        if let Some(CachedValue::Env(mapping)) = self.cache.get(&cache_key) {
            debug!("get_env: cache hit");
            return Ok(mapping);
        }

        let url = format!("{}/api/env", self.config.base_url);
        debug!("Fetching environment from {}...", url);

        let mapping = self
            .policy
            .run("get_env", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = token.to_string();
                async move {
                    let response = http
                        .get(&url)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| classify_transport(Operation::Env, e))?;

                    let status = response.status();
                    if !status.is_success() {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(classify_status(Operation::Env, status, &detail));
                    }

                    let body: EnvResponse = response
                        .json()
                        .await
                        .map_err(|e| classify_transport(Operation::Env, e))?;

                    match body {
                        EnvResponse {
                            secrets: Some(secrets),
                            ..
                        } => Ok(secrets),
                        EnvResponse {
                            error: Some(message),
                            ..
                        } => Err(classify_service_error(Operation::Env, &message)),
                        EnvResponse { .. } => Err(malformed_response(
                            Operation::Env,
                            "response contained no secrets",
                        )),
                    }
                }
            })
            .await?;

        self.cache
            .put(&cache_key, CachedValue::Env(mapping.clone()), cache_ttl);
        Ok(mapping)
    }

    /// Fetches the environment mapping and writes each pair into the process
    /// environment.
    ///
    /// Mutating the environment is not thread-safe on most platforms: call
    /// this during startup, before other threads read or write env vars.
    #[tracing::instrument(skip(self, token))]
    pub async fn load_env(
        &self,
        token: &str,
        cache_ttl: Option<Duration>,
    ) -> Result<HashMap<String, String>, Error> {
        let secrets = self.get_env(token, cache_ttl).await?;
        for (key, value) in &secrets {
            // SAFETY: callers uphold that no other thread concurrently reads
            // or writes the process environment (see method docs).
            unsafe { std::env::set_var(key, value) };
        }
        Ok(secrets)
    }

    /// Forwards a request to the third-party API behind the proxy endpoint.
    ///
    /// `path` is joined under `/api/proxy/`; the token is sent as the bearer
    /// credential and caller-supplied headers never override `Authorization`.
    /// Responses are parsed as JSON and returned verbatim, never cached.
    #[tracing::instrument(skip(self, token, options))]
    pub async fn proxy(
        &self,
        path: &str,
        token: &str,
        options: ProxyOptions,
    ) -> Result<Value, Error> {
        let url = format!(
            "{}/api/proxy/{}",
            self.config.base_url,
            path.trim_start_matches('/')
        );
        debug!("Proxying {} {}...", options.method, url);

        self.policy
            .run("proxy", || {
                let http = self.http.clone();
                let url = url.clone();
                let token = token.to_string();
                let method = options.method.clone();
                let payload = options.payload.clone();
                let caller_headers = options.headers.clone();
                async move {
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    headers.extend(caller_headers);

                    // Authorization is applied after the merge; caller
                    // headers never override it.
                    let request = http
                        .request(method, &url)
                        .headers(headers)
                        .bearer_auth(&token);
                    let request = match payload {
                        Some(body) => request.json(&body),
                        None => request,
                    };

                    let response = request
                        .send()
                        .await
                        .map_err(|e| classify_transport(Operation::Proxy, e))?;

                    let status = response.status();
                    if !status.is_success() {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(classify_status(Operation::Proxy, status, &detail));
                    }

                    response
                        .json::<Value>()
                        .await
                        .map_err(|e| classify_transport(Operation::Proxy, e))
                }
            })
            .await
    }

    /// Convenience wrapper for chat completions through the proxy.
    ///
    /// Builds the `{"model": ..., "messages": [...]}` payload, merges
    /// `options.extra` over it and posts to `v1/chat/completions`.
    #[tracing::instrument(skip(self, token, messages, options))]
    pub async fn chat_completion(
        &self,
        token: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<Value, Error> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), Value::String(options.model));
        let messages = serde_json::to_value(messages).map_err(|e| Error::Proxy {
            message: format!("failed to encode chat messages: {e}"),
            status: None,
            source: None,
        })?;
        payload.insert("messages".to_string(), messages);
        payload.extend(options.extra);

        self.proxy(
            "v1/chat/completions",
            token,
            ProxyOptions::with_payload(Value::Object(payload)),
        )
        .await
    }

    /// Invalidates cached values.
    ///
    /// With a token, removes that token's secret and env entries; with
    /// `None`, clears this client's entire cache.
    pub fn invalidate_cache(&self, token: Option<&str>) {
        match token {
            Some(token) => {
                self.cache.invalidate(token);
                self.cache.invalidate(&format!("{ENV_CACHE_PREFIX}{token}"));
            }
            None => self.cache.clear(),
        }
    }

    /// Releases the underlying connection resource.
    ///
    /// Dropping the client has the same effect; this form makes the release
    /// point explicit.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer, retries: u32) -> Config {
        Config {
            base_url: server.uri(),
            retries,
            backoff_factor: 0.05,
            ..Config::default()
        }
    }

    fn secret_ok(value: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
    }

    #[tokio::test]
    async fn test_transient_failures_recover_within_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(secret_ok("s3cr3t"))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(Config {
            backoff_factor: 0.1,
            ..test_config(&server, 2)
        })
        .unwrap();

        let started = Instant::now();
        let value = client
            .get_secret("tok", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(value, "s3cr3t");
        // Two retries with backoff 0.1 wait 0.1s + 0.2s before succeeding.
        assert!(started.elapsed() >= Duration::from_millis(300));

        // The recovered value was cached; this read issues no new request.
        let again = client
            .get_secret("tok", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(again, "s3cr3t");

        server.verify().await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(test_config(&server, 5)).unwrap();
        let err = client.get_secret("tok", None).await.unwrap_err();

        assert!(matches!(err, Error::Secret { .. }));
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(test_config(&server, 3)).unwrap();
        let err = client.get_secret("tok", None).await.unwrap_err();

        assert!(matches!(err, Error::Secret { .. }));
        assert!(std::error::Error::source(&err).is_some());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_timeout_is_retried_and_surfaces_transport_cause() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(secret_ok("late").set_delay(Duration::from_secs(5)))
            .expect(2)
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(Config {
            timeout: Duration::from_millis(100),
            ..test_config(&server, 1)
        })
        .unwrap();

        let err = client.get_secret("tok", None).await.unwrap_err();
        assert!(matches!(err, Error::Secret { .. }));
        assert!(std::error::Error::source(&err).is_some());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_operations_on_distinct_tokens_are_independent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .and(header("authorization", "Bearer tok_a"))
            .respond_with(secret_ok("value_a"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .and(header("authorization", "Bearer tok_b"))
            .respond_with(secret_ok("value_b"))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(test_config(&server, 0)).unwrap();
        let (a, b) = tokio::join!(
            client.get_secret("tok_a", Some(Duration::from_secs(60))),
            client.get_secret("tok_b", Some(Duration::from_secs(60)))
        );

        assert_eq!(a.unwrap(), "value_a");
        assert_eq!(b.unwrap(), "value_b");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_fetch_failure_is_surfaced_not_masked_by_expired_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(secret_ok("fresh"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/secret"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(test_config(&server, 0)).unwrap();
        let value = client
            .get_secret("tok", Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(value, "fresh");

        // Entry expires, the refetch fails, and the failure is surfaced
        // rather than masked by the stale value.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let err = client
            .get_secret("tok", Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Secret { .. }));
    }

    #[tokio::test]
    async fn test_chat_completion_merges_extra_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/proxy/v1/chat/completions"))
            .and(wiremock::matchers::body_partial_json(json!({
                "model": "gpt-4o",
                "temperature": 0.2,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsyncClient::with_config(test_config(&server, 0)).unwrap();
        let mut extra = Map::new();
        extra.insert("temperature".to_string(), json!(0.2));
        let response = client
            .chat_completion(
                "tok",
                &[ChatMessage::user("hi")],
                ChatOptions {
                    model: "gpt-4o".to_string(),
                    extra,
                },
            )
            .await
            .unwrap();

        assert_eq!(response, json!({"choices": []}));
        server.verify().await;
    }
}
