//! Shared HTTP transport used by every source connector.
//!
//! Each call gets its own retry loop: transport failures back off
//! exponentially, while a TLS certificate verification failure switches the
//! remainder of that one call to a non-verifying client and retries at once.

use crate::backoff::{retry_with_backoff, Retry, RetryPolicy};
use crate::config::HttpConfig;
use crate::rate_limit::RateLimiter;
use crate::{Error, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const ACCEPT_VALUE: &str = "application/json, text/plain, */*";

pub struct Transport {
    verified: Client,
    unverified: Client,
    policy: RetryPolicy,
    default_timeout: Duration,
    limiter: Option<RateLimiter>,
}

impl Transport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("invalid http.user_agent: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));

        let verified = Client::builder()
            .default_headers(headers.clone())
            .build()?;
        let unverified = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            verified,
            unverified,
            policy: RetryPolicy::new(config.max_attempts, config.retry_base_delay_ms),
            default_timeout: config.timeout(),
            limiter: RateLimiter::per_second(config.requests_per_second),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches raw bytes, retrying transport failures per the retry policy.
    pub async fn fetch(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        self.with_retries(url, params, timeout, |_, body| Ok(body))
            .await
    }

    /// Fetches and decodes JSON. A body that fails to decode counts as a
    /// failed attempt and is retried.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T> {
        self.with_retries(url, params, timeout, |url, body| {
            serde_json::from_slice(&body).map_err(|e| Error::Decode {
                url: url.to_string(),
                details: e.to_string(),
            })
        })
        .await
    }

    pub async fn get_text(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<String> {
        let body = self.fetch(url, params, timeout).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn with_retries<T, D>(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
        decode: D,
    ) -> Result<T>
    where
        D: Fn(&str, Bytes) -> Result<T> + Sync,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);
        // Call-scoped: a downgrade never leaks into other calls.
        let insecure = AtomicBool::new(false);
        let transport = self;
        let decode = &decode;
        let insecure_ref = &insecure;

        retry_with_backoff(
            &self.policy,
            url,
            move |attempt| async move {
                let started = Instant::now();
                let body = transport
                    .send_once(url, params, timeout, insecure_ref.load(Ordering::Relaxed))
                    .await;
                metrics::histogram!("collector_transport_request_ms")
                    .record(started.elapsed().as_millis() as f64);
                let result = body.and_then(|body| decode(url, body));
                if let Err(e) = &result {
                    metrics::counter!("collector_transport_failures_total").increment(1);
                    debug!(url, attempt, error = %e, "Request attempt failed");
                }
                result
            },
            |e: &Error| {
                if !insecure.load(Ordering::Relaxed) && e.is_certificate_error() {
                    warn!(url, "TLS certificate verification failed, retrying without verification");
                    insecure.store(true, Ordering::Relaxed);
                    Retry::Immediately
                } else {
                    Retry::Backoff
                }
            },
        )
        .await
    }

    async fn send_once(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
        insecure: bool,
    ) -> Result<Bytes> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let client = if insecure { &self.unverified } else { &self.verified };
        let mut request = client.get(url).timeout(timeout);
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("policy", &self.policy)
            .field("default_timeout", &self.default_timeout)
            .field("limiter", &self.limiter)
            .finish()
    }
}
