//! HTTP fetching with bounded linear backoff.
//!
//! # Architecture
//!
//! - [`Fetch`]: core trait, one attempt at retrieving a resource as text
//! - [`HttpFetch`]: `reqwest`-backed implementation
//! - [`RetryFetch`]: decorator that retries any [`Fetch`] implementation
//!
//! # Retry Strategy
//!
//! Network errors and non-2xx responses are both retryable. Before attempt
//! `n + 1` the fetcher waits `base_delay * n`, so with a 2 second base the
//! waits are 2s, 4s, 6s, ... After the last attempt it gives up and returns
//! `None`; callers treat that as "no new data this run".

use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// One attempt at retrieving a resource.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Plain HTTP GET returning the response body.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetch {
    async fn fetch(&self, url: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

/// Wrapper that retries an inner [`Fetch`] with linear backoff.
pub struct RetryFetch<T> {
    inner: T,
    max_attempts: u32,
    base_delay: Duration,
}

impl<T: Fetch> RetryFetch<T> {
    /// Wrap `inner` with linear backoff.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher each attempt is delegated to.
    /// * `max_attempts` - Total tries, the first included; values below 1 are treated as 1.
    /// * `base_delay` - Wait after the first failure; later waits grow by this amount.
    pub fn new(inner: T, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Fetch `url`, retrying until it succeeds or attempts run out.
    ///
    /// Returns `None` once every attempt has failed. Never returns an error.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &str) -> Option<String> {
        let total_t0 = Instant::now();

        for attempt in 1..=self.max_attempts {
            let attempt_t0 = Instant::now();
            match self.inner.fetch(url).await {
                Ok(body) => {
                    debug!(
                        attempt,
                        bytes = body.len(),
                        elapsed_ms = attempt_t0.elapsed().as_millis(),
                        "Fetched"
                    );
                    return Some(body);
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.base_delay.saturating_mul(attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        error = %e,
                        "Fetch exhausted retries"
                    );
                }
            }
        }
        None
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fails a fixed number of times, then succeeds.
    struct Flaky {
        failures: u32,
        calls: Cell<u32>,
    }

    impl Fetch for Flaky {
        async fn fetch(&self, _url: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n <= self.failures {
                Err(format!("failure {n}").into())
            } else {
                Ok("<html></html>".to_string())
            }
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures,
            calls: Cell::new(0),
        }
    }

    #[tokio::test]
    async fn test_returns_on_first_success() {
        let retry = RetryFetch::new(flaky(0), 3, Duration::from_millis(1));

        assert_eq!(retry.fetch("http://x").await.as_deref(), Some("<html></html>"));
        assert_eq!(retry.inner.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let retry = RetryFetch::new(flaky(2), 3, Duration::from_millis(1));

        assert!(retry.fetch("http://x").await.is_some());
        assert_eq!(retry.inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let retry = RetryFetch::new(flaky(u32::MAX), 4, Duration::from_millis(1));

        assert_eq!(retry.fetch("http://x").await, None);
        assert_eq!(retry.inner.calls.get(), 4);
    }

    #[tokio::test]
    async fn test_backoff_is_linear() {
        let retry = RetryFetch::new(flaky(u32::MAX), 3, Duration::from_millis(20));

        let t0 = Instant::now();
        retry.fetch("http://x").await;
        // 20ms after attempt 1, 40ms after attempt 2, nothing after the last.
        assert!(t0.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let retry = RetryFetch::new(flaky(0), 0, Duration::from_millis(1));

        assert!(retry.fetch("http://x").await.is_some());
        assert_eq!(retry.inner.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_http_non_2xx_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&mock_server)
            .await;

        let http = HttpFetch::new(Duration::from_secs(5)).unwrap();
        let retry = RetryFetch::new(http, 3, Duration::from_millis(1));
        let body = retry.fetch(&format!("{}/news", mock_server.uri())).await;

        assert_eq!(body.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_http_persistent_failure_returns_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let http = HttpFetch::new(Duration::from_secs(5)).unwrap();
        let retry = RetryFetch::new(http, 2, Duration::from_millis(1));

        assert_eq!(retry.fetch(&format!("{}/news", mock_server.uri())).await, None);
    }
}
