//! Posting articles to a Discord channel through a webhook.
//!
//! Each article becomes one message:
//!
//! ```text
//! **<title>**
//! <url>
//! ```
//!
//! # Rate Limits
//!
//! On HTTP 429 the notifier waits the cool-down the server asks for and tries
//! again, up to `max_attempts` in total. The cool-down is read from the
//! `Retry-After` header (seconds), then from the JSON body's `retry_after`
//! field, and falls back to a fixed default. Any other non-2xx response, and
//! any transport error, fails the article without retrying.

use crate::error::NotifyError;
use crate::models::Article;
use crate::utils::truncate_for_log;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Discord rejects message content longer than this many characters.
const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Longest cool-down honoured from a server hint.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Something that can announce a single article.
pub trait Notify {
    async fn post(&self, article: &Article) -> Result<(), NotifyError>;
}

/// JSON body sent to the webhook.
#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
}

/// Subset of Discord's rate-limit response body.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Notifier backed by a Discord webhook URL.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    webhook_url: String,
    client: reqwest::Client,
    max_attempts: u32,
    default_retry_after: Duration,
}

impl DiscordWebhook {
    /// Create a notifier for `webhook_url`.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Per-request timeout, connect included.
    /// * `max_attempts` - Total tries when rate limited; values below 1 are treated as 1.
    /// * `default_retry_after` - Cool-down used when a 429 carries no usable hint.
    ///
    /// # Returns
    ///
    /// The notifier, or the `reqwest` error if the HTTP client cannot be built.
    pub fn new(
        webhook_url: String,
        timeout: Duration,
        max_attempts: u32,
        default_retry_after: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            webhook_url,
            client,
            max_attempts: max_attempts.max(1),
            default_retry_after,
        })
    }

    /// Cool-down requested by a 429 response.
    async fn retry_after(&self, resp: reqwest::Response) -> Duration {
        let from_header = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());

        let hint = match from_header {
            Some(secs) => Some(secs),
            None => resp
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|body| body.retry_after),
        };

        hint.filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())))
            .unwrap_or(self.default_retry_after)
    }
}

impl Notify for DiscordWebhook {
    #[instrument(level = "info", skip_all, fields(url = %article.url))]
    async fn post(&self, article: &Article) -> Result<(), NotifyError> {
        let message = WebhookMessage {
            content: format_message(article),
        };

        for attempt in 1..=self.max_attempts {
            let resp = self
                .client
                .post(&self.webhook_url)
                .json(&message)
                .send()
                .await?;
            let status = resp.status();

            if status.is_success() {
                debug!(attempt, %status, "Webhook accepted message");
                return Ok(());
            }

            if status != StatusCode::TOO_MANY_REQUESTS {
                let body = resp.text().await.unwrap_or_default();
                return Err(NotifyError::Rejected {
                    status: status.as_u16(),
                    body: truncate_for_log(&body, 300),
                });
            }

            if attempt == self.max_attempts {
                break;
            }
            let delay = self.retry_after(resp).await;
            warn!(attempt, max = self.max_attempts, ?delay, "Webhook rate limited; waiting");
            sleep(delay).await;
        }

        Err(NotifyError::RateLimited {
            attempts: self.max_attempts,
        })
    }
}

/// Notifier that only logs what it would post.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRun;

impl Notify for DryRun {
    async fn post(&self, article: &Article) -> Result<(), NotifyError> {
        info!(
            title = %article.title,
            url = %article.url,
            published = %article.published,
            "Dry run: would post article"
        );
        Ok(())
    }
}

/// Render the message body, shortening the title if the whole message would
/// exceed Discord's content limit.
pub fn format_message(article: &Article) -> String {
    // Four bold markers plus the newline.
    let overhead = 5 + article.url.chars().count();
    let budget = DISCORD_CONTENT_LIMIT.saturating_sub(overhead);

    let title = if article.title.chars().count() > budget {
        let kept: String = article.title.chars().take(budget.saturating_sub(1)).collect();
        format!("{kept}…")
    } else {
        article.title.clone()
    };
    format!("**{}**\n{}", title, article.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample() -> Article {
        Article {
            title: "Varlamore: Part Two".to_string(),
            url: "https://secure.runescape.com/m=news/varlamore".to_string(),
            published: Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap(),
        }
    }

    fn webhook(server: &MockServer, attempts: u32) -> DiscordWebhook {
        DiscordWebhook::new(
            format!("{}/api/webhooks/1/token", server.uri()),
            Duration::from_secs(5),
            attempts,
            Duration::from_millis(5),
        )
        .unwrap()
    }

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message(&sample()),
            "**Varlamore: Part Two**\nhttps://secure.runescape.com/m=news/varlamore"
        );
    }

    #[test]
    fn test_format_message_truncates_long_titles() {
        let mut article = sample();
        article.title = "x".repeat(5000);

        let message = format_message(&article);
        assert_eq!(message.chars().count(), DISCORD_CONTENT_LIMIT);
        assert!(message.ends_with(&article.url));
    }

    #[tokio::test]
    async fn test_post_sends_json_content() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/token"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "content": "**Varlamore: Part Two**\nhttps://secure.runescape.com/m=news/varlamore"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        webhook(&mock_server, 3).post(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_retries_after_rate_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        webhook(&mock_server, 3).post(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_reads_retry_after_from_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(serde_json::json!({"message": "You are being rate limited.", "retry_after": 0.01, "global": false})),
            )
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        webhook(&mock_server, 3).post(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_gives_up_when_always_rate_limited() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&mock_server)
            .await;

        let err = webhook(&mock_server, 2).post(&sample()).await.unwrap_err();
        assert!(matches!(err, NotifyError::RateLimited { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_post_does_not_retry_other_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Webhook"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = webhook(&mock_server, 3).post(&sample()).await.unwrap_err();
        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "Unknown Webhook");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_transport_error_is_final() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let notifier = DiscordWebhook::new(
            format!("http://127.0.0.1:{port}/api/webhooks/1/token"),
            Duration::from_secs(5),
            3,
            Duration::from_secs(60),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let err = notifier.post(&sample()).await.unwrap_err();

        assert!(matches!(err, NotifyError::Transport(_)));
        // A retry would have waited out the 60s default cool-down.
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        assert!(DryRun.post(&sample()).await.is_ok());
    }
}
