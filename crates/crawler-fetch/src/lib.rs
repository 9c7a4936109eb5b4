//! HEAD-then-GET fetch worker: confirms a resource is HTML before paying
//! for the body, and never follows redirects silently — the caller decides
//! whether to re-enqueue a redirect target.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use crawler_core::{CrawlError, FetchConfig, FetchResponse};
use crawler_frontier::policy::PolicyCache;

const REDIRECT_STATUSES: [u16; 4] = [301, 302, 307, 308];

pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Builds a fetcher with its own client (own cookie jar and connection
    /// pool) — callers should build one `Fetcher` per worker rather than
    /// sharing a client across concurrent fetches.
    pub fn new(config: FetchConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Fetches `url`, or returns `None` if robots.txt disallows it, the
    /// HEAD probe doesn't confirm HTML (or a redirect), or any transport
    /// error occurs. Redirects are surfaced as a [`FetchResponse`] with a
    /// 3xx status and a `Location` header for the caller to follow.
    pub async fn fetch(&self, policy: &PolicyCache, url: &str) -> Option<FetchResponse> {
        if !policy.can_fetch(url).await {
            debug!(url, "blocked by robots.txt");
            return None;
        }

        let head = match self.client.head(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url, error = %e, "head request failed");
                return None;
            }
        };

        let head_content_type = head
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let head_status = head.status();
        let head_is_html = head_status.is_success() && head_content_type.starts_with("text/html");
        if !(head_is_html || REDIRECT_STATUSES.contains(&head_status.as_u16())) {
            return None;
        }

        let start = Instant::now();
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "get request failed");
                return None;
            }
        };

        let status_code = resp.status();
        if !(status_code.is_success() || REDIRECT_STATUSES.contains(&status_code.as_u16())) {
            debug!(url, status = status_code.as_u16(), "non-2xx/redirect status, discarding");
            return None;
        }

        let status = status_code.as_u16();
        let final_url = resp.url().to_string();
        let mut headers = HashMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(url, error = %e, "body read failed");
                return None;
            }
        };
        if body.len() > self.config.max_body_size {
            debug!(url, size = body.len(), "body too large, discarding");
            return None;
        }

        Some(FetchResponse {
            url: url.to_string(),
            final_url,
            status,
            headers,
            body: body.to_vec(),
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(2),
            max_body_size: 1024 * 1024,
            user_agent: "test-crawler/1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn fetches_html_after_head_confirms() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = PolicyCache::new(10, Duration::from_millis(10), Duration::from_secs(1));
        let fetcher = Fetcher::new(test_config()).unwrap();
        let url = format!("{}/page", server.uri());
        let resp = fetcher.fetch(&policy, &url).await.unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.is_html());
    }

    #[tokio::test]
    async fn skips_non_html_after_head() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/img"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = PolicyCache::new(10, Duration::from_millis(10), Duration::from_secs(1));
        let fetcher = Fetcher::new(test_config()).unwrap();
        let url = format!("{}/img", server.uri());
        assert!(fetcher.fetch(&policy, &url).await.is_none());
    }

    #[tokio::test]
    async fn error_page_served_as_html_is_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = PolicyCache::new(10, Duration::from_millis(10), Duration::from_secs(1));
        let fetcher = Fetcher::new(test_config()).unwrap();
        let url = format!("{}/missing", server.uri());
        assert!(fetcher.fetch(&policy, &url).await.is_none());
    }

    #[tokio::test]
    async fn get_error_status_after_html_head_is_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(
                ResponseTemplate::new(500)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>error</html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = PolicyCache::new(10, Duration::from_millis(10), Duration::from_secs(1));
        let fetcher = Fetcher::new(test_config()).unwrap();
        let url = format!("{}/flaky", server.uri());
        assert!(fetcher.fetch(&policy, &url).await.is_none());
    }

    #[tokio::test]
    async fn redirect_status_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let policy = PolicyCache::new(10, Duration::from_millis(10), Duration::from_secs(1));
        let fetcher = Fetcher::new(test_config()).unwrap();
        let url = format!("{}/moved", server.uri());
        let resp = fetcher.fetch(&policy, &url).await.unwrap();
        assert!(resp.is_redirect());
        assert_eq!(resp.location(), Some("/new"));
    }
}
