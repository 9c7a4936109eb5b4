use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_body_size: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_body_size: 10 * 1024 * 1024,
            user_agent: "Mozilla/5.0 (compatible; web-crawler/0.1)".to_string(),
        }
    }
}

/// What the fetch function hands back to the frontier/worker loop.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL that was requested.
    pub url: String,
    /// Where the server actually answered from (after any redirect chain
    /// the fetch function itself followed — the worker loop forbids
    /// automatic redirects, so this is usually equal to `url`).
    pub final_url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("location"))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("text/html"))
            .unwrap_or(false)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
