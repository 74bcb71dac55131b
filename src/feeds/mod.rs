// Read-only external data feeds: draft picks, league data, market values.
//
// All reads are anonymous GETs. Failures are typed so callers can decide
// whether to retry (transport/status/decode) or degrade to empty (shape).

pub mod cache;
pub mod ktc;
pub mod sleeper;

use std::time::Duration;

use serde::de::DeserializeOwned;

/// Per-request timeout for every feed.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("dynasty-assistant/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed JSON from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("unexpected payload shape from {url}: {what}")]
    Shape { url: String, what: String },
}

impl FeedError {
    /// Whether a later retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FeedError::Shape { .. })
    }
}

/// Build the shared HTTP client.
pub fn build_client() -> Result<reqwest::Client, FeedError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FeedError::Http {
            url: String::new(),
            source: e,
        })
}

/// GET `url` and return the body text, failing on non-2xx statuses.
pub async fn get_text(client: &reqwest::Client, url: &str) -> Result<String, FeedError> {
    let response = client.get(url).send().await.map_err(|e| FeedError::Http {
        url: url.to_string(),
        source: e,
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response.text().await.map_err(|e| FeedError::Http {
        url: url.to_string(),
        source: e,
    })
}

/// GET `url` and decode the body as JSON.
pub async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T, FeedError> {
    let body = get_text(client, url).await?;
    serde_json::from_str(&body).map_err(|e| FeedError::Decode {
        url: url.to_string(),
        source: e,
    })
}
