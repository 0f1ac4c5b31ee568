use futures::StreamExt;
use reqwest::header;
use std::time::Duration;
use thiserror::Error;

/// Default hard per-fetch time budget.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Browser-like identification; some publishers reject unknown agents.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; udnews/0.1)";
const ACCEPT: &str = "application/rss+xml, application/xml, text/xml";

/// Errors that can occur fetching one feed.
///
/// All variants are recoverable and scoped to a single source for a single
/// run. There are no retries at this layer; the next scheduled run is the
/// retry policy.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded its time budget
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("response too large")]
    ResponseTooLarge,
}

/// Build the shared HTTP client with the identification headers feeds see.
pub fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// Fetch a feed's raw body as text.
///
/// The whole exchange (connect, headers, body) shares one `timeout` budget;
/// when it expires the in-flight request is dropped and [`FetchError::Timeout`]
/// is returned. An empty body is an empty feed, not an error. The body is
/// decoded lossily so a feed with encoding problems still degrades to
/// whatever the parser can salvage instead of failing the source.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let fetch = async {
        let response = client
            .get(url)
            .header(header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    };

    tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| FetchError::Timeout)?
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: trust Content-Length when present
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
