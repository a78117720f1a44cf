use std::time::Duration;

use conduit_config::ProviderId;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client whose reads fail after `read_timeout` of silence
pub(super) fn client(read_timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()
        .map_err(|e| ProviderError::unknown(format!("failed to build HTTP client: {e}")))
}

/// Send a request, classifying transport failures and non-success statuses
pub(super) async fn send(provider: ProviderId, builder: RequestBuilder) -> Result<Response, ProviderError> {
    let response = builder.send().await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "upstream request failed");
        ProviderError::from(e)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();

    tracing::warn!(provider = %provider, status = %status, "upstream returned error");

    Err(ProviderError::from_status(status, &body, retry_after))
}

pub(super) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::unknown(format!("failed to parse upstream response: {e}")))
}

/// `Retry-After` in delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn retry_after_accepts_seconds_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }
}
