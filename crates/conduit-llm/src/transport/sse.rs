use conduit_config::ProviderId;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::types::{EventStream, StreamEvent};

/// Decode an SSE response body with a provider-specific parser
///
/// `[DONE]` markers become [`StreamEvent::Done`] and empty messages are
/// skipped before `parse` sees them.
pub(super) fn events<F>(provider: ProviderId, response: Response, mut parse: F) -> EventStream
where
    F: FnMut(&str) -> Vec<Result<StreamEvent, ProviderError>> + Send + 'static,
{
    let events = response.bytes_stream().eventsource().flat_map(move |result| {
        let items = match result {
            Ok(event) => {
                let data = event.data.trim();

                if data.is_empty() {
                    Vec::new()
                } else if data == "[DONE]" {
                    vec![Ok(StreamEvent::Done)]
                } else {
                    parse(data)
                }
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "upstream stream failed");
                vec![Err(ProviderError::transient(format!("upstream stream failed: {e}")))]
            }
        };

        futures_util::stream::iter(items)
    });

    Box::pin(events)
}

/// Parse one SSE payload, skipping anything unrecognized
pub(super) fn decode<T: DeserializeOwned>(data: &str) -> Option<T> {
    serde_json::from_str(data)
        .inspect_err(|e| tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk"))
        .ok()
}
