use crate::LanguageModelError;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{stream::StreamExt, Stream};
use reqwest::{header::HeaderMap, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::pin::Pin;

pub type ChunkStream<R> = Pin<Box<dyn Stream<Item = Result<R, LanguageModelError>> + Send>>;

/// Send the request and turn any non-success status into
/// `LanguageModelError::StatusCode` carrying the response body.
async fn post_json<T: Serialize>(
    client: &Client,
    url: &str,
    data: &T,
    headers: HeaderMap,
) -> Result<Response, LanguageModelError> {
    let response = client.post(url).headers(headers).json(data).send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(LanguageModelError::StatusCode(
            status,
            response.text().await.unwrap_or_default(),
        ))
    }
}

/// Create a JSON request, parse the response.
pub async fn send_json<T: Serialize, R: DeserializeOwned>(
    client: &Client,
    url: &str,
    data: &T,
    headers: HeaderMap,
    provider: &'static str,
) -> Result<R, LanguageModelError> {
    let body = post_json(client, url, data, headers).await?.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        LanguageModelError::Invariant(provider, format!("Failed to parse response: {e}"))
    })
}

/// Create a JSON request that returns an SSE stream of JSON chunks.
/// Handles SSE parsing, JSON deserialization, and error conversion.
pub async fn send_sse_stream<T: Serialize, R: DeserializeOwned + Send + 'static>(
    client: &Client,
    url: &str,
    data: &T,
    headers: HeaderMap,
    provider: &'static str,
) -> Result<ChunkStream<R>, LanguageModelError> {
    let mut sse_stream = post_json(client, url, data, headers)
        .await?
        .bytes_stream()
        .eventsource();

    let stream = async_stream::try_stream! {
        while let Some(event) = sse_stream.next().await {
            let event: Event = event.map_err(|e| map_event_stream_error(e, provider))?;
            if event.data.is_empty() {
                continue;
            }
            if event.data == "[DONE]" {
                break;
            }

            let chunk: R = serde_json::from_str(&event.data).map_err(|e| {
                LanguageModelError::Invariant(
                    provider,
                    format!("Failed to parse stream chunk: {e}"),
                )
            })?;

            yield chunk;
        }
    };

    Ok(Box::pin(stream))
}

fn map_event_stream_error(
    error: EventStreamError<reqwest::Error>,
    provider: &'static str,
) -> LanguageModelError {
    match error {
        EventStreamError::Utf8(_) => LanguageModelError::Invariant(
            provider,
            "Receive invalid UTF-8 sequence for stream data".to_string(),
        ),
        EventStreamError::Parser(error) => LanguageModelError::Invariant(
            provider,
            format!("Receive invalid EventStream data: {error}"),
        ),
        EventStreamError::Transport(error) => LanguageModelError::Transport(error),
    }
}
