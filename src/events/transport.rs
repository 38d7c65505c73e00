//! # Event Stream Transport
//!
//! Transport seam for the persistent push channel. The production
//! implementation holds a long-lived HTTP response open and decodes
//! newline-delimited JSON frames into typed [`StreamEvent`]s; tests
//! substitute scripted streams.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::client::transport::build_auth_headers;
use crate::config::{EventStreamConfig, PlatformApiConfig};
use crate::error::{StewardError, StewardResult};

use super::types::StreamEvent;

/// A live stream of typed events; ends when the connection drops.
pub type EventStream = BoxStream<'static, StewardResult<StreamEvent>>;

/// Seam over the push connection so the stream manager can be driven by a
/// real HTTP channel in production and a scripted source in tests.
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Open one connection and return its event stream.
    async fn open(&self) -> StewardResult<EventStream>;
}

/// Production push transport: long-lived HTTP response delivering
/// newline-delimited JSON frames.
#[derive(Debug, Clone)]
pub struct HttpEventTransport {
    client: Client,
    url: Url,
}

impl HttpEventTransport {
    /// Build the streaming transport.
    ///
    /// Uses its own `reqwest` client: the request/response client carries a
    /// total request timeout, which would sever a long-lived stream. Only a
    /// connect timeout applies here.
    pub fn new(api: &PlatformApiConfig, events: &EventStreamConfig) -> StewardResult<Self> {
        let base_url = Url::parse(&api.base_url)
            .map_err(|e| StewardError::config_error(format!("Invalid base URL: {e}")))?;
        let url = base_url
            .join(&events.endpoint)
            .map_err(|e| StewardError::config_error(format!("Invalid events endpoint: {e}")))?;

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(api.timeout_ms))
            .user_agent(format!("steward-core/{}", env!("CARGO_PKG_VERSION")));

        if let Some(ref auth) = api.auth {
            let headers = build_auth_headers(auth)?;
            if !headers.is_empty() {
                builder = builder.default_headers(headers);
            }
        }

        let client = builder.build().map_err(|e| {
            StewardError::config_error(format!("Failed to build streaming client: {e}"))
        })?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn open(&self) -> StewardResult<EventStream> {
        debug!(url = %self.url, "Opening event stream");
        let resp = self.client.get(self.url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StewardError::api_error(status.as_u16(), message));
        }

        Ok(decode_frames(resp.bytes_stream().boxed()).boxed())
    }
}

/// Decode a byte stream into newline-delimited JSON event frames.
///
/// Malformed frames are logged and skipped rather than dropping the
/// connection; a transport error ends the stream after being surfaced.
pub(crate) fn decode_frames<S, B>(stream: S) -> impl Stream<Item = StewardResult<StreamEvent>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    futures::stream::unfold((stream, Vec::new()), |(mut inner, mut buf)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buf.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&raw);
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<StreamEvent>(line) {
                    Ok(event) => return Some((Ok(event), (inner, buf))),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed event frame");
                        continue;
                    }
                }
            }

            match inner.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => return Some((Err(StewardError::Http(e)), (inner, buf))),
                None => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunked(parts: Vec<&str>) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> + Unpin {
        stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<Result<Vec<u8>, reqwest::Error>>>(),
        )
    }

    #[tokio::test]
    async fn test_decode_frames_across_chunk_boundaries() {
        let frame = r#"{"type":"system_health_update","payload":{"groups":{},"generated_at":"2026-01-05T10:00:00Z"}}"#;
        let (head, tail) = frame.split_at(40);
        let source = chunked(vec![head, tail, "\n"]);

        let events: Vec<_> = decode_frames(source).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Ok(StreamEvent::SystemHealthUpdate(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_frames_skips_malformed_lines() {
        let good = r#"{"type":"realtime_metrics","payload":{"generated_at":"2026-01-05T10:00:00Z"}}"#;
        let source = chunked(vec!["not json\n", good, "\n"]);

        let events: Vec<_> = decode_frames(source).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::RealtimeMetrics(_))));
    }

    #[tokio::test]
    async fn test_decode_frames_ignores_blank_lines() {
        let source = chunked(vec!["\n\n\n"]);
        let events: Vec<_> = decode_frames(source).collect().await;
        assert!(events.is_empty());
    }
}
