//! Transport-agnostic access to the server's stream-read endpoint (spec §6).
//!
//! `HttpStreamReader` is the production implementation, grounded on the
//! `reqwest`-based upstream fetch in `crates/agent/src/send_agent.rs`;
//! the `StreamReader` trait lets the subscriber sync loop (C5) be exercised
//! against a fake transport in tests without a live server.

use crate::error::{ClientError, ClientResult};
use crate::wire::{SubscriberRow, parse_wire_row, parse_wire_rows};
use async_trait::async_trait;
use bytes::Bytes;
use chatlog_ingest::{Frame, FrameDecoder};
use chatlog_store::Offset;
use futures_util::StreamExt;
use std::str::FromStr;

/// One catch-up or long-poll response: a batch of rows plus the resume
/// offset and up-to-date flag carried in the response headers (spec §6).
#[derive(Debug, Clone)]
pub struct Batch {
    pub rows: Vec<SubscriberRow>,
    pub next_offset: Offset,
    pub up_to_date: bool,
}

/// Live mode requested of the stream-read endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMode {
    /// No `live` query parameter: read available rows and return.
    CatchUp,
    /// `live=long-poll`: block server-side until new rows or timeout.
    LongPoll,
}

#[async_trait]
pub trait StreamReader: Send + Sync {
    /// Catch-up or long-poll read starting at `from_offset` (or from the
    /// start of the log if `None`).
    async fn read(&self, stream_url: &str, from_offset: Option<Offset>, mode: LiveMode) -> ClientResult<Batch>;

    /// Open an SSE connection starting at `from_offset`, yielding decoded
    /// rows as they arrive. The returned stream never completes on its own;
    /// the caller drops it to disconnect.
    async fn subscribe_sse(
        &self,
        stream_url: &str,
        from_offset: Option<Offset>,
    ) -> ClientResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ClientResult<SubscriberRow>> + Send>>>;
}

pub struct HttpStreamReader {
    client: reqwest::Client,
}

impl HttpStreamReader {
    pub fn new(client: reqwest::Client) -> Self {
        HttpStreamReader { client }
    }
}

impl Default for HttpStreamReader {
    fn default() -> Self {
        HttpStreamReader::new(reqwest::Client::new())
    }
}

fn header_offset(headers: &reqwest::header::HeaderMap, name: &str) -> ClientResult<Offset> {
    let raw = headers
        .get(name)
        .ok_or_else(|| ClientError::Transport(format!("missing {name} header")))?
        .to_str()
        .map_err(|err| ClientError::Transport(err.to_string()))?;
    Offset::from_str(raw).map_err(|err| ClientError::Transport(format!("invalid {name} header: {err}")))
}

fn header_bool(headers: &reqwest::header::HeaderMap, name: &str) -> bool {
    headers.get(name).and_then(|v| v.to_str().ok()) == Some("true")
}

#[async_trait]
impl StreamReader for HttpStreamReader {
    async fn read(&self, stream_url: &str, from_offset: Option<Offset>, mode: LiveMode) -> ClientResult<Batch> {
        let mut request = self.client.get(stream_url);
        if let Some(offset) = from_offset {
            request = request.query(&[("offset", offset.to_string())]);
        }
        if mode == LiveMode::LongPoll {
            request = request.query(&[("live", "long-poll")]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            let next_offset = header_offset(response.headers(), "stream-next-offset")?;
            return Ok(Batch { rows: Vec::new(), next_offset, up_to_date: true });
        }
        if !status.is_success() {
            return Err(ClientError::Transport(format!("stream read failed: {status}")));
        }

        let next_offset = header_offset(response.headers(), "stream-next-offset")?;
        let up_to_date = header_bool(response.headers(), "stream-up-to-date");
        let starting_offset = from_offset.unwrap_or(Offset::ZERO);
        let body = response.bytes().await?;
        let rows = parse_wire_rows(&body, starting_offset)?;
        Ok(Batch { rows, next_offset, up_to_date })
    }

    async fn subscribe_sse(
        &self,
        stream_url: &str,
        from_offset: Option<Offset>,
    ) -> ClientResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ClientResult<SubscriberRow>> + Send>>> {
        let mut request = self.client.get(stream_url).query(&[("live", "sse")]);
        if let Some(offset) = from_offset {
            request = request.query(&[("offset", offset.to_string())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Transport(format!("sse connect failed: {}", response.status())));
        }

        let mut offset = from_offset.unwrap_or(Offset::ZERO);
        let mut decoder = FrameDecoder::new();
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            while let Some(chunk) = byte_stream.next().await {
                let chunk: Bytes = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(ClientError::from(err));
                        return;
                    }
                };
                for frame in decoder.feed(&chunk) {
                    match frame {
                        Frame::Data(data) => {
                            match parse_wire_row(&data, offset) {
                                Ok(row) => {
                                    offset = offset.next();
                                    yield Ok(row);
                                }
                                Err(err) => yield Err(ClientError::from(err)),
                            }
                        }
                        Frame::Done => return,
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
