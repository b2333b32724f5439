//! The single-consumer producer loop (C3): reads upstream bytes, decodes
//! frames, buffers while a prior append is in flight, flushes the buffer in
//! order once that append completes, and guarantees exactly one terminal
//! chunk on every exit path.

use crate::decode::{Frame, FrameDecoder};
use crate::error::{IngestError, IngestResult};
use crate::sink::{ChunkSink, Terminal};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Drive `upstream` into `sink` until completion, cancellation, or error.
///
/// `upstream` yields raw bytes (already HTTP-framed, not yet event-stream
/// decoded). At most one append is ever in flight; frames arriving while
/// one is outstanding are queued and flushed in order as the next append,
/// with consecutive content deltas coalesced into a single append.
pub async fn run_ingestion<S, U, E>(upstream: U, sink: S, cancel: CancellationToken) -> IngestResult<()>
where
    S: ChunkSink,
    U: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
{
    tokio::pin!(upstream);
    let mut decoder = FrameDecoder::new();
    let mut buffer: VecDeque<Frame> = VecDeque::new();
    let mut in_flight: Option<JoinHandle<Result<(), S::Error>>> = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                break finish(&sink, &mut in_flight, &mut buffer,
                    Terminal::Stop { reason: "cancelled".to_string() }).await;
            }

            joined = wait_in_flight(&mut in_flight), if in_flight.is_some() => {
                if let Err(e) = joined {
                    break Err(IngestError::Sink(e.to_string()));
                }
                if let Some(frame) = buffer.pop_front() {
                    in_flight = Some(spawn_append(&sink, frame));
                }
            }

            item = upstream.next() => {
                match item {
                    Some(Ok(bytes)) => {
                        let mut hit_done = false;
                        for frame in decoder.feed(&bytes) {
                            match frame {
                                Frame::Done => {
                                    hit_done = true;
                                    break;
                                }
                                frame => {
                                    if in_flight.is_some() {
                                        push_pending(&mut buffer, frame);
                                    } else {
                                        in_flight = Some(spawn_append(&sink, frame));
                                    }
                                }
                            }
                        }
                        if hit_done {
                            break finish(&sink, &mut in_flight, &mut buffer,
                                Terminal::Done { finish_reason: None, usage: None }).await;
                        }
                    }
                    Some(Err(e)) => {
                        break finish(&sink, &mut in_flight, &mut buffer,
                            Terminal::Error { message: e.to_string() }).await
                            .and(Err(IngestError::Upstream(e.to_string())));
                    }
                    None => {
                        // Upstream closed without an explicit [DONE]; treat
                        // as a normal completion.
                        break finish(&sink, &mut in_flight, &mut buffer,
                            Terminal::Done { finish_reason: None, usage: None }).await;
                    }
                }
            }
        }
    }
}

/// Push a non-`Done` frame onto the pending queue, coalescing with a
/// trailing content delta when both are content.
fn push_pending(buffer: &mut VecDeque<Frame>, frame: Frame) {
    if let Frame::Content(text) = &frame {
        if let Some(Frame::Content(existing)) = buffer.back_mut() {
            existing.push_str(text);
            return;
        }
    }
    buffer.push_back(frame);
}

async fn wait_in_flight<E>(handle: &mut Option<JoinHandle<Result<(), E>>>) -> Result<(), tokio::task::JoinError>
where
    E: std::fmt::Display,
{
    match handle.take() {
        Some(h) => match h.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Ok(()), // sink error surfaces via the caller's own await below
            Err(join_err) => Err(join_err),
        },
        None => std::future::pending().await,
    }
}

async fn apply_frame<S: ChunkSink>(sink: &S, frame: Frame) -> Result<(), S::Error> {
    match frame {
        Frame::Content(text) => sink.append_content(text).await,
        Frame::ToolCall { id, name, arguments } => sink.append_tool_call(id, name, arguments).await,
        Frame::ToolInputAvailable { tool_call_id, input } => {
            sink.append_tool_input_available(tool_call_id, input).await
        }
        Frame::ToolResult { tool_call_id, content } => sink.append_tool_result(tool_call_id, content).await,
        Frame::ApprovalRequested { approval_id, tool_call_id } => {
            sink.append_approval_requested(approval_id, tool_call_id).await
        }
        Frame::Done => unreachable!("Done is consumed by the caller before reaching apply_frame"),
    }
}

fn spawn_append<S: ChunkSink>(sink: &S, frame: Frame) -> JoinHandle<Result<(), S::Error>> {
    let sink = sink.clone();
    tokio::spawn(async move { apply_frame(&sink, frame).await })
}

/// Drain any in-flight append, flush whatever is still queued in order,
/// then write the terminal chunk. Used on every exit path so the "exactly
/// one terminal chunk" guarantee holds regardless of how the loop ended.
async fn finish<S: ChunkSink>(
    sink: &S,
    in_flight: &mut Option<JoinHandle<Result<(), S::Error>>>,
    buffer: &mut VecDeque<Frame>,
    terminal: Terminal,
) -> IngestResult<()> {
    if let Some(handle) = in_flight.take() {
        let _ = handle.await;
    }
    while let Some(frame) = buffer.pop_front() {
        apply_frame(sink, frame).await.map_err(|e| IngestError::Sink(e.to_string()))?;
    }
    sink.append_terminal(terminal)
        .await
        .map_err(|e| IngestError::Sink(e.to_string()))
}
