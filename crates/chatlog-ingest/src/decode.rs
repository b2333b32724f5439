//! Event-stream (SSE-shaped) frame decoder.
//!
//! Lines, `data: ...` payloads, comment lines (`:`-prefixed) ignored, the
//! `[DONE]` sentinel surfaced as a distinct [`Frame::Done`] so the pipeline
//! can tell "more data" from "upstream says it's finished" apart from the
//! byte stream actually closing.
//!
//! Each `data:` payload is itself a JSON object tagged on `type`; the tag
//! selects which [`Frame`] variant is produced. A payload that isn't a
//! recognized tagged object is treated as a raw content delta, so a plain
//! text upstream still decodes sensibly.

use serde::Deserialize;
use serde_json::Value;

/// A single decoded frame from the upstream byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Content(String),
    ToolCall {
        id: String,
        name: Option<String>,
        arguments: String,
    },
    ToolInputAvailable {
        tool_call_id: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        content: Value,
    },
    ApprovalRequested {
        approval_id: String,
        tool_call_id: Option<String>,
    },
    Done,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "content")]
    Content { delta: String },
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "tool-input-available")]
    ToolInputAvailable { tool_call_id: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult { tool_call_id: String, content: Value },
    #[serde(rename = "approval-requested")]
    ApprovalRequested {
        approval_id: String,
        #[serde(default)]
        tool_call_id: Option<String>,
    },
}

fn decode_event(data: &str) -> Frame {
    match serde_json::from_str::<WireEvent>(data) {
        Ok(WireEvent::Content { delta }) => Frame::Content(delta),
        Ok(WireEvent::ToolCall { id, name, arguments }) => Frame::ToolCall { id, name, arguments },
        Ok(WireEvent::ToolInputAvailable { tool_call_id, input }) => {
            Frame::ToolInputAvailable { tool_call_id, input }
        }
        Ok(WireEvent::ToolResult { tool_call_id, content }) => Frame::ToolResult { tool_call_id, content },
        Ok(WireEvent::ApprovalRequested { approval_id, tool_call_id }) => {
            Frame::ApprovalRequested { approval_id, tool_call_id }
        }
        Err(_) => Frame::Content(data.to_string()),
    }
}

/// Incremental line splitter: upstream bytes arrive in arbitrary chunk
/// boundaries, so a partial line is carried across calls to `feed`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.carry.push_str(&String::from_utf8_lossy(bytes));

        let mut frames = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let line: String = self.carry[..pos].trim_end_matches('\r').to_string();
            self.carry.drain(..=pos);

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim_start();
                if data == "[DONE]" {
                    frames.push(Frame::Done);
                } else {
                    frames.push(decode_event(data));
                }
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_data_line_as_content() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: hello\n");
        assert_eq!(frames, vec![Frame::Content("hello".to_string())]);
    }

    #[test]
    fn carries_partial_line_across_feeds() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: hel").is_empty());
        let frames = decoder.feed(b"lo\n");
        assert_eq!(frames, vec![Frame::Content("hello".to_string())]);
    }

    #[test]
    fn skips_comment_and_blank_lines() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b": keep-alive\n\ndata: x\n");
        assert_eq!(frames, vec![Frame::Content("x".to_string())]);
    }

    #[test]
    fn recognizes_done_sentinel() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: x\ndata: [DONE]\n");
        assert_eq!(frames, vec![Frame::Content("x".to_string()), Frame::Done]);
    }

    #[test]
    fn multiple_frames_in_one_feed() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: a\ndata: b\ndata: c\n");
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn decodes_tagged_content_event() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {\"type\":\"content\",\"delta\":\"hi\"}\n");
        assert_eq!(frames, vec![Frame::Content("hi".to_string())]);
    }

    #[test]
    fn decodes_tool_call_event() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: {\"type\":\"tool_call\",\"id\":\"T1\",\"name\":\"X\",\"arguments\":\"{\\\"a\\\":\"}\n",
        );
        assert_eq!(
            frames,
            vec![Frame::ToolCall {
                id: "T1".to_string(),
                name: Some("X".to_string()),
                arguments: "{\"a\":".to_string(),
            }]
        );
    }

    #[test]
    fn decodes_tool_call_continuation_without_name() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {\"type\":\"tool_call\",\"id\":\"T1\",\"arguments\":\"1}\"}\n");
        assert_eq!(
            frames,
            vec![Frame::ToolCall {
                id: "T1".to_string(),
                name: None,
                arguments: "1}".to_string(),
            }]
        );
    }

    #[test]
    fn decodes_approval_requested_event() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(
            b"data: {\"type\":\"approval-requested\",\"approval_id\":\"AP1\",\"tool_call_id\":\"T1\"}\n",
        );
        assert_eq!(
            frames,
            vec![Frame::ApprovalRequested {
                approval_id: "AP1".to_string(),
                tool_call_id: Some("T1".to_string()),
            }]
        );
    }

    #[test]
    fn unrecognized_json_falls_back_to_content() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {\"type\":\"unknown\",\"x\":1}\n");
        assert_eq!(
            frames,
            vec![Frame::Content("{\"type\":\"unknown\",\"x\":1}".to_string())]
        );
    }
}
