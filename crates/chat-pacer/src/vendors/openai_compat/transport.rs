use crate::chunk::RawEvent;
use crate::errors::ProviderError;
use crate::model::ProviderId;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental server-sent-events decoder; frames may span byte chunks.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame = parse_sse_frame(&self.buf[..idx]);
            self.buf.drain(..idx + delim_len);
            frames.extend(frame);
        }
        frames
    }

    /// Flushes a trailing frame the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_sse_frame(&rest)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    buf.windows(2)
        .position(|w| w == b"\n\n")
        .map(|idx| (idx, 2))
        .into_iter()
        .chain(buf.windows(4).position(|w| w == b"\r\n\r\n").map(|idx| (idx, 4)))
        .min_by_key(|(idx, _)| *idx)
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decodes one SSE frame into a raw chunk event.
///
/// Keep-alives, empty frames and the `[DONE]` sentinel yield `None`.
pub(crate) fn decode_chunk_frame(
    provider: &ProviderId,
    frame: &SseFrame,
) -> Result<Option<RawEvent>, ProviderError> {
    let data = frame.data.trim();
    if data.is_empty() || data == DONE_SENTINEL {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::transport(provider.clone(), format!("invalid SSE JSON frame: {e}"))
    })?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("upstream stream error");
        let status_code = error
            .get("code")
            .and_then(|v| v.as_u64())
            .and_then(|code| u16::try_from(code).ok());
        return Err(ProviderError::provider(provider.clone(), message, status_code));
    }
    serde_json::from_value(value).map(Some).map_err(|e| {
        ProviderError::protocol(provider.clone(), format!("unexpected chunk shape: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderId {
        ProviderId::new("openai-compat")
    }

    #[test]
    fn sse_decoder_handles_partial_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        let part1 = b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"hel";
        let part2 = b"lo\"}}]}\n\ndata: [DONE]\r\n\r\n";
        assert!(decoder.push_chunk(part1).is_empty());
        let frames = decoder.push_chunk(part2);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].data.contains("hello"));
        assert_eq!(frames[1].data, "[DONE]");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push_chunk(b": keep-alive\n\nevent: x\ndata: tail").is_empty());
        let frame = decoder.finish().expect("trailing frame");
        assert_eq!(frame.event.as_deref(), Some("x"));
        assert_eq!(frame.data, "tail");
    }

    #[test]
    fn decodes_chunk_frames_and_skips_done() {
        let frame = SseFrame {
            event: None,
            data: concat!(
                r#"{"id":"c1","object":"chat.completion.chunk","created":5,"model":"m","#,
                r#""choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"},"#,
                r#""finish_reason":null}]}"#,
            )
            .into(),
        };
        let event = decode_chunk_frame(&provider(), &frame)
            .expect("decode")
            .expect("event");
        assert_eq!(event.id, "c1");
        assert_eq!(event.created, 5);
        assert_eq!(event.choices[0].delta.content.as_deref(), Some("Hi"));

        let done = SseFrame {
            event: None,
            data: "[DONE]".into(),
        };
        assert_eq!(decode_chunk_frame(&provider(), &done).expect("done"), None);
    }

    #[test]
    fn error_frame_becomes_provider_error() {
        let frame = SseFrame {
            event: None,
            data: r#"{"error":{"message":"rate limited","code":429}}"#.into(),
        };
        let err = decode_chunk_frame(&provider(), &frame).expect_err("should fail");
        assert!(matches!(
            err,
            ProviderError::Provider {
                status_code: Some(429),
                ref message,
                ..
            } if message == "rate limited"
        ));
    }

    #[test]
    fn malformed_json_is_a_transport_error() {
        let frame = SseFrame {
            event: None,
            data: "{not json".into(),
        };
        let err = decode_chunk_frame(&provider(), &frame).expect_err("should fail");
        assert!(matches!(err, ProviderError::Transport { .. }));
    }
}
