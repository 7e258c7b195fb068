//! Parses a chat-completions SSE stream into accumulated token text.
//!
//! Mirrors the shape of an OpenAI-compatible `text/event-stream` response:
//! each event is a JSON chunk carrying a delta; the stream ends with the
//! literal `[DONE]` event.

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use crate::errors::LlmError;

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Consumes a byte stream from `reqwest::Response::bytes_stream()` and
/// returns the fully accumulated text, having driven every chunk through
/// `on_token`.
pub async fn collect_streamed_text<S, E>(
    byte_stream: S,
    role: &'static str,
    mut on_token: impl FnMut(&str),
) -> Result<String, LlmError>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut es = byte_stream.eventsource();
    let mut text = String::new();
    let mut saw_done = false;

    while let Some(event) = es.next().await {
        let event = event.map_err(|e| LlmError::MalformedOutput(role, e.to_string()))?;
        if event.data == "[DONE]" {
            saw_done = true;
            break;
        }
        let chunk: ChatCompletionChunk = serde_json::from_str(&event.data)
            .map_err(|e| LlmError::MalformedOutput(role, e.to_string()))?;
        for choice in &chunk.choices {
            if let Some(delta) = &choice.delta.content {
                on_token(delta);
                text.push_str(delta);
            }
        }
    }

    if !saw_done {
        return Err(LlmError::StreamTruncated { role });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn sse_event(data: &str) -> bytes::Bytes {
        bytes::Bytes::from(format!("data: {data}\n\n"))
    }

    #[tokio::test]
    async fn collects_text_across_chunks_and_stops_at_done() {
        let chunks = vec![
            Ok::<_, std::io::Error>(sse_event(
                r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            )),
            Ok(sse_event(r#"{"choices":[{"delta":{"content":"lo"}}]}"#)),
            Ok(sse_event("[DONE]")),
        ];
        let s = stream::iter(chunks);
        let mut seen = Vec::new();
        let text = collect_streamed_text(s, "synthesis", |tok| seen.push(tok.to_string()))
            .await
            .unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn missing_done_event_is_truncated() {
        let chunks = vec![Ok::<_, std::io::Error>(sse_event(
            r#"{"choices":[{"delta":{"content":"partial"}}]}"#,
        ))];
        let s = stream::iter(chunks);
        let err = collect_streamed_text(s, "planner", |_| {}).await.unwrap_err();
        assert!(matches!(err, LlmError::StreamTruncated { role: "planner" }));
    }
}
