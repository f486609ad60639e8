//! SSE accumulation for the streaming variant.
//!
//! Frames arrive as `data: {...}\n\n` with terminator `data: [DONE]\n\n`;
//! incremental deltas live at `choices[0].delta.content`.

use eventsource_stream::Eventsource;
use futures::StreamExt;

use crate::provider::ProviderError;

/// Pull the delta text out of one streamed chunk, if any.
pub fn delta_from_chunk(value: &serde_json::Value) -> Option<&str> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

/// Drain an SSE response into the accumulated completion text.
pub async fn collect_streamed_text(response: reqwest::Response) -> Result<String, ProviderError> {
    let mut stream = response.bytes_stream().eventsource();
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| ProviderError::Transient {
            status: 0,
            message: format!("stream error: {e}"),
        })?;
        if event.data == "[DONE]" {
            break;
        }
        let value: serde_json::Value = serde_json::from_str(&event.data)
            .map_err(|e| ProviderError::MalformedResponse(format!("bad stream frame: {e}")))?;
        if let Some(delta) = delta_from_chunk(&value) {
            text.push_str(delta);
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_extraction() {
        let chunk = json!({"choices": [{"delta": {"content": "hel"}}]});
        assert_eq!(delta_from_chunk(&chunk), Some("hel"));

        let role_only = json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert_eq!(delta_from_chunk(&role_only), None);

        let empty = json!({"choices": []});
        assert_eq!(delta_from_chunk(&empty), None);
    }
}
