use serde::{Deserialize, Serialize};
use travel_assistant_model::{ResponseChunk, ToolCallRequest};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    /// A structured chunk with a single text part.
    #[serde(rename = "text")]
    Text(String),
    /// A flat chunk with the given text.
    #[serde(rename = "flat_text")]
    FlatText(String),
    /// An arbitrary chunk, e.g. one without any text.
    #[serde(rename = "chunk")]
    Chunk(ResponseChunk),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// Where a preset response should fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    /// The request itself is rejected.
    OnRequest,
    /// The response breaks after delivering this many events.
    AfterEvents(usize),
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the response fails at the given point.
    pub failure: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failure: None,
        }
    }

    /// Creates a `PresetResponse` made of structured text chunks.
    #[inline]
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            texts
                .into_iter()
                .map(|t| PresetEvent::Text(t.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a `PresetResponse` whose request is rejected.
    #[inline]
    pub fn rejected() -> Self {
        Self::with_events([]).with_failure(PresetFailure::OnRequest)
    }

    /// Makes the response fail at the given point.
    #[inline]
    pub fn with_failure(mut self, failure: PresetFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::Text("Let me check the rates.".to_string()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "1".to_string(),
                name: "get_currency_exchange".to_string(),
                arguments: json!({
                    "from_currency": "USD",
                    "to_currency": "EUR",
                    "amount": 100.0
                }),
            }),
        ])
        .with_failure(PresetFailure::AfterEvents(1));

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }
}
