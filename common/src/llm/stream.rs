use serde::{Deserialize, Serialize};

/// Typed frames of the reply stream. Clients switch on `type`; provider
/// errors travel in their own frame so the UI can degrade instead of
/// tearing down the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Chunk { delta: String },
    ToolStatus { tool: String, status: String },
    Actions { actions: Vec<serde_json::Value> },
    Done,
    Error { category: String, hint: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_serialize_with_type_tag() {
        let frame = StreamFrame::Chunk {
            delta: "hel".into(),
        };
        let json = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["delta"], "hel");

        let error = StreamFrame::Error {
            category: "ExternalProviderFailure".into(),
            hint: "llm unreachable".into(),
        };
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["type"], "error");

        let round: StreamFrame =
            serde_json::from_value(serde_json::json!({"type": "done"})).expect("deserialize");
        assert_eq!(round, StreamFrame::Done);
    }
}
