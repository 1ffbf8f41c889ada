use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Advisory progress; may repeat and may be dropped under backpressure.
    Status,
    /// Terminal; at most one per operation.
    Done,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Status => "status",
            EventType::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub data: Value,
}

impl Event {
    pub fn status(data: Value) -> Self {
        Self {
            kind: EventType::Status,
            data,
        }
    }

    pub fn done(data: Value) -> Self {
        Self {
            kind: EventType::Done,
            data,
        }
    }

    pub fn done_success(data: Value) -> Self {
        Self::done(data)
    }

    pub fn done_failure(error: impl Into<String>) -> Self {
        Self::done(json!({ "status": "failed", "error": error.into() }))
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == EventType::Done
    }

    /// The `status` field of the payload, when present.
    pub fn status_field(&self) -> Option<&str> {
        self.data.get("status").and_then(Value::as_str)
    }
}
