use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Immutable snapshot of what a run was invoked with: messages, state,
/// tools, and context. Opaque to everything except `MessageInjector`,
/// which only looks at `messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInput {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// The closed set of event tags a run may produce. Tag names are
/// `SCREAMING_SNAKE_CASE`, field names are `camelCase` — the wire
/// contract is stable regardless of the implementation language.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "RUN_STARTED")]
    RunStarted {
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<RunInput>,
    },

    #[serde(rename = "RUN_FINISHED")]
    RunFinished {
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "runId")]
        run_id: String,
    },

    #[serde(rename = "RUN_ERROR")]
    RunError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
        role: String,
    },

    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
    },

    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolCallName")]
        tool_call_name: String,
        #[serde(rename = "parentMessageId")]
        parent_message_id: String,
    },

    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        delta: String,
    },

    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
    },

    #[serde(rename = "TOOL_CALL_RESULT")]
    ToolCallResult {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        content: String,
        role: String,
    },

    #[serde(rename = "CUSTOM")]
    Custom {
        id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
}

impl Event {
    /// The `messageId` this event is scoped to, if any. Used by
    /// `MessageInjector`'s dedup rule and by `connect()`'s
    /// already-seen-from-history suppression.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Event::TextMessageStart { message_id, .. }
            | Event::TextMessageContent { message_id, .. }
            | Event::TextMessageEnd { message_id, .. }
            | Event::ToolCallResult { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunFinished { .. } | Event::RunError { .. })
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Event::ToolCallStart { tool_call_id, .. }
            | Event::ToolCallArgs { tool_call_id, .. }
            | Event::ToolCallEnd { tool_call_id, .. }
            | Event::ToolCallResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_started_serializes_screaming_snake_tag_and_camel_fields() {
        let event = Event::RunStarted {
            thread_id: "t1".into(),
            run_id: "r1".into(),
            input: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"RUN_STARTED\""));
        assert!(json.contains("\"threadId\":\"t1\""));
        assert!(json.contains("\"runId\":\"r1\""));
        assert!(!json.contains("\"input\""));
    }

    #[test]
    fn tool_call_start_uses_camel_case_fields() {
        let event = Event::ToolCallStart {
            tool_call_id: "tc1".into(),
            tool_call_name: "search".into(),
            parent_message_id: "m1".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"toolCallId\":\"tc1\""));
        assert!(json.contains("\"toolCallName\":\"search\""));
        assert!(json.contains("\"parentMessageId\":\"m1\""));
    }
}
