//! Pure conversion of input `Message` records into `Event` subsequences.

use agentrun_domain::event::Event;
use agentrun_domain::message::{Message, Role};

/// Lowers a single `Message` to its ordered `Event` subsequence. Pure:
/// no side effects, no dedup — the caller (`RunCoordinator`) is
/// responsible for filtering out messages already seen on the thread.
pub fn message_to_events(msg: &Message) -> Vec<Event> {
    let mut events = Vec::new();

    if matches!(
        msg.role,
        Role::User | Role::Assistant | Role::System | Role::Developer
    ) {
        if let Some(content) = msg.content.as_ref().filter(|c| !c.is_empty()) {
            events.push(Event::TextMessageStart {
                message_id: msg.id.clone(),
                role: role_str(msg.role).to_string(),
            });
            events.push(Event::TextMessageContent {
                message_id: msg.id.clone(),
                delta: content.clone(),
            });
            events.push(Event::TextMessageEnd {
                message_id: msg.id.clone(),
            });
        }
    }

    if matches!(msg.role, Role::Assistant) {
        if let Some(tool_calls) = msg.tool_calls.as_ref().filter(|tc| !tc.is_empty()) {
            for tc in tool_calls {
                events.push(Event::ToolCallStart {
                    tool_call_id: tc.id.clone(),
                    tool_call_name: tc.function.name.clone(),
                    parent_message_id: msg.id.clone(),
                });
                events.push(Event::ToolCallArgs {
                    tool_call_id: tc.id.clone(),
                    delta: tc.function.arguments.clone(),
                });
                events.push(Event::ToolCallEnd {
                    tool_call_id: tc.id.clone(),
                });
            }
        }
    }

    if matches!(msg.role, Role::Tool) {
        if let Some(tool_call_id) = msg.tool_call_id.clone() {
            events.push(Event::ToolCallResult {
                message_id: msg.id.clone(),
                tool_call_id,
                content: msg.content.clone().unwrap_or_default(),
                role: "tool".to_string(),
            });
        }
    }

    events
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Developer => "developer",
        Role::Tool => "tool",
    }
}
