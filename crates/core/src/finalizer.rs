//! Closes any half-open messages/tool calls and emits the mandatory
//! terminal event on stop/error (spec §4.7). Grounded on spec §4.7
//! directly; no teacher analog (the teacher's `Run::finish` just
//! stamps a status enum, it never has to reconstruct well-formedness
//! over a half-emitted streaming protocol).

use agentrun_domain::event::Event;

/// Scans `buffer` and returns the events that must be appended before
/// compaction/persistence so invariants 3 and 4 hold for every stored
/// run, regardless of how it ended.
///
/// `agent_error` extends spec §4.7 step 3 (which only covers
/// `stopRequested`): an agent that returns `Err` without emitting a
/// terminal event gets a synthesized `RUN_ERROR{code:"AGENT_FAILURE"}`
/// instead of silently completing, mirroring the `RUN_FINISHED`
/// synthesis spec §4.7 step 4 already requires for the happy path
/// (see DESIGN.md's Open Question resolutions).
pub fn finalize(
    thread_id: &str,
    run_id: &str,
    buffer: &[Event],
    stop_requested: bool,
    agent_error: Option<&str>,
) -> Vec<Event> {
    let mut text_open: Vec<String> = Vec::new();
    let mut text_ended: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut tool_open: Vec<String> = Vec::new();
    let mut tool_ended: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut tool_result: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut has_terminal = false;

    for event in buffer {
        match event {
            Event::TextMessageStart { message_id, .. } => {
                if !text_open.contains(message_id) {
                    text_open.push(message_id.clone());
                }
            }
            Event::TextMessageEnd { message_id } => {
                text_ended.insert(message_id.clone());
            }
            Event::ToolCallStart { tool_call_id, .. } => {
                if !tool_open.contains(tool_call_id) {
                    tool_open.push(tool_call_id.clone());
                }
            }
            Event::ToolCallEnd { tool_call_id } => {
                tool_ended.insert(tool_call_id.clone());
            }
            Event::ToolCallResult { tool_call_id, .. } => {
                tool_result.insert(tool_call_id.clone());
            }
            Event::RunFinished { .. } | Event::RunError { .. } => has_terminal = true,
            _ => {}
        }
    }

    let mut appended = Vec::new();

    // Invariant 4 (every *_START has a matching *_END) binds every
    // completed run, not just the stop/error paths, so this runs
    // unconditionally.
    for message_id in &text_open {
        if !text_ended.contains(message_id) {
            appended.push(Event::TextMessageEnd {
                message_id: message_id.clone(),
            });
        }
    }
    for tool_call_id in &tool_open {
        if !tool_ended.contains(tool_call_id) {
            appended.push(Event::ToolCallEnd {
                tool_call_id: tool_call_id.clone(),
            });
        }
    }
    for tool_call_id in &tool_open {
        if !tool_result.contains(tool_call_id) {
            appended.push(Event::ToolCallResult {
                message_id: format!("{tool_call_id}-result"),
                tool_call_id: tool_call_id.clone(),
                role: "tool".to_string(),
                content: serde_json::json!({"status": "interrupted"}).to_string(),
            });
        }
    }

    if !has_terminal {
        if stop_requested {
            appended.push(Event::RunError {
                code: Some("STOPPED".to_string()),
                message: "Run stopped by user".to_string(),
            });
        } else if let Some(err) = agent_error {
            appended.push(Event::RunError {
                code: Some("AGENT_FAILURE".to_string()),
                message: err.to_string(),
            });
        } else {
            appended.push(Event::RunFinished {
                thread_id: thread_id.to_string(),
                run_id: run_id.to_string(),
            });
        }
    }

    appended
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_start(id: &str) -> Event {
        Event::TextMessageStart {
            message_id: id.into(),
            role: "assistant".into(),
        }
    }
    fn text_content(id: &str, delta: &str) -> Event {
        Event::TextMessageContent {
            message_id: id.into(),
            delta: delta.into(),
        }
    }

    #[test]
    fn normal_completion_without_terminal_synthesizes_run_finished() {
        let buffer = vec![text_start("m1"), text_content("m1", "hi")];
        let appended = finalize("t1", "r1", &buffer, false, None);
        assert_eq!(appended.len(), 2);
        assert!(matches!(appended[0], Event::TextMessageEnd { .. }));
        assert!(matches!(appended[1], Event::RunFinished { .. }));
    }

    #[test]
    fn stop_closes_half_open_message_and_appends_stopped_error() {
        let buffer = vec![text_start("m1"), text_content("m1", "Thin")];
        let appended = finalize("t1", "r1", &buffer, true, None);
        assert_eq!(appended.len(), 2);
        assert!(matches!(&appended[0], Event::TextMessageEnd { message_id } if message_id == "m1"));
        match &appended[1] {
            Event::RunError { code, .. } => assert_eq!(code.as_deref(), Some("STOPPED")),
            other => panic!("expected RunError, got {other:?}"),
        }
    }

    #[test]
    fn stop_closes_open_tool_call_without_result() {
        let buffer = vec![Event::ToolCallStart {
            tool_call_id: "tc1".into(),
            tool_call_name: "search".into(),
            parent_message_id: "m0".into(),
        }];
        let appended = finalize("t1", "r1", &buffer, true, None);
        assert!(appended
            .iter()
            .any(|e| matches!(e, Event::ToolCallEnd { tool_call_id } if tool_call_id == "tc1")));
        assert!(appended.iter().any(|e| matches!(
            e,
            Event::ToolCallResult { tool_call_id, content, .. }
                if tool_call_id == "tc1" && content.contains("interrupted")
        )));
    }

    #[test]
    fn existing_terminal_event_is_not_duplicated() {
        let buffer = vec![Event::RunFinished {
            thread_id: "t1".into(),
            run_id: "r1".into(),
        }];
        let appended = finalize("t1", "r1", &buffer, false, None);
        assert!(appended.is_empty());
    }

    #[test]
    fn agent_failure_without_terminal_synthesizes_agent_failure_error() {
        let buffer = vec![text_start("m1"), text_content("m1", "partial")];
        let appended = finalize("t1", "r1", &buffer, false, Some("boom"));
        assert!(appended
            .iter()
            .any(|e| matches!(e, Event::TextMessageEnd { message_id } if message_id == "m1")));
        match appended.last().unwrap() {
            Event::RunError { code, message } => {
                assert_eq!(code.as_deref(), Some("AGENT_FAILURE"));
                assert_eq!(message, "boom");
            }
            other => panic!("expected RunError, got {other:?}"),
        }
    }

    #[test]
    fn finished_tool_call_is_left_untouched() {
        let buffer = vec![
            Event::ToolCallStart {
                tool_call_id: "tc1".into(),
                tool_call_name: "search".into(),
                parent_message_id: "m0".into(),
            },
            Event::ToolCallEnd {
                tool_call_id: "tc1".into(),
            },
            Event::ToolCallResult {
                message_id: "m1".into(),
                tool_call_id: "tc1".into(),
                content: "42".into(),
                role: "tool".into(),
            },
            Event::RunFinished {
                thread_id: "t1".into(),
                run_id: "r1".into(),
            },
        ];
        let appended = finalize("t1", "r1", &buffer, true, None);
        assert!(appended.is_empty());
    }
}
