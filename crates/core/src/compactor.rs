//! Normalizes a run's raw event stream before persistence: merges
//! consecutive streaming text deltas, defers interleaved events until
//! their enclosing text message closes.

use std::collections::HashMap;

use agentrun_domain::event::Event;

struct OpenGroup {
    role: String,
    concatenated: String,
    buffered: Vec<Event>,
}

/// Pure compaction pass. `compact(compact(events)) == compact(events)`
/// — compacted output contains no split streaming deltas, so a second
/// pass is a no-op.
pub fn compact(events: Vec<Event>) -> Vec<Event> {
    let mut output = Vec::with_capacity(events.len());
    let mut open_order: Vec<String> = Vec::new();
    let mut open: HashMap<String, OpenGroup> = HashMap::new();

    for event in events {
        match event {
            Event::TextMessageStart { message_id, role } => {
                if !open.contains_key(&message_id) {
                    open_order.push(message_id.clone());
                    open.insert(
                        message_id,
                        OpenGroup {
                            role,
                            concatenated: String::new(),
                            buffered: Vec::new(),
                        },
                    );
                } else {
                    route_non_group_event(
                        Event::TextMessageStart { message_id, role },
                        &open_order,
                        &mut open,
                        &mut output,
                    );
                }
            }
            Event::TextMessageContent { message_id, delta } => {
                if let Some(group) = open.get_mut(&message_id) {
                    group.concatenated.push_str(&delta);
                } else {
                    route_non_group_event(
                        Event::TextMessageContent { message_id, delta },
                        &open_order,
                        &mut open,
                        &mut output,
                    );
                }
            }
            Event::TextMessageEnd { message_id } => {
                if let Some(pos) = open_order.iter().position(|id| *id == message_id) {
                    open_order.remove(pos);
                    let group = open.remove(&message_id).expect("tracked in open_order");
                    output.push(Event::TextMessageStart {
                        message_id: message_id.clone(),
                        role: group.role,
                    });
                    output.push(Event::TextMessageContent {
                        message_id: message_id.clone(),
                        delta: group.concatenated,
                    });
                    output.push(Event::TextMessageEnd { message_id });
                    output.extend(group.buffered);
                } else {
                    route_non_group_event(
                        Event::TextMessageEnd { message_id },
                        &open_order,
                        &mut open,
                        &mut output,
                    );
                }
            }
            other => route_non_group_event(other, &open_order, &mut open, &mut output),
        }
    }

    // Flush groups that never saw an END: no synthetic terminator.
    for message_id in open_order {
        let group = open.remove(&message_id).expect("tracked in open_order");
        output.push(Event::TextMessageStart {
            message_id: message_id.clone(),
            role: group.role,
        });
        output.push(Event::TextMessageContent {
            message_id,
            delta: group.concatenated,
        });
        output.extend(group.buffered);
    }

    output
}

/// Tool-call streaming and all other events: pass through when no text
/// group is open; otherwise buffer into the earliest-opened group
/// (insertion order), to be flushed right after its END.
fn route_non_group_event(
    event: Event,
    open_order: &[String],
    open: &mut HashMap<String, OpenGroup>,
    output: &mut Vec<Event>,
) {
    match open_order.first() {
        Some(first_open) => {
            open.get_mut(first_open)
                .expect("open_order entries always have a group")
                .buffered
                .push(event);
        }
        None => output.push(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_start(id: &str, role: &str) -> Event {
        Event::TextMessageStart {
            message_id: id.into(),
            role: role.into(),
        }
    }
    fn text_content(id: &str, delta: &str) -> Event {
        Event::TextMessageContent {
            message_id: id.into(),
            delta: delta.into(),
        }
    }
    fn text_end(id: &str) -> Event {
        Event::TextMessageEnd {
            message_id: id.into(),
        }
    }
    fn custom(id: &str) -> Event {
        Event::Custom {
            id: id.into(),
            name: "x".into(),
            value: None,
        }
    }
    fn run_finished() -> Event {
        Event::RunFinished {
            thread_id: "t1".into(),
            run_id: "r1".into(),
        }
    }

    #[test]
    fn merges_streaming_deltas_and_defers_interleaved_event() {
        let input = vec![
            text_start("m1", "user"),
            text_content("m1", "H"),
            text_content("m1", "i"),
            custom("c1"),
            text_content("m1", "!"),
            text_end("m1"),
            run_finished(),
        ];
        let out = compact(input);
        assert_eq!(out.len(), 5);
        assert!(matches!(&out[0], Event::TextMessageStart { message_id, .. } if message_id == "m1"));
        assert!(
            matches!(&out[1], Event::TextMessageContent { message_id, delta } if message_id == "m1" && delta == "Hi!")
        );
        assert!(matches!(&out[2], Event::TextMessageEnd { message_id } if message_id == "m1"));
        assert!(matches!(&out[3], Event::Custom { id, .. } if id == "c1"));
        assert!(matches!(&out[4], Event::RunFinished { .. }));
    }

    #[test]
    fn idempotent() {
        let input = vec![
            text_start("m1", "user"),
            text_content("m1", "H"),
            text_content("m1", "i"),
            custom("c1"),
            text_end("m1"),
            run_finished(),
        ];
        let once = compact(input);
        let twice = compact(once.clone());
        let once_json: Vec<String> = once
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect();
        let twice_json: Vec<String> = twice
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect();
        assert_eq!(once_json, twice_json);
    }

    #[test]
    fn unterminated_message_flushed_without_synthetic_end() {
        let input = vec![text_start("m1", "assistant"), text_content("m1", "Thin")];
        let out = compact(input);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Event::TextMessageStart { .. }));
        assert!(
            matches!(&out[1], Event::TextMessageContent { delta, .. } if delta == "Thin")
        );
    }

    #[test]
    fn tool_call_events_pass_through_unmodified_outside_a_group() {
        let input = vec![
            Event::ToolCallStart {
                tool_call_id: "tc1".into(),
                tool_call_name: "search".into(),
                parent_message_id: "m0".into(),
            },
            Event::ToolCallArgs {
                tool_call_id: "tc1".into(),
                delta: "{\"q\":1}".into(),
            },
            Event::ToolCallEnd {
                tool_call_id: "tc1".into(),
            },
        ];
        let out = compact(input.clone());
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn non_streaming_event_set_and_concatenation_preserved() {
        let input = vec![
            text_start("m1", "user"),
            text_content("m1", "a"),
            text_content("m1", "b"),
            text_end("m1"),
            custom("c1"),
        ];
        let out = compact(input);
        let concatenated: String = out
            .iter()
            .find_map(|e| match e {
                Event::TextMessageContent { delta, .. } => Some(delta.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(concatenated, "ab");
        assert!(out.iter().any(|e| matches!(e, Event::Custom { id, .. } if id == "c1")));
    }
}
