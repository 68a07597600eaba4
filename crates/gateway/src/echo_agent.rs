//! The one built-in agent: echoes the thread's latest user message back
//! word by word. Exists for manual exploration (`/info`, `curl`-able
//! runs) and the gateway's own integration tests — real agents are
//! expected to be supplied by the embedding application, not this
//! crate. No teacher analog (the teacher's agents are LLM-backed);
//! written in the struct-plus-`#[async_trait]` style the teacher uses
//! for its own service traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentrun_core::{Agent, AgentCallbacks};
use agentrun_domain::error::Result;
use agentrun_domain::event::{Event, RunInput};
use async_trait::async_trait;
use uuid::Uuid;

pub struct EchoAgent {
    cancelled: Arc<AtomicBool>,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for EchoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for EchoAgent {
    async fn run_agent(&self, input: RunInput, callbacks: Arc<dyn AgentCallbacks>) -> Result<()> {
        callbacks.on_run_started().await;
        callbacks
            .on_event(Event::RunStarted {
                thread_id: String::new(),
                run_id: String::new(),
                input: None,
            })
            .await;

        let reply = input
            .messages
            .iter()
            .rev()
            .find(|m| m.content.is_some())
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let message_id = Uuid::new_v4().to_string();
        callbacks
            .on_event(Event::TextMessageStart {
                message_id: message_id.clone(),
                role: "assistant".into(),
            })
            .await;

        for word in reply.split_whitespace() {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }
            callbacks
                .on_event(Event::TextMessageContent {
                    message_id: message_id.clone(),
                    delta: format!("{word} "),
                })
                .await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        callbacks
            .on_event(Event::TextMessageEnd {
                message_id: message_id.clone(),
            })
            .await;

        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }

        callbacks
            .on_event(Event::RunFinished {
                thread_id: String::new(),
                run_id: String::new(),
            })
            .await;
        Ok(())
    }

    fn abort_run(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn clone_boxed(&self) -> Box<dyn Agent> {
        Box::new(EchoAgent::new())
    }
}

/// Lookup-by-`agentId` registry the gateway consults for `POST
/// /agent/:agentId/run` and `GET /info`'s agent listing.
pub struct AgentCatalog {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
        agents.insert("echo".into(), Arc::new(EchoAgent::new()));
        Self { agents }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::coordinator::{ConnectRequest, RunCoordinator, RunRequest};
    use agentrun_core::scope_gate::ScopeDecision;
    use agentrun_core::{EventBus, ThreadStore};
    use agentrun_domain::config::ThreadStoreConfig;
    use agentrun_domain::message::{Message, Role};
    use agentrun_domain::scope::ResourceScope;
    use futures_util::StreamExt;

    fn store() -> Arc<ThreadStore> {
        let path = std::env::temp_dir().join(format!("agentrun-echo-test-{}", Uuid::new_v4()));
        Arc::new(
            ThreadStore::new(&ThreadStoreConfig {
                data_dir: path.to_string_lossy().to_string(),
                suggestion_marker: "__suggestion__".into(),
                default_list_limit: 20,
                max_list_limit: 100,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn catalog_resolves_echo_and_rejects_unknown_ids() {
        let catalog = AgentCatalog::new();
        assert!(catalog.get("echo").is_some());
        assert!(catalog.get("not-an-agent").is_none());
        assert_eq!(catalog.ids(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn echo_agent_streams_back_the_latest_user_message() {
        let coordinator = RunCoordinator::new(store(), EventBus::new());
        let agent = AgentCatalog::new().get("echo").unwrap();
        let mut stream = coordinator
            .run(RunRequest {
                thread_id: "t1".into(),
                agent,
                input: RunInput {
                    messages: vec![Message {
                        id: "u1".into(),
                        role: Role::User,
                        content: Some("hello there".into()),
                        tool_calls: None,
                        tool_call_id: None,
                    }],
                    ..Default::default()
                },
                scope: ScopeDecision::Scoped(ResourceScope::single("alice")),
            })
            .await
            .unwrap();

        let mut deltas = String::new();
        let mut saw_finish = false;
        while let Some(event) = stream.next().await {
            match event {
                Event::TextMessageContent { delta, .. } => deltas.push_str(&delta),
                Event::RunFinished { .. } => saw_finish = true,
                _ => {}
            }
        }
        assert_eq!(deltas.trim(), "hello there");
        assert!(saw_finish);
    }

    #[tokio::test]
    async fn stop_cuts_the_echo_short() {
        let coordinator = Arc::new(RunCoordinator::new(store(), EventBus::new()));
        let agent = AgentCatalog::new().get("echo").unwrap();
        let long_reply: String = std::iter::repeat("word").take(50).collect::<Vec<_>>().join(" ");
        let mut stream = coordinator
            .run(RunRequest {
                thread_id: "t1".into(),
                agent,
                input: RunInput {
                    messages: vec![Message {
                        id: "u1".into(),
                        role: Role::User,
                        content: Some(long_reply),
                        tool_calls: None,
                        tool_call_id: None,
                    }],
                    ..Default::default()
                },
                scope: ScopeDecision::Scoped(ResourceScope::single("alice")),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.stop("t1");

        let mut saw_finish = false;
        while let Some(event) = stream.next().await {
            if matches!(event, Event::RunFinished { .. }) {
                saw_finish = true;
            }
        }
        // Stopped mid-stream: the finalizer still closes the stream, but
        // not with a clean RUN_FINISHED from the agent itself.
        assert!(!saw_finish);

        let _ = coordinator.connect(ConnectRequest {
            thread_id: "t1".into(),
            scope: ScopeDecision::Admin,
        });
    }
}
