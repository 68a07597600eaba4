//! The per-thread state machine: admission, run lifecycle, and
//! termination guarantees (spec §4.2). Composes `ThreadStore`,
//! `EventBus`, `MessageInjector`, `EventCompactor`, `ScopeGate`, and
//! `TerminalFinalizer`. Admission's atomic test-and-set is grounded on
//! the teacher's `SessionLockMap` (`runtime/session_lock.rs`), but
//! changed from wait-for-turn (`Semaphore(1)` + queued waiter) to
//! fail-fast `try_begin_run`, because testable property 8 requires an
//! immediate `ThreadAlreadyRunning` rather than queuing the second
//! caller.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agentrun_domain::error::{Error, Result};
use agentrun_domain::event::{Event, RunInput};
use agentrun_domain::message::Message;
use agentrun_domain::run::Run;
use agentrun_domain::stream::EventStream;
use agentrun_domain::trace::TraceEvent;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::agent::{Agent, AgentCallbacks};
use crate::compactor::compact;
use crate::event_bus::{EventBus, RunPublisher};
use crate::finalizer;
use crate::message_injector::message_to_events;
use crate::scope_gate::{self, ScopeDecision};
use crate::thread_store::ThreadStore;

pub struct RunRequest {
    pub thread_id: String,
    pub agent: Arc<dyn Agent>,
    pub input: RunInput,
    pub scope: ScopeDecision,
}

pub struct ConnectRequest {
    pub thread_id: String,
    pub scope: ScopeDecision,
}

/// Bookkeeping for a thread's currently-live run, kept just long
/// enough for `stop()` to reach it. Removed when the run terminates.
struct ActiveRun {
    run_id: String,
    stop_requested: Arc<AtomicBool>,
    agent: Arc<dyn Agent>,
}

#[derive(Clone)]
pub struct RunCoordinator {
    store: Arc<ThreadStore>,
    bus: EventBus,
    active: Arc<parking_lot::RwLock<std::collections::HashMap<String, Arc<ActiveRun>>>>,
}

impl RunCoordinator {
    pub fn new(store: Arc<ThreadStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            active: Arc::new(parking_lot::RwLock::new(std::collections::HashMap::new())),
        }
    }

    pub fn is_running(&self, thread_id: &str) -> bool {
        self.store.is_running(thread_id)
    }

    /// Admits and drives one run. Returns the `runSink` stream: only
    /// events the agent itself emits (plus finalizer-synthesized
    /// terminal/closing events), never the injected-message events a
    /// `connect()` subscriber would also see on the shared live sink.
    pub async fn run(&self, request: RunRequest) -> Result<EventStream> {
        let RunRequest {
            thread_id,
            agent,
            input,
            scope,
        } = request;

        if matches!(scope, ScopeDecision::Unauthorized) {
            return Err(Error::Unauthorized);
        }

        let existing_record = self.store.get_thread_record(&thread_id);
        match &existing_record {
            Some(record) => {
                if !scope_gate::matches(&record.resource_ids, &scope) {
                    TraceEvent::ScopeDenied {
                        thread_id: thread_id.clone(),
                        reason: "scope does not intersect thread's resource ids".into(),
                    }
                    .emit();
                    return Err(Error::Unauthorized);
                }
            }
            None => match &scope {
                ScopeDecision::Admin => {
                    return Err(Error::InvalidScope(
                        "admins cannot create new threads without an explicit owner".into(),
                    ));
                }
                ScopeDecision::Scoped(s) if s.resource_ids.is_empty() => {
                    return Err(Error::InvalidScope(
                        "scope has no resource ids to own the new thread".into(),
                    ));
                }
                ScopeDecision::Scoped(_) => {}
                ScopeDecision::Unauthorized => unreachable!("rejected above"),
            },
        }

        // Ownership is immutable after creation (invariant 6): on an
        // existing thread the request's scope never overwrites it.
        let (resource_ids, properties) = match existing_record {
            Some(record) => (record.resource_ids, record.properties),
            None => match &scope {
                ScopeDecision::Scoped(s) => (s.resource_ids.clone(), s.properties.clone()),
                _ => unreachable!("admin/unauthorized rejected above for new threads"),
            },
        };
        self.store.ensure_thread(&thread_id, &resource_ids, properties);

        let run_id = Uuid::new_v4().to_string();
        if !self.store.try_begin_run(&thread_id, &run_id) {
            return Err(Error::ThreadAlreadyRunning(thread_id));
        }

        let parent_run_id = self
            .store
            .list_runs(&thread_id)
            .last()
            .map(|r| r.run_id.clone());
        let historic_message_ids = self.store.historic_message_ids(&thread_id);

        TraceEvent::RunAdmitted {
            thread_id: thread_id.clone(),
            run_id: run_id.clone(),
            parent_run_id: parent_run_id.clone(),
        }
        .emit();

        let agent_instance: Arc<dyn Agent> = Arc::from(agent.clone_boxed());
        let stop_requested = Arc::new(AtomicBool::new(false));
        self.active.write().insert(
            thread_id.clone(),
            Arc::new(ActiveRun {
                run_id: run_id.clone(),
                stop_requested: stop_requested.clone(),
                agent: agent_instance.clone(),
            }),
        );

        let live = self.bus.start_run(&thread_id);
        let (run_tx, mut run_rx) = mpsc::unbounded_channel::<Event>();
        let buffer: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(historic_message_ids.clone()));

        let callbacks = Arc::new(CoordinatorCallbacks {
            input: input.clone(),
            historic: historic_message_ids,
            seen,
            buffer: buffer.clone(),
            run_tx: run_tx.clone(),
            live: live.clone(),
        });

        let store = self.store.clone();
        let active = self.active.clone();
        let thread_id_bg = thread_id.clone();
        let run_id_bg = run_id.clone();
        let input_bg = input;
        let stop_requested_bg = stop_requested;
        let live_bg = live;

        tokio::spawn(async move {
            let callbacks: Arc<dyn AgentCallbacks> = callbacks;
            let result = agent_instance.run_agent(input_bg.clone(), callbacks).await;
            let agent_error = result.err().map(|e| e.to_string());
            let stopped = stop_requested_bg.load(Ordering::SeqCst);

            let mut events = buffer.lock().clone();
            let appended = finalizer::finalize(&thread_id_bg, &run_id_bg, &events, stopped, agent_error.as_deref());
            for event in &appended {
                let _ = run_tx.send(event.clone());
                live_bg.publish(event.clone());
            }
            events.extend(appended);
            drop(run_tx);

            let events_in = events.len();
            let compacted = compact(events);
            TraceEvent::CompactionApplied {
                run_id: run_id_bg.clone(),
                events_in,
                events_out: compacted.len(),
            }
            .emit();

            let created_at = Utc::now();
            let terminal_label = compacted
                .iter()
                .rev()
                .find_map(|e| match e {
                    Event::RunFinished { .. } => Some("RUN_FINISHED"),
                    Event::RunError { .. } => Some("RUN_ERROR"),
                    _ => None,
                })
                .unwrap_or("NONE")
                .to_string();

            let run_record = Run {
                run_id: run_id_bg.clone(),
                thread_id: thread_id_bg.clone(),
                parent_run_id,
                input: input_bg,
                events: compacted,
                created_at,
                duration_ms: None,
            };

            let event_count = run_record.events.len();
            if let Err(e) = store.append_run(run_record) {
                tracing::error!(error = %e, thread_id = %thread_id_bg, "failed to persist run");
            }
            store.end_run(&thread_id_bg);
            active.write().remove(&thread_id_bg);
            live_bg.finish();

            TraceEvent::RunCompleted {
                thread_id: thread_id_bg,
                run_id: run_id_bg,
                event_count,
                duration_ms: 0,
                terminal: terminal_label,
            }
            .emit();
        });

        let stream = async_stream::stream! {
            while let Some(event) = run_rx.recv().await {
                yield event;
            }
        };
        Ok(Box::pin(stream))
    }

    /// Marks the thread's active run for cancellation and invokes the
    /// agent's cooperative cancel hook. Does NOT clear `isRunning` —
    /// the run-completion path in `run()` always does that, so the
    /// finalizer is guaranteed to run exactly once per run.
    pub fn stop(&self, thread_id: &str) -> bool {
        if !self.store.is_running(thread_id) {
            return false;
        }
        let Some(handle) = self.active.read().get(thread_id).cloned() else {
            return false;
        };
        handle.stop_requested.store(true, Ordering::SeqCst);
        handle.agent.abort_run();
        TraceEvent::RunStopRequested {
            thread_id: thread_id.to_string(),
            run_id: handle.run_id.clone(),
        }
        .emit();
        true
    }

    /// Tails a thread: the full compacted transcript, then (if a run
    /// is live) the tail of the active run. Scope mismatch and
    /// thread-absent both resolve to an immediately-completing empty
    /// stream — the spec's 404-over-403 posture (§9).
    pub fn connect(&self, request: ConnectRequest) -> EventStream {
        let ConnectRequest { thread_id, scope } = request;

        let Some(record) = self.store.get_thread_record(&thread_id) else {
            return Box::pin(futures_util::stream::empty());
        };
        if !scope_gate::matches(&record.resource_ids, &scope) {
            TraceEvent::ScopeDenied {
                thread_id,
                reason: "scope does not intersect thread's resource ids".into(),
            }
            .emit();
            return Box::pin(futures_util::stream::empty());
        }

        let historical: Vec<Event> = compact(
            self.store
                .list_runs(&thread_id)
                .into_iter()
                .flat_map(|r| r.events)
                .collect(),
        );
        let seen_message_ids: HashSet<String> = historical
            .iter()
            .filter_map(|e| e.message_id())
            .map(str::to_string)
            .collect();

        let live_sub = self.bus.subscribe(&thread_id);
        TraceEvent::SubscriberAttached {
            thread_id,
            replayed_events: historical.len(),
            live: live_sub.is_some(),
        }
        .emit();

        let stream = async_stream::stream! {
            for event in historical {
                yield event;
            }
            if let Some(mut sub) = live_sub {
                for event in sub.replayed {
                    if event.message_id().is_some_and(|mid| seen_message_ids.contains(mid)) {
                        continue;
                    }
                    yield event;
                }
                loop {
                    match sub.receiver.recv().await {
                        Ok(event) => {
                            if event.message_id().is_some_and(|mid| seen_message_ids.contains(mid)) {
                                continue;
                            }
                            yield event;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        };
        Box::pin(stream)
    }
}

/// The callback sink wired into `Agent::run_agent` for one run. Owns
/// the dedup bookkeeping (spec §4.3) and the hot-path event fan-out
/// (spec §4.2 step 4).
struct CoordinatorCallbacks {
    input: RunInput,
    historic: HashSet<String>,
    seen: Arc<Mutex<HashSet<String>>>,
    buffer: Arc<Mutex<Vec<Event>>>,
    run_tx: mpsc::UnboundedSender<Event>,
    live: RunPublisher,
}

#[async_trait]
impl AgentCallbacks for CoordinatorCallbacks {
    async fn on_run_started(&self) {
        let to_inject: Vec<Message> = {
            let mut seen = self.seen.lock();
            self.input
                .messages
                .iter()
                .filter(|m| {
                    if seen.contains(&m.id) {
                        false
                    } else {
                        seen.insert(m.id.clone());
                        true
                    }
                })
                .cloned()
                .collect()
        };
        for msg in &to_inject {
            for event in message_to_events(msg) {
                self.live.publish(event.clone());
                self.buffer.lock().push(event);
            }
        }
    }

    async fn on_new_message(&self, message: Message) {
        self.seen.lock().insert(message.id);
    }

    async fn on_event(&self, event: Event) {
        let event = match event {
            Event::RunStarted {
                thread_id,
                run_id,
                input: None,
            } => {
                let filtered_messages: Vec<Message> = self
                    .input
                    .messages
                    .iter()
                    .filter(|m| !self.historic.contains(&m.id))
                    .cloned()
                    .collect();
                let sanitized = RunInput {
                    messages: filtered_messages,
                    state: self.input.state.clone(),
                    tools: self.input.tools.clone(),
                    context: self.input.context.clone(),
                };
                Event::RunStarted {
                    thread_id,
                    run_id,
                    input: Some(sanitized),
                }
            }
            other => other,
        };

        let _ = self.run_tx.send(event.clone());
        self.live.publish(event.clone());
        self.buffer.lock().push(event);
    }
}
