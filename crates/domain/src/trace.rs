use serde::Serialize;

/// Structured trace events emitted by the coordinator and gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunAdmitted {
        thread_id: String,
        run_id: String,
        parent_run_id: Option<String>,
    },
    RunRejected {
        thread_id: String,
        reason: String,
    },
    RunCompleted {
        thread_id: String,
        run_id: String,
        event_count: usize,
        duration_ms: u64,
        terminal: String,
    },
    RunStopRequested {
        thread_id: String,
        run_id: String,
    },
    CompactionApplied {
        run_id: String,
        events_in: usize,
        events_out: usize,
    },
    SubscriberAttached {
        thread_id: String,
        replayed_events: usize,
        live: bool,
    },
    SubscriberLagged {
        thread_id: String,
    },
    ScopeDenied {
        thread_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "agentrun_event");
    }
}
