//! The Agent Contract (spec §6.4): any value capable of driving one run
//! to completion while reporting every `Event` it produces through
//! callbacks owned by the coordinator. Grounded on the teacher's
//! `LlmProvider` trait shape (`providers/src/traits.rs`) — a thin
//! `Send + Sync` async trait implemented per-backend — generalized
//! from "send one chat request" to "drive one run's callback
//! protocol", and on `runtime/cancel.rs`'s `CancelToken` for the
//! cooperative-cancellation half of the contract.

use std::sync::Arc;

use agentrun_domain::error::Result;
use agentrun_domain::event::{Event, RunInput};
use agentrun_domain::message::Message;
use async_trait::async_trait;

/// Callbacks the coordinator hands to an `Agent::run_agent` invocation.
/// The agent MUST call `on_event` for every `Event` it produces, in
/// order, and SHOULD call `on_new_message`/`on_run_started` per the
/// contract in spec §6.4/§4.2.
#[async_trait]
pub trait AgentCallbacks: Send + Sync {
    /// Invoked once before any events flow, letting the coordinator
    /// inject input-derived events ahead of the agent's own output.
    async fn on_run_started(&self);

    /// Advisory: the agent has produced or observed a new message.
    async fn on_new_message(&self, message: Message);

    /// MUST be invoked for every `Event` the agent produces, in order.
    async fn on_event(&self, event: Event);
}

/// A user-supplied object satisfying the Agent Contract. Implementations
/// are the counterpart of the teacher's per-provider `LlmProvider`
/// adapters, but driving the coordinator's event-callback protocol
/// instead of returning a single `ChatResponse`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Executes one run against `input`, reporting progress through
    /// `callbacks`. Returning `Err` does not abort the stream — the
    /// coordinator's `TerminalFinalizer` still runs and subscribers
    /// still see a clean terminal event (spec §4.2 step 5, §7).
    async fn run_agent(&self, input: RunInput, callbacks: Arc<dyn AgentCallbacks>) -> Result<()>;

    /// Cooperative cancellation request; MUST cause `run_agent` to
    /// return (normally or failing) promptly.
    fn abort_run(&self);

    /// Returns a fresh per-run instance. The coordinator clones before
    /// every run so concurrent runs on different threads never share
    /// agent-private state.
    fn clone_boxed(&self) -> Box<dyn Agent>;
}
