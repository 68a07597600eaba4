pub mod agent;
pub mod compactor;
pub mod coordinator;
pub mod event_bus;
pub mod finalizer;
pub mod message_injector;
pub mod scope_gate;
pub mod thread_store;

pub use agent::{Agent, AgentCallbacks};
pub use compactor::compact;
pub use coordinator::{ConnectRequest, RunCoordinator, RunRequest};
pub use event_bus::{EventBus, RunPublisher, RunSubscription};
pub use message_injector::message_to_events;
pub use scope_gate::{ScopeDecision, ScopeResolver};
pub use thread_store::ThreadStore;
