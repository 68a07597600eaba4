use std::sync::Arc;

use agentrun_core::{RunCoordinator, ScopeResolver, ThreadStore};
use agentrun_domain::config::Config;

use crate::echo_agent::AgentCatalog;

/// Shared application state passed to every API handler.
///
/// Fields are grouped by concern:
/// - **Core services** — config, coordinator, thread store
/// - **Agents** — the catalog of agents this gateway can run
/// - **Security** — the scope resolver and the bearer token hash computed
///   once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub coordinator: Arc<RunCoordinator>,
    pub threads: Arc<ThreadStore>,

    // ── Agents ───────────────────────────────────────────────────────
    pub agents: Arc<AgentCatalog>,

    // ── Security (startup-computed) ─────────────────────────────────
    pub scope_resolver: Arc<dyn ScopeResolver>,
    /// SHA-256 hashes of every configured caller's bearer token, read
    /// once at startup. Empty means no caller credentials loaded —
    /// every request is then rejected as unauthorized rather than let
    /// through unauthenticated.
    pub known_token_hashes: Vec<Vec<u8>>,
}
