//! Bearer-token authentication: a coarse-grained axum middleware gating
//! every protected route, plus the `ScopeResolver` the coordinator calls
//! per-request to turn a token + client hint into a `ScopeDecision`.
//! Grounded directly on `gateway/src/api/auth.rs`'s SHA-256 +
//! `subtle::ConstantTimeEq` bearer check, extended to a per-caller
//! credential list so the Strict policy (spec §4.6) has a real
//! authoritative id set to check the client hint against.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use agentrun_core::scope_gate::{self, ScopeDecision, ScopeResolver};
use agentrun_domain::config::CallerConfig;
use agentrun_domain::error::Result;
use agentrun_domain::scope::ClientHint;

use crate::state::AppState;

/// One caller's resolved credential: the hash of its bearer token (the
/// token itself is never retained past startup) plus the resource ids
/// it is authoritative for.
pub struct CallerCredential {
    pub token_hash: Vec<u8>,
    pub resource_ids: Vec<String>,
    pub admin: bool,
}

/// Reads each caller's token from its configured env var once at
/// startup and hashes it. A caller whose env var is unset or empty is
/// logged and skipped entirely — it authenticates no one, rather than
/// silently falling back to some other caller's credential.
pub fn load_caller_credentials(callers: &[CallerConfig]) -> Vec<CallerCredential> {
    let mut loaded = Vec::new();
    for caller in callers {
        match std::env::var(&caller.token_env) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(
                    env_var = %caller.token_env,
                    admin = caller.admin,
                    resource_ids = ?caller.resource_ids,
                    "caller credential loaded"
                );
                loaded.push(CallerCredential {
                    token_hash: Sha256::digest(token.as_bytes()).to_vec(),
                    resource_ids: caller.resource_ids.clone(),
                    admin: caller.admin,
                });
            }
            _ => {
                tracing::warn!(
                    env_var = %caller.token_env,
                    "caller token env var unset or empty — this caller will never authenticate"
                );
            }
        }
    }
    if loaded.is_empty() {
        tracing::warn!("no caller credentials loaded — every request will be unauthorized");
    }
    loaded
}

/// Coarse-grained gate applied to every protected route: rejects before a
/// handler (and thus the coordinator) is ever reached if the bearer token
/// doesn't match any known caller. Handlers still call
/// `ScopeResolver::resolve` themselves to turn the token into a
/// `ScopeDecision` with the caller's resource ids.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let provided = bearer_token(req.headers()).to_string();
    if !any_hash_matches(&state.known_token_hashes, &provided) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing API token" })),
        )
            .into_response();
    }
    next.run(req).await
}

pub fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

fn token_matches(expected_hash: &[u8], provided: &str) -> bool {
    let provided_hash = Sha256::digest(provided.as_bytes());
    bool::from(provided_hash.ct_eq(expected_hash))
}

fn any_hash_matches(known: &[Vec<u8>], provided: &str) -> bool {
    known.iter().any(|hash| token_matches(hash, provided))
}

/// The bundled `ScopeResolver`: each caller has its own bearer secret
/// and its own authoritative resource-id set. A token that doesn't
/// match any configured caller resolves to `Unauthorized`. A matched
/// admin caller resolves to `Admin`, ignoring the hint entirely. A
/// matched non-admin caller resolves via the **Strict** policy (spec
/// §4.6): every client-hint id must already be in that caller's
/// authoritative set, otherwise the request is rejected outright — the
/// hint can never widen a caller onto another tenant's threads.
pub struct BearerScopeResolver {
    callers: Vec<CallerCredential>,
}

impl BearerScopeResolver {
    pub fn new(callers: Vec<CallerCredential>) -> Self {
        Self { callers }
    }
}

impl ScopeResolver for BearerScopeResolver {
    fn resolve(&self, authoritative_token: &str, hint: &ClientHint) -> Result<ScopeDecision> {
        let Some(caller) = self
            .callers
            .iter()
            .find(|c| token_matches(&c.token_hash, authoritative_token))
        else {
            return Ok(ScopeDecision::Unauthorized);
        };

        if caller.admin {
            return Ok(ScopeDecision::Admin);
        }

        match scope_gate::strict_policy(&caller.resource_ids, hint) {
            Ok(scope) => Ok(ScopeDecision::Scoped(scope)),
            Err(agentrun_domain::error::Error::Unauthorized) => Ok(ScopeDecision::Unauthorized),
            Err(other) => Err(other),
        }
    }
}

/// Extracts the bearer token and the `X-CopilotKit-Resource-ID` hint
/// from `headers` and asks `state.scope_resolver` for a `ScopeDecision`.
/// Every route handler that touches a thread calls this first.
pub fn resolve_scope(
    state: &AppState,
    headers: &HeaderMap,
) -> agentrun_domain::error::Result<ScopeDecision> {
    let token = bearer_token(headers);
    let hint_header = headers
        .get("X-CopilotKit-Resource-ID")
        .and_then(|v| v.to_str().ok());
    let hint = agentrun_domain::scope::parse_client_hint(hint_header);
    state.scope_resolver.resolve(token, &hint)
}
