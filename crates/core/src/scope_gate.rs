//! Resolves and enforces resource scope on every thread operation;
//! also filters/validates client-declared scope hints (spec §4.6).

use agentrun_domain::error::{Error, Result};
use agentrun_domain::scope::{ClientHint, ResourceScope};

/// What a `ScopeResolver` decided for a given request.
///
/// Rust has no natural `T | null | undefined`, so the spec's
/// three-way resolver outcome (`ResourceScope | null | undefined`) is
/// modeled as an explicit enum rather than `Option<Option<T>>` — the
/// two `None`s of a nested option are too easy to swap by accident
/// given how differently they must be handled (§9: "MUST NOT be
/// conflated by the HTTP layer").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeDecision {
    /// `null`: authorized admin, read-any / write-existing-only.
    Admin,
    /// A concrete, non-admin scope.
    Scoped(ResourceScope),
    /// `undefined`: resolver declined. MUST map to 401, never reach
    /// the coordinator.
    Unauthorized,
}

/// Application-supplied policy mapping a request (and its optional
/// client-hint header) to a `ScopeDecision`. Implemented by the
/// gateway crate (e.g. `BearerScopeResolver`); the coordinator only
/// depends on this trait, never on HTTP types.
pub trait ScopeResolver: Send + Sync {
    fn resolve(&self, authoritative_token: &str, hint: &ClientHint) -> Result<ScopeDecision>;
}

/// `true` iff `scope` authorizes access to a thread owned by
/// `thread_resource_ids`: `Admin` always matches; `Scoped` matches iff
/// the two id sets intersect. An empty `Scoped` resource-id set
/// matches nothing.
pub fn matches(thread_resource_ids: &[String], scope: &ScopeDecision) -> bool {
    match scope {
        ScopeDecision::Admin => true,
        ScopeDecision::Unauthorized => false,
        ScopeDecision::Scoped(s) => thread_resource_ids
            .iter()
            .any(|id| s.resource_ids.iter().any(|sid| sid == id)),
    }
}

/// **Strict** policy: every client-hint id must already be present in
/// the authoritative ids; otherwise the request is rejected outright.
/// Scope is the full authoritative set (the client hint never widens
/// or narrows it).
pub fn strict_policy(authoritative_ids: &[String], hint: &ClientHint) -> Result<ResourceScope> {
    for declared in hint.values() {
        if !authoritative_ids.iter().any(|id| id == declared) {
            return Err(Error::Unauthorized);
        }
    }
    Ok(ResourceScope::new(authoritative_ids.iter().cloned()))
}

/// **Filtering** policy: scope is the intersection of authoritative
/// ids and the client hint (order/duplicates of the hint preserved).
/// An empty intersection is rejected.
pub fn filtering_policy(authoritative_ids: &[String], hint: &ClientHint) -> Result<ResourceScope> {
    let declared = hint.values();
    if declared.is_empty() {
        return Ok(ResourceScope::new(authoritative_ids.iter().cloned()));
    }
    let intersection: Vec<String> = declared
        .into_iter()
        .filter(|d| authoritative_ids.iter().any(|id| id == d))
        .map(str::to_string)
        .collect();
    if intersection.is_empty() {
        return Err(Error::Unauthorized);
    }
    Ok(ResourceScope::new(intersection))
}

/// **Override** policy: ignore the client hint entirely.
pub fn override_policy(authoritative_ids: &[String], _hint: &ClientHint) -> ResourceScope {
    ResourceScope::new(authoritative_ids.iter().cloned())
}
