//! Handlers for the route table in spec §6.1. Grounded on
//! `gateway/src/api/runs.rs`/`gateway/src/api/sessions.rs`'s handler
//! shape: `State<AppState>` + typed extractors, `ApiError` for the
//! error path, `to_sse_response` for the two streaming routes.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use agentrun_core::coordinator::{ConnectRequest, RunRequest};
use agentrun_domain::error::Error;
use agentrun_domain::event::RunInput;

use crate::auth::resolve_scope;
use crate::error::{not_found, ApiError};
use crate::sse::to_sse_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunRequestBody {
    #[serde(rename = "threadId")]
    pub thread_id: String,
    #[serde(flatten)]
    pub input: RunInput,
}

#[derive(Debug, Deserialize)]
pub struct ThreadIdBody {
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

pub async fn run_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RunRequestBody>,
) -> axum::response::Response {
    let Some(agent) = state.agents.get(&agent_id) else {
        return not_found();
    };
    let scope = match resolve_scope(&state, &headers) {
        Ok(scope) => scope,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match state
        .coordinator
        .run(RunRequest {
            thread_id: body.thread_id,
            agent,
            input: body.input,
            scope,
        })
        .await
    {
        Ok(stream) => to_sse_response(stream).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn connect_thread(
    State(state): State<AppState>,
    Path(_agent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ThreadIdBody>,
) -> axum::response::Response {
    let scope = match resolve_scope(&state, &headers) {
        Ok(scope) => scope,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if matches!(scope, agentrun_core::ScopeDecision::Unauthorized) {
        return ApiError::from(Error::Unauthorized).into_response();
    }

    let stream = state.coordinator.connect(ConnectRequest {
        thread_id: body.thread_id,
        scope,
    });
    to_sse_response(stream).into_response()
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

pub async fn stop_run(
    State(state): State<AppState>,
    Path(_agent_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ThreadIdBody>,
) -> axum::response::Response {
    let scope = match resolve_scope(&state, &headers) {
        Ok(scope) => scope,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if matches!(scope, agentrun_core::ScopeDecision::Unauthorized) {
        return ApiError::from(Error::Unauthorized).into_response();
    }
    let Some(record) = state.threads.get_thread_record(&body.thread_id) else {
        return not_found();
    };
    if !agentrun_core::scope_gate::matches(&record.resource_ids, &scope) {
        return not_found();
    }

    let stopped = state.coordinator.stop(&body.thread_id);
    Json(StopResponse { stopped }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListThreadsResponse {
    pub threads: Vec<agentrun_domain::run::ThreadMetadata>,
    pub total: usize,
}

pub async fn list_threads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListThreadsQuery>,
) -> axum::response::Response {
    let scope = match resolve_scope(&state, &headers) {
        Ok(scope) => scope,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if matches!(scope, agentrun_core::ScopeDecision::Unauthorized) {
        return ApiError::from(Error::Unauthorized).into_response();
    }

    let (threads, total) = state
        .threads
        .list_threads(&scope, query.limit, query.offset.unwrap_or(0));
    Json(ListThreadsResponse { threads, total }).into_response()
}

pub async fn get_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
) -> axum::response::Response {
    let scope = match resolve_scope(&state, &headers) {
        Ok(scope) => scope,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if matches!(scope, agentrun_core::ScopeDecision::Unauthorized) {
        return ApiError::from(Error::Unauthorized).into_response();
    }

    match state.threads.get_thread_metadata(&thread_id, &scope) {
        Some(metadata) => Json(metadata).into_response(),
        None => not_found(),
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteThreadResponse {
    pub success: bool,
}

pub async fn delete_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
) -> axum::response::Response {
    if thread_id.trim().is_empty() {
        return ApiError::from(Error::InvalidInput("thread id must not be empty".into()))
            .into_response();
    }
    let scope = match resolve_scope(&state, &headers) {
        Ok(scope) => scope,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if matches!(scope, agentrun_core::ScopeDecision::Unauthorized) {
        return ApiError::from(Error::Unauthorized).into_response();
    }

    state.threads.delete_thread(&thread_id, &scope);
    Json(DeleteThreadResponse { success: true }).into_response()
}

pub async fn info(State(state): State<AppState>) -> axum::response::Response {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "agents": state.agents.ids(),
        "audioFileTranscriptionEnabled": false,
    }))
    .into_response()
}

pub async fn not_found_handler() -> axum::response::Response {
    not_found()
}
