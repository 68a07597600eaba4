use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, RunInput};

/// One execution of an agent against a thread. Runs form a linked list
/// per thread, ordered by `created_at`, chained via `parent_run_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub thread_id: String,
    pub parent_run_id: Option<String>,
    pub input: RunInput,
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
    /// Wall-clock length of the run. Not part of the wire `Event`
    /// stream; carried on the stored record for dashboards/billing
    /// consumers of `ThreadStore`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// The public, scope-filtered view of a thread returned by
/// `getThreadMetadata` / `listThreads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_running: bool,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    /// First of the thread's `resourceIds`, kept for clients written
    /// against a single-owner model.
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// The durable, authoritative record backing a thread. `resource_ids`
/// is fixed at creation and never mutated afterward (invariant 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub resource_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_run_id: Option<String>,
}
