//! Durable per-thread log of completed runs, indexed by thread id and
//! scope. Grounded on the teacher's `RunStore` (JSONL append + in-
//! memory index under `parking_lot::RwLock`) and `SessionStore`
//! (single JSON file of metadata under the same lock pattern).
//! Unlike `RunStore`'s bounded ring, a thread's run chain is kept
//! unbounded in memory — invariant 7 requires the full
//! `parentRunId` chain, not just a recency window.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use agentrun_domain::config::ThreadStoreConfig;
use agentrun_domain::error::{Error, Result};
use agentrun_domain::run::{Run, ThreadMetadata, ThreadRecord};
use chrono::Utc;
use parking_lot::RwLock;

use crate::scope_gate::{matches, ScopeDecision};

pub struct ThreadStore {
    runs_log_path: PathBuf,
    state_path: PathBuf,
    suggestion_marker: String,
    default_list_limit: usize,
    max_list_limit: usize,
    state: RwLock<std::collections::HashMap<String, ThreadRecord>>,
    runs: RwLock<std::collections::HashMap<String, Vec<Run>>>,
}

/// Current on-disk layout version (spec §6.5's "schema-version row").
/// Bumped whenever `state.json`'s or `runs.jsonl`'s record shape
/// changes in a way a future migration would need to key off of.
const SCHEMA_VERSION: u32 = 1;

impl ThreadStore {
    pub fn new(cfg: &ThreadStoreConfig) -> Result<Self> {
        let data_dir = Path::new(&cfg.data_dir);
        std::fs::create_dir_all(data_dir)?;
        Self::check_schema_version(data_dir)?;

        let state_path = data_dir.join("state.json");
        let state: std::collections::HashMap<String, ThreadRecord> = if state_path.exists() {
            let raw = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            std::collections::HashMap::new()
        };

        let runs_log_path = data_dir.join("runs.jsonl");
        let mut runs: std::collections::HashMap<String, Vec<Run>> = std::collections::HashMap::new();
        if let Ok(content) = std::fs::read_to_string(&runs_log_path) {
            for line in content.lines() {
                if let Ok(run) = serde_json::from_str::<Run>(line) {
                    runs.entry(run.thread_id.clone()).or_default().push(run);
                }
            }
        }
        for thread_runs in runs.values_mut() {
            thread_runs.sort_by_key(|r| r.created_at);
        }

        tracing::info!(
            threads = state.len(),
            path = %state_path.display(),
            "thread store loaded"
        );

        Ok(Self {
            runs_log_path,
            state_path,
            suggestion_marker: cfg.suggestion_marker.clone(),
            default_list_limit: cfg.default_list_limit,
            max_list_limit: cfg.max_list_limit,
            state: RwLock::new(state),
            runs: RwLock::new(runs),
        })
    }

    /// Writes `SCHEMA_VERSION` on first run; on subsequent runs, fails
    /// loudly rather than silently reading a future layout this binary
    /// doesn't understand.
    fn check_schema_version(data_dir: &Path) -> Result<()> {
        let version_path = data_dir.join("SCHEMA_VERSION");
        if !version_path.exists() {
            std::fs::write(&version_path, SCHEMA_VERSION.to_string())?;
            return Ok(());
        }
        let raw = std::fs::read_to_string(&version_path)?;
        let on_disk: u32 = raw.trim().parse().map_err(|_| {
            Error::Storage(format!("unreadable schema version in {}", version_path.display()))
        })?;
        if on_disk > SCHEMA_VERSION {
            return Err(Error::Storage(format!(
                "data dir schema version {on_disk} is newer than this binary supports ({SCHEMA_VERSION})"
            )));
        }
        Ok(())
    }

    /// Creates the thread metadata row on first use. Idempotent: on an
    /// existing thread, `resource_ids`/`properties` are ignored —
    /// ownership is immutable after creation (invariant 6).
    pub fn ensure_thread(
        &self,
        thread_id: &str,
        resource_ids: &[String],
        properties: Option<serde_json::Value>,
    ) {
        let mut state = self.state.write();
        if !state.contains_key(thread_id) {
            let now = Utc::now();
            state.insert(
                thread_id.to_string(),
                ThreadRecord {
                    thread_id: thread_id.to_string(),
                    resource_ids: resource_ids.to_vec(),
                    properties,
                    created_at: now,
                    last_activity_at: now,
                    is_running: false,
                    current_run_id: None,
                },
            );
            drop(state);
            self.persist_state();
        }
    }

    pub fn get_thread_record(&self, thread_id: &str) -> Option<ThreadRecord> {
        self.state.read().get(thread_id).cloned()
    }

    pub fn thread_exists(&self, thread_id: &str) -> bool {
        self.state.read().contains_key(thread_id)
    }

    pub fn is_running(&self, thread_id: &str) -> bool {
        self.state
            .read()
            .get(thread_id)
            .map(|r| r.is_running)
            .unwrap_or(false)
    }

    /// Atomic test-and-set admission: `true` iff this call transitioned
    /// the thread from not-running to running. Requires `ensure_thread`
    /// to have been called first.
    pub fn try_begin_run(&self, thread_id: &str, run_id: &str) -> bool {
        let mut state = self.state.write();
        match state.get_mut(thread_id) {
            Some(record) if !record.is_running => {
                record.is_running = true;
                record.current_run_id = Some(run_id.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn end_run(&self, thread_id: &str) {
        {
            let mut state = self.state.write();
            if let Some(record) = state.get_mut(thread_id) {
                record.is_running = false;
                record.current_run_id = None;
                record.last_activity_at = Utc::now();
            }
        }
        self.persist_state();
    }

    /// Idempotent on `run_id`: a repeat append of an already-stored
    /// run id is a no-op success, not an error.
    pub fn append_run(&self, run: Run) -> Result<()> {
        {
            let runs = self.runs.read();
            if let Some(existing) = runs.get(&run.thread_id) {
                if existing.iter().any(|r| r.run_id == run.run_id) {
                    return Ok(());
                }
            }
        }

        self.append_jsonl(&run)?;

        {
            let mut runs = self.runs.write();
            runs.entry(run.thread_id.clone()).or_default().push(run.clone());
        }
        {
            let mut state = self.state.write();
            if let Some(record) = state.get_mut(&run.thread_id) {
                record.last_activity_at = Utc::now();
            }
        }
        self.persist_state();
        Ok(())
    }

    fn append_jsonl(&self, run: &Run) -> Result<()> {
        let json = serde_json::to_string(run)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.runs_log_path)?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    fn persist_state(&self) {
        let state = self.state.read();
        match serde_json::to_string_pretty(&*state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.state_path, json) {
                    tracing::warn!(error = %e, "failed to persist thread store state");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize thread store state"),
        }
    }

    /// Ordered ascending by `created_at`, preserving the `parent_run_id`
    /// linked-list order even under clock skew (runs are always
    /// appended in completion order, so insertion order already is
    /// chain order).
    pub fn list_runs(&self, thread_id: &str) -> Vec<Run> {
        self.runs.read().get(thread_id).cloned().unwrap_or_default()
    }

    /// Union of every `messageId` carried by any event in any run
    /// already stored for this thread. Used by the coordinator's
    /// dedup rule (invariant 5).
    pub fn historic_message_ids(&self, thread_id: &str) -> HashSet<String> {
        let mut ids = HashSet::new();
        if let Some(runs) = self.runs.read().get(thread_id) {
            for run in runs {
                for event in &run.events {
                    if let Some(id) = event.message_id() {
                        ids.insert(id.to_string());
                    }
                }
            }
        }
        ids
    }

    pub fn get_thread_metadata(
        &self,
        thread_id: &str,
        scope: &ScopeDecision,
    ) -> Option<ThreadMetadata> {
        let record = self.state.read().get(thread_id).cloned()?;
        if !matches(&record.resource_ids, scope) {
            return None;
        }
        Some(self.build_metadata(&record))
    }

    pub fn list_threads(
        &self,
        scope: &ScopeDecision,
        limit: Option<usize>,
        offset: usize,
    ) -> (Vec<ThreadMetadata>, usize) {
        let limit = limit
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit);
        let offset = offset.max(0);

        let state = self.state.read();
        let mut matching: Vec<&ThreadRecord> = state
            .values()
            .filter(|r| {
                matches(&r.resource_ids, scope) && !r.thread_id.contains(&self.suggestion_marker)
            })
            .collect();
        matching.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));

        let total = matching.len();
        let page: Vec<ThreadMetadata> = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| self.build_metadata(r))
            .collect();

        (page, total)
    }

    /// Idempotent: no error if the thread is absent or the scope
    /// doesn't match (mirrors `getThreadMetadata`'s 404-not-403 stance
    /// by simply doing nothing rather than surfacing which case it was).
    pub fn delete_thread(&self, thread_id: &str, scope: &ScopeDecision) {
        let should_delete = self
            .state
            .read()
            .get(thread_id)
            .map(|r| matches(&r.resource_ids, scope))
            .unwrap_or(false);
        if !should_delete {
            return;
        }
        self.state.write().remove(thread_id);
        self.runs.write().remove(thread_id);
        self.persist_state();
    }

    fn build_metadata(&self, record: &ThreadRecord) -> ThreadMetadata {
        let runs = self.runs.read();
        let thread_runs = runs.get(&record.thread_id);

        let mut message_ids = HashSet::new();
        let mut first_message: Option<String> = None;
        if let Some(thread_runs) = thread_runs {
            for run in thread_runs {
                for event in &run.events {
                    if let Some(id) = event.message_id() {
                        message_ids.insert(id.to_string());
                    }
                    if first_message.is_none() {
                        if let agentrun_domain::event::Event::TextMessageContent { delta, .. } =
                            event
                        {
                            if !delta.is_empty() {
                                first_message = Some(truncate_str(delta, 100));
                            }
                        }
                    }
                }
            }
        }

        ThreadMetadata {
            thread_id: record.thread_id.clone(),
            created_at: record.created_at,
            last_activity_at: record.last_activity_at,
            is_running: record.is_running,
            message_count: message_ids.len(),
            first_message,
            resource_id: record
                .resource_ids
                .first()
                .cloned()
                .unwrap_or_default(),
            properties: record.properties.clone(),
        }
    }
}

/// UTF-8-safe truncation to at most `max_chars` characters, appending
/// `...` when truncated.
fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_domain::event::RunInput;

    fn cfg(dir: &Path) -> ThreadStoreConfig {
        ThreadStoreConfig {
            data_dir: dir.to_string_lossy().to_string(),
            suggestion_marker: "__suggestion__".into(),
            default_list_limit: 20,
            max_list_limit: 100,
        }
    }

    fn run(thread_id: &str, run_id: &str, parent: Option<&str>) -> Run {
        Run {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            parent_run_id: parent.map(str::to_string),
            input: RunInput::default(),
            events: vec![agentrun_domain::event::Event::RunFinished {
                thread_id: thread_id.into(),
                run_id: run_id.into(),
            }],
            created_at: Utc::now(),
            duration_ms: Some(1),
        }
    }

    #[test]
    fn append_run_is_idempotent_on_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);

        store.append_run(run("t1", "r1", None)).unwrap();
        store.append_run(run("t1", "r1", None)).unwrap();

        assert_eq!(store.list_runs("t1").len(), 1);
    }

    #[test]
    fn append_run_updates_last_activity() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);
        let before = store.get_thread_record("t1").unwrap().last_activity_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append_run(run("t1", "r1", None)).unwrap();
        let after = store.get_thread_record("t1").unwrap().last_activity_at;
        assert!(after >= before);
    }

    #[test]
    fn try_begin_run_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);

        assert!(store.try_begin_run("t1", "r1"));
        assert!(!store.try_begin_run("t1", "r2"));

        store.end_run("t1");
        assert!(store.try_begin_run("t1", "r2"));
    }

    #[test]
    fn get_thread_metadata_returns_none_on_scope_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);

        let mismatched = ScopeDecision::Scoped(agentrun_domain::scope::ResourceScope::single("bob"));
        assert!(store.get_thread_metadata("t1", &mismatched).is_none());

        let matched =
            ScopeDecision::Scoped(agentrun_domain::scope::ResourceScope::single("alice"));
        assert!(store.get_thread_metadata("t1", &matched).is_some());
    }

    #[test]
    fn list_threads_excludes_suggestion_marker() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);
        store.ensure_thread("t1__suggestion__draft", &["alice".to_string()], None);

        let (threads, total) = store.list_threads(
            &ScopeDecision::Scoped(agentrun_domain::scope::ResourceScope::single("alice")),
            None,
            0,
        );
        assert_eq!(total, 1);
        assert_eq!(threads[0].thread_id, "t1");
    }

    #[test]
    fn delete_thread_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);

        let scope = ScopeDecision::Scoped(agentrun_domain::scope::ResourceScope::single("alice"));
        store.delete_thread("t1", &scope);
        store.delete_thread("t1", &scope);
        assert!(!store.thread_exists("t1"));
    }

    #[test]
    fn delete_thread_scope_mismatch_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);

        let mismatched = ScopeDecision::Scoped(agentrun_domain::scope::ResourceScope::single("bob"));
        store.delete_thread("t1", &mismatched);
        assert!(store.thread_exists("t1"));
    }

    #[test]
    fn persist_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = ThreadStore::new(&cfg(dir.path())).unwrap();
            store.ensure_thread("t1", &["alice".to_string()], None);
            store.append_run(run("t1", "r1", None)).unwrap();
        }
        let store2 = ThreadStore::new(&cfg(dir.path())).unwrap();
        assert!(store2.thread_exists("t1"));
        assert_eq!(store2.list_runs("t1").len(), 1);
    }

    #[test]
    fn historic_message_ids_aggregates_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(&cfg(dir.path())).unwrap();
        store.ensure_thread("t1", &["alice".to_string()], None);

        let mut r1 = run("t1", "r1", None);
        r1.events.push(agentrun_domain::event::Event::TextMessageContent {
            message_id: "u1".into(),
            delta: "hi".into(),
        });
        store.append_run(r1).unwrap();

        let ids = store.historic_message_ids("t1");
        assert!(ids.contains("u1"));
    }

    #[test]
    fn reopening_a_store_writes_schema_version_once() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _store = ThreadStore::new(&cfg(dir.path())).unwrap();
        }
        let version_path = dir.path().join("SCHEMA_VERSION");
        assert_eq!(std::fs::read_to_string(&version_path).unwrap().trim(), "1");

        // Reopening with the same on-disk version succeeds.
        assert!(ThreadStore::new(&cfg(dir.path())).is_ok());
    }

    #[test]
    fn newer_on_disk_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SCHEMA_VERSION"), "99").unwrap();
        assert!(ThreadStore::new(&cfg(dir.path())).is_err());
    }
}
