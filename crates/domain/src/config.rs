use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub thread_store: ThreadStoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// CORS origins allowed to call the SSE/HTTP surface.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn d_host() -> String {
    "0.0.0.0".into()
}

fn d_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStoreConfig {
    /// Base directory holding `runs.jsonl` and `state.json`.
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    /// Thread ids containing this substring are excluded from
    /// `listThreads` (spec's "suggestion" marker).
    #[serde(default = "d_suggestion_marker")]
    pub suggestion_marker: String,
    #[serde(default = "d_default_list_limit")]
    pub default_list_limit: usize,
    #[serde(default = "d_max_list_limit")]
    pub max_list_limit: usize,
}

impl Default for ThreadStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            suggestion_marker: d_suggestion_marker(),
            default_list_limit: d_default_list_limit(),
            max_list_limit: d_max_list_limit(),
        }
    }
}

fn d_data_dir() -> String {
    "./data".into()
}

fn d_suggestion_marker() -> String {
    "__suggestion__".into()
}

fn d_default_list_limit() -> usize {
    20
}

fn d_max_list_limit() -> usize {
    100
}

/// One entry per bearer-token caller the bundled `BearerScopeResolver`
/// recognizes. Each caller's token is read from its own environment
/// variable at startup, never embedded in the config file. A caller is
/// authoritative for exactly its `resource_ids` — the client-declared
/// `X-CopilotKit-Resource-ID` hint can only narrow that set (Strict
/// policy, spec §4.6), never widen it onto another caller's threads.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub callers: Vec<CallerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerConfig {
    /// Environment variable holding this caller's bearer token.
    pub token_env: String,
    /// Resource ids this caller is authoritative for. Ignored (and may
    /// be left empty) when `admin` is true.
    #[serde(default)]
    pub resource_ids: Vec<String>,
    /// If true, a valid token for this caller resolves to admin bypass
    /// (`null` scope, spec §9: read-any, write-existing-only) and the
    /// client hint is ignored entirely rather than filtered.
    #[serde(default)]
    pub admin: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty
    /// vec means everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.cors_allowed_origins.len() == 1
            && self.server.cors_allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors_allowed_origins".into(),
                message: "wildcard CORS origin allows any site to read SSE streams".into(),
            });
        }

        if self.thread_store.data_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "thread_store.data_dir".into(),
                message: "data_dir must not be empty".into(),
            });
        }

        if self.thread_store.default_list_limit == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "thread_store.default_list_limit".into(),
                message: "default_list_limit must be greater than 0".into(),
            });
        }

        if self.thread_store.default_list_limit > self.thread_store.max_list_limit {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "thread_store.default_list_limit".into(),
                message: format!(
                    "default_list_limit ({}) exceeds max_list_limit ({})",
                    self.thread_store.default_list_limit, self.thread_store.max_list_limit
                ),
            });
        }

        for (i, caller) in self.auth.callers.iter().enumerate() {
            if caller.token_env.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("auth.callers[{i}].token_env"),
                    message: "token_env must not be empty".into(),
                });
            }
            if !caller.admin && caller.resource_ids.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("auth.callers[{i}].resource_ids"),
                    message: "non-admin callers must declare at least one resource id".into(),
                });
            }
        }

        if self.auth.callers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "auth.callers".into(),
                message: "no callers configured — every request will be unauthorized".into(),
            });
        }

        errors
    }
}
