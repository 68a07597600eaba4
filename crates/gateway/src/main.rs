use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use agentrun_core::{EventBus, RunCoordinator, ThreadStore};
use agentrun_domain::config::{Config, ConfigSeverity};
use agentrun_domain::error::Error;
use agentrun_gateway::auth::{load_caller_credentials, BearerScopeResolver};
use agentrun_gateway::echo_agent::AgentCatalog;
use agentrun_gateway::router::router;
use agentrun_gateway::state::AppState;

/// Run the Agent Run Coordinator gateway.
#[derive(Parser, Debug)]
#[command(name = "agentrun-gateway")]
struct Cli {
    /// Path to a TOML config file. Defaults are used for anything absent.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(load_config(cli.config.as_deref())?);

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        return Err(Error::InvalidInput(format!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        )));
    }

    // ── Thread store ─────────────────────────────────────────────────
    let threads = Arc::new(ThreadStore::new(&config.thread_store)?);
    tracing::info!("thread store ready");

    // ── Event bus + coordinator ──────────────────────────────────────
    let bus = EventBus::new();
    let coordinator = Arc::new(RunCoordinator::new(threads.clone(), bus));
    tracing::info!("run coordinator ready");

    // ── Agent catalog ────────────────────────────────────────────────
    let agents = Arc::new(AgentCatalog::new());
    tracing::info!(agents = ?agents.ids(), "agent catalog ready");

    // ── Bearer-token auth ────────────────────────────────────────────
    let callers = load_caller_credentials(&config.auth.callers);
    let known_token_hashes = callers.iter().map(|c| c.token_hash.clone()).collect();
    let scope_resolver: Arc<dyn agentrun_core::ScopeResolver> =
        Arc::new(BearerScopeResolver::new(callers));

    let state = AppState {
        config: config.clone(),
        coordinator,
        threads,
        agents,
        scope_resolver,
        known_token_hashes,
    };

    // ── CORS ─────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors_allowed_origins);

    let app = router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(Error::Io)?;
    tracing::info!(addr = %addr, "agentrun-gateway listening");

    axum::serve(listener, app).await.map_err(Error::Io)?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agentrun_gateway=debug")),
        )
        .json()
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, Error> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw)
        .map_err(|e| Error::InvalidInput(format!("parsing {}: {e}", path.display())))
}

/// Builds a [`CorsLayer`] from the configured allowed origins. A literal
/// `"*"` enables fully permissive CORS; entries ending in `:*` match any
/// port on that origin's host; everything else is an exact match.
/// Grounded on the teacher's `build_cors_layer`, trimmed of the
/// rate-limit/dashboard-SPA concerns this spec has no counterpart for.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    let resource_id_header = header::HeaderName::from_static("x-copilotkit-resource-id");

    if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, resource_id_header]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();
    for origin in allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            wildcard_prefixes.push(prefix.to_string());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, resource_id_header])
}
