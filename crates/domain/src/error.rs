/// Shared error type used across the coordinator, store, and gateway crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("thread already running: {0}")]
    ThreadAlreadyRunning(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("agent failure: {0}")]
    AgentFailure(String),

    #[error("middleware timeout: {0}")]
    MiddlewareTimeout(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
