//! Error types for the orchestrator

use thiserror::Error;

/// Result type alias using the crate's [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model gateway error (chat or embedding backend)
    #[error("Model gateway error: {0}")]
    ModelGateway(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Sandbox execution error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Docker/container error
    #[error("Container error: {0}")]
    Container(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Step validator rejected a generated step (§4.3). Carries the
    /// concatenated rule violations handed to the repair path.
    #[error("step validation failed: {0:?}")]
    Validation(Vec<String>),

    /// A plan failed shape validation: missing keys, a cycle, or a step
    /// whose `input_from` references a step that has not run yet.
    #[error("plan shape error: {0}")]
    PlanShape(String),

    /// Either the validation (V) or execution (E) repair budget for a step
    /// was exhausted. Fatal for the current plan iteration, surfaced to
    /// the evaluator.
    #[error("repair budget exhausted for step '{step}' ({kind})")]
    RepairBudgetExhausted { step: String, kind: &'static str },

    /// Session store read/write failure. In interactive deep-search, this
    /// invalidates the turn (§7); elsewhere it is merely logged.
    #[error("session store error: {0}")]
    SessionStore(String),

    /// Knowledge-graph store read/write failure. Always non-fatal: the
    /// graph is derivative of the DAG run, not authoritative for it.
    #[error("graph store error: {0}")]
    GraphStore(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::RateLimit(_) | Error::Timeout(_) | Error::Database(_)
        )
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::NotFound(_) | Error::Unauthorized(_)
        )
    }

    /// Check if the error represents a fatal plan-execution failure that
    /// should surface to the evaluator rather than retry silently (§7).
    pub fn is_fatal_for_plan(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::PlanShape(_) | Error::RepairBudgetExhausted { .. }
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}

impl From<rhai::ParseError> for Error {
    fn from(err: rhai::ParseError) -> Self {
        Error::Sandbox(err.to_string())
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = if self.is_client_error() {
            axum::http::StatusCode::BAD_REQUEST
        } else {
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, axum::Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
