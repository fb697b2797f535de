//! Error types for docembed.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, etc.)
//! - Retryability flags so callers know whether resubmitting can help
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for docembed operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    StoreError,

    // Not Found (exit 3)
    EmbeddingNotFound,
    JobNotFound,

    // Validation (exit 4)
    InvalidParameter,
    InvalidInput,

    // State (exit 5)
    InvalidJobTransition,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Upstream embedding provider (exit 9)
    UpstreamError,
    RateLimited,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::StoreError => "STORE_ERROR",
            Self::EmbeddingNotFound => "EMBEDDING_NOT_FOUND",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidJobTransition => "INVALID_JOB_TRANSITION",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::StoreError => 2,
            Self::EmbeddingNotFound | Self::JobNotFound => 3,
            Self::InvalidParameter | Self::InvalidInput => 4,
            Self::InvalidJobTransition => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::UpstreamError | Self::RateLimited => 9,
        }
    }

    /// Whether resubmitting the same request may succeed.
    ///
    /// True for provider hiccups and store contention. Nothing is retried
    /// automatically; this only informs the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamError | Self::RateLimited | Self::StoreError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in docembed operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding not found: {id}")]
    EmbeddingNotFound { id: String },

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidJobTransition { id: String, from: String, to: String },

    #[error("Embedding provider error: {0}")]
    Upstream(String),

    #[error("Embedding provider rate limited: {0}")]
    RateLimited(String),

    #[error("Job {job_id} failed: {source}")]
    JobFailed {
        job_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    ///
    /// A failed job reports the code of the error that failed it.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::EmbeddingNotFound { .. } => ErrorCode::EmbeddingNotFound,
            Self::JobNotFound { .. } => ErrorCode::JobNotFound,
            Self::InvalidJobTransition { .. } => ErrorCode::InvalidJobTransition,
            Self::Upstream(_) => ErrorCode::UpstreamError,
            Self::RateLimited(_) => ErrorCode::RateLimited,
            Self::JobFailed { source, .. } => source.error_code(),
            Self::Database(_) | Self::Store(_) => ErrorCode::StoreError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Wrap a pipeline error with the job it failed.
    #[must_use]
    pub fn job_failed(job_id: impl Into<String>, source: Error) -> Self {
        Self::JobFailed {
            job_id: job_id.into(),
            source: Box::new(source),
        }
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InvalidParameter(msg) => {
                if msg.contains("overlap") || msg.contains("chunk size") {
                    Some(
                        "Chunk size must be > 0 and overlap must be smaller than the chunk size \
                         (defaults: --chunk-size 1000 --chunk-overlap 200)"
                            .to_string(),
                    )
                } else if msg.contains("owner") {
                    Some("Pass --owner <uuid> or set DOCEMBED_OWNER".to_string())
                } else {
                    None
                }
            }

            Self::EmbeddingNotFound { id } => Some(format!(
                "No embedding with ID '{id}' for this owner. Use `docembed list` to see stored embeddings."
            )),

            Self::JobNotFound { id } => Some(format!(
                "No job with ID '{id}' for this owner. Use `docembed job list` to see recent jobs."
            )),

            Self::RateLimited(_) => Some(
                "The provider is throttling requests. Wait and resubmit, or lower --concurrency."
                    .to_string(),
            ),

            Self::Upstream(msg) if msg.contains("timed out") => Some(
                "Raise the timeout with DOCEMBED_TIMEOUT_SECS or `docembed config set --timeout-secs`."
                    .to_string(),
            ),

            Self::JobFailed { job_id, source } => {
                let mut hint = format!(
                    "Records written before the failure are kept. Inspect with `docembed job show {job_id}`."
                );
                if let Some(inner) = source.hint() {
                    hint.push_str("\n  ");
                    hint.push_str(&inner);
                }
                Some(hint)
            }

            Self::Config(_) => Some("Run `docembed config show` to inspect settings".to_string()),

            Self::InvalidInput(_)
            | Self::InvalidJobTransition { .. }
            | Self::Upstream(_)
            | Self::Database(_)
            | Self::Store(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Self::JobFailed { job_id, .. } = self {
            obj["error"]["job_id"] = serde_json::Value::String(job_id.clone());
        }

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
