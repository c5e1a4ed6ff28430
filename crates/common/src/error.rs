//! Error types shared across Montage crates.

/// Who is at fault for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Bad input, missing record, or a foreign owner. Retrying the same call won't help.
    Client,
    /// Engine, storage, or I/O failure on our side.
    System,
}

/// Top-level error type for Montage operations.
#[derive(Debug, thiserror::Error)]
pub enum MontageError {
    #[error("Validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Engine failure (status {}): {diagnostic}", status_label(.status))]
    EngineFailure {
        status: Option<i32>,
        diagnostic: String,
    },

    #[error("Transcoding engine unavailable: {message}")]
    EngineUnavailable { message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Ownership error: {message}")]
    Ownership { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Render timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn status_label(status: &Option<i32>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Result type alias using MontageError.
pub type MontageResult<T> = Result<T, MontageError>;

impl MontageError {
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn engine_failure(status: Option<i32>, diagnostic: impl Into<String>) -> Self {
        Self::EngineFailure {
            status,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            message: msg.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn ownership(msg: impl Into<String>) -> Self {
        Self::Ownership {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Classify the error for the request surface.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Validation { .. } | Self::Ownership { .. } | Self::NotFound { .. } => {
                Fault::Client
            }
            _ => Fault::System,
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.fault() == Fault::Client
    }
}
