use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterErrorCode {
    MissingApiKey,
    HttpTimeout,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    NoToolCall,
    Unavailable,
    Unknown,
}

impl InterpreterErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            InterpreterErrorCode::MissingApiKey => "MISSING_API_KEY",
            InterpreterErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            InterpreterErrorCode::RateLimited => "RATE_LIMITED",
            InterpreterErrorCode::InvalidResponse => "INVALID_RESPONSE",
            InterpreterErrorCode::InvalidRequest => "INVALID_REQUEST",
            InterpreterErrorCode::NoToolCall => "NO_TOOL_CALL",
            InterpreterErrorCode::Unavailable => "UNAVAILABLE",
            InterpreterErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InterpreterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("{message}")]
    Interpreter {
        code: InterpreterErrorCode,
        message: String,
        correlation_id: Option<String>,
        details: Option<JsonValue>,
    },

    #[error("{provider} provider error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        status: Option<u16>,
    },

    #[error("no {entity} found matching '{reference}'")]
    NotFound {
        entity: &'static str,
        reference: String,
    },

    #[error("multiple {entity}s match '{reference}'")]
    Ambiguous {
        entity: &'static str,
        reference: String,
        /// (id, title) pairs, at most three.
        candidates: Vec<(String, String)>,
    },

    #[error("update did not persist: {message}")]
    SyncFailure { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn interpreter(code: InterpreterErrorCode, message: impl Into<String>) -> Self {
        Self::interpreter_with_details(code, message, None, None)
    }

    pub fn interpreter_with_details(
        code: InterpreterErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        details: Option<JsonValue>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match &correlation {
            Some(id) => {
                warn!(target: "app::interpreter", code = %code, correlation_id = %id, %message);
            }
            None => {
                warn!(target: "app::interpreter", code = %code, %message);
            }
        }

        AppError::Interpreter {
            code,
            message,
            correlation_id: correlation,
            details,
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::provider", provider, %message, "provider error");
        AppError::Provider {
            provider,
            message,
            status: None,
        }
    }

    pub fn provider_status(
        provider: &'static str,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        error!(target: "app::provider", provider, status, %message, "provider error");
        AppError::Provider {
            provider,
            message,
            status: Some(status),
        }
    }

    pub fn not_found(entity: &'static str, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        warn!(target: "app::resolve", entity, %reference, "entity not found");
        AppError::NotFound { entity, reference }
    }

    pub fn ambiguous(
        entity: &'static str,
        reference: impl Into<String>,
        candidates: Vec<(String, String)>,
    ) -> Self {
        let reference = reference.into();
        warn!(
            target: "app::resolve",
            entity,
            %reference,
            candidate_count = candidates.len(),
            "ambiguous entity reference"
        );
        AppError::Ambiguous {
            entity,
            reference,
            candidates,
        }
    }

    pub fn sync_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::provider::calendar", %message, "sync failure after update");
        AppError::SyncFailure { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "unexpected error");
        AppError::Other(message)
    }

    pub fn interpreter_code(&self) -> Option<InterpreterErrorCode> {
        match self {
            AppError::Interpreter { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            AppError::Interpreter { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn interpreter_details(&self) -> Option<&JsonValue> {
        match self {
            AppError::Interpreter { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}
