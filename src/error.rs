//! Custom error types for the executor
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigSection;
use crate::types::{CommandKind, CommandStage};

/// Failures of the actuation / perception pipeline
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Window did not appear within {timeout_secs}s after launching {path}")]
    LaunchTimeout { path: String, timeout_secs: u64 },

    #[error("Failed to spawn {path}: {reason}")]
    Spawn { path: String, reason: String },

    #[error("No window matches {pattern}")]
    WindowNotFound { pattern: String },

    #[error("Window {window} not in foreground after {attempts} attempts")]
    FocusError { window: String, attempts: u32 },

    #[error("Outside trading hours at {now} (allowed: {sessions})")]
    GatingError { now: String, sessions: String },

    #[error("Input rejected by target application: {reason}")]
    InputError { reason: String },

    #[error("Invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("Screen capture failed: {reason}")]
    CaptureError { reason: String },

    #[error("Extraction failed: {0}")]
    ExtractionError(#[from] VisionError),

    #[error("Persistence failed: {0}")]
    PersistenceError(#[from] std::io::Error),

    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Command queue closed")]
    QueueClosed,
}

/// Copyable discriminant of [`ExecutorError`], carried inside results and log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LaunchTimeout,
    Spawn,
    WindowNotFound,
    Focus,
    Gating,
    Input,
    InvalidOrder,
    Capture,
    Extraction,
    Persistence,
    Actuator,
    Cancelled,
    QueueClosed,
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::LaunchTimeout { .. } => ErrorKind::LaunchTimeout,
            ExecutorError::Spawn { .. } => ErrorKind::Spawn,
            ExecutorError::WindowNotFound { .. } => ErrorKind::WindowNotFound,
            ExecutorError::FocusError { .. } => ErrorKind::Focus,
            ExecutorError::GatingError { .. } => ErrorKind::Gating,
            ExecutorError::InputError { .. } => ErrorKind::Input,
            ExecutorError::InvalidOrder { .. } => ErrorKind::InvalidOrder,
            ExecutorError::CaptureError { .. } => ErrorKind::Capture,
            ExecutorError::ExtractionError(_) => ErrorKind::Extraction,
            ExecutorError::PersistenceError(_) => ErrorKind::Persistence,
            ExecutorError::Actuator(_) => ErrorKind::Actuator,
            ExecutorError::Cancelled => ErrorKind::Cancelled,
            ExecutorError::QueueClosed => ErrorKind::QueueClosed,
        }
    }

    /// Errors raised while locating or focusing the window, before any keystroke.
    pub fn is_window_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::LaunchTimeout | ErrorKind::Spawn | ErrorKind::WindowNotFound | ErrorKind::Focus
        )
    }
}

/// A failed command together with what the caller needs to decide on a manual retry.
#[derive(Error, Debug)]
#[error("{kind} failed while {stage} (target: {}, at {at}): {source}", .target.as_deref().unwrap_or("-"))]
pub struct CommandError {
    pub command_id: Uuid,
    pub kind: CommandKind,
    pub target: Option<String>,
    pub stage: CommandStage,
    pub at: DateTime<Local>,
    #[source]
    pub source: ExecutorError,
}

impl CommandError {
    pub fn error_kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Vision service errors. All of them degrade query results instead of failing them.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid image: {0}")]
    Image(String),
}

impl From<async_openai::error::OpenAIError> for VisionError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        use async_openai::error::OpenAIError;

        match err {
            OpenAIError::ApiError(api) => {
                let lowered = api.message.to_lowercase();
                if lowered.contains("api key") || lowered.contains("unauthorized") || lowered.contains("authentication") {
                    VisionError::Auth(api.message)
                } else {
                    VisionError::Api(api.message)
                }
            }
            OpenAIError::JSONDeserialize(e) => VisionError::Malformed(e.to_string()),
            OpenAIError::Reqwest(e) if e.is_timeout() => VisionError::Api(format!("transport timeout: {}", e)),
            other => VisionError::Api(other.to_string()),
        }
    }
}

/// Configuration loading / validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid `{section}` configuration: {reason}")]
    Invalid { section: ConfigSection, reason: String },
}

impl ConfigError {
    pub fn invalid(section: ConfigSection, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            section,
            reason: reason.into(),
        }
    }
}
