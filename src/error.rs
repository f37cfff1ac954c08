use std::path::PathBuf;

use thiserror::Error;

pub type ForgeResult<T> = Result<T, ForgeError>;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing command `{command}` on PATH")]
    CommandMissing { command: String },

    #[error("command failed: `{command}` (status: {status}){stderr_suffix}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("command timed out after {timeout_ms}ms: `{command}`{stderr_suffix}")]
    CommandTimedOut {
        command: String,
        timeout_ms: u64,
        stderr_suffix: String,
    },

    #[error("unrecognized drive link format: {url}")]
    InvalidLinkFormat { url: String },

    #[error("input file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("drive download failed for {url}: {detail}")]
    DownloadFailed { url: String, detail: String },

    #[error("uploaded file `{name}` is empty")]
    EmptyUpload { name: String },

    #[error("audio extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    #[error("final mux failed: {detail}")]
    MuxFailed { detail: String },

    #[error("automation asset missing at `{0}`")]
    MissingAutomationAsset(PathBuf),

    #[error("render timed out after {timeout_ms}ms waiting for `{expected}`", expected = .expected.display())]
    RenderTimeout { expected: PathBuf, timeout_ms: u64 },

    #[error("missing expected artifact at `{0}`")]
    MissingArtifact(PathBuf),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ForgeError {
    #[must_use]
    pub fn from_command_failure(command: String, status: i32, stderr: String) -> Self {
        let trimmed = stderr.trim();
        let stderr_suffix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("; stderr: {trimmed}")
        };
        Self::CommandFailed {
            command,
            status,
            stderr_suffix,
        }
    }

    #[must_use]
    pub fn from_command_timeout(command: String, timeout_ms: u64, stderr: String) -> Self {
        let trimmed = stderr.trim();
        let stderr_suffix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("; stderr: {trimmed}")
        };
        Self::CommandTimedOut {
            command,
            timeout_ms,
            stderr_suffix,
        }
    }

    /// Stable, unique, machine-readable error code for every variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "AF-IO",
            Self::Json(_) => "AF-JSON",
            Self::CommandMissing { .. } => "AF-CMD-MISSING",
            Self::CommandFailed { .. } => "AF-CMD-FAILED",
            Self::CommandTimedOut { .. } => "AF-CMD-TIMEOUT",
            Self::InvalidLinkFormat { .. } => "AF-LINK-FORMAT",
            Self::FileNotFound(_) => "AF-FILE-NOT-FOUND",
            Self::DownloadFailed { .. } => "AF-DOWNLOAD-FAILED",
            Self::EmptyUpload { .. } => "AF-EMPTY-UPLOAD",
            Self::ExtractionFailed { .. } => "AF-EXTRACT-FAILED",
            Self::MuxFailed { .. } => "AF-MUX-FAILED",
            Self::MissingAutomationAsset(_) => "AF-AUTOMATION-MISSING",
            Self::RenderTimeout { .. } => "AF-RENDER-TIMEOUT",
            Self::MissingArtifact(_) => "AF-MISSING-ARTIFACT",
            Self::InvalidRequest(_) => "AF-INVALID-REQUEST",
        }
    }
}
