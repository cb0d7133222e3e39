use std::{fmt, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::domain::error::DomainError;

/// Lifecycle of one render job. Transitions are strictly sequential through
/// the non-terminal phases; `Aborted` and `Failed` may follow any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobPhase {
    Created = 0,
    EngineLaunching = 1,
    DocumentLoading = 2,
    AwaitingAsyncRender = 3,
    Measuring = 4,
    Paginating = 5,
    Completed = 6,
    Aborted = 7,
    Failed = 8,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPhase::Created => "created",
            JobPhase::EngineLaunching => "engine_launching",
            JobPhase::DocumentLoading => "document_loading",
            JobPhase::AwaitingAsyncRender => "awaiting_async_render",
            JobPhase::Measuring => "measuring",
            JobPhase::Paginating => "paginating",
            JobPhase::Completed => "completed",
            JobPhase::Aborted => "aborted",
            JobPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Aborted | JobPhase::Failed
        )
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => JobPhase::Created,
            1 => JobPhase::EngineLaunching,
            2 => JobPhase::DocumentLoading,
            3 => JobPhase::AwaitingAsyncRender,
            4 => JobPhase::Measuring,
            5 => JobPhase::Paginating,
            6 => JobPhase::Completed,
            7 => JobPhase::Aborted,
            _ => JobPhase::Failed,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful job.
#[derive(Debug, Clone)]
pub struct PdfResult {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub debug_artifact: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("render cancelled")]
    Aborted,
    #[error("render failed while {phase}: {message}")]
    Failed { phase: JobPhase, message: String },
    #[error("markdown conversion failed: {message}")]
    Markdown { message: String },
    #[error("document assembly failed: {message}")]
    Document { message: String },
    #[error("work directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn failed(phase: JobPhase, message: impl Into<String>) -> Self {
        Self::Failed {
            phase,
            message: message.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RenderError::Aborted)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RenderError::Validation(_))
    }
}
