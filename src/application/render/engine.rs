//! Seam between the render driver and the browser that lays out and prints
//! the document.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::domain::layout::{MM_PER_INCH, PaperFormat, PagingMode, Resolution};

/// Error text the engine reports when its target or transport went away
/// underneath an in-flight call. The last four are what the CDP client says
/// once the browser process is gone.
const TEARDOWN_MARKERS: [&str; 10] = [
    "detached",
    "target closed",
    "session closed",
    "page crashed",
    "channel closed",
    "connection closed",
    "oneshot canceled",
    "receiver is gone",
    "no response from the chromium instance",
    "closed connection",
];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser session closed: {0}")]
    SessionClosed(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
    #[error("page script error: {0}")]
    Script(String),
}

impl EngineError {
    /// Classify a raw protocol error message, promoting teardown noise to
    /// [`EngineError::SessionClosed`].
    pub fn from_protocol(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_teardown_message(&message) {
            EngineError::SessionClosed(message)
        } else {
            EngineError::Protocol(message)
        }
    }

    /// The session was torn down while a call was pending, which is what a
    /// cancellation looks like from the driver's side.
    pub fn is_teardown(&self) -> bool {
        match self {
            EngineError::SessionClosed(_) => true,
            EngineError::Protocol(message) | EngineError::Script(message) => {
                is_teardown_message(message)
            }
            EngineError::Launch(_) => false,
        }
    }
}

fn is_teardown_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TEARDOWN_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale: f64,
}

impl Viewport {
    pub fn new(resolution: Resolution, device_scale: f64) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            device_scale,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Profile directory owned by this job alone.
    pub profile_dir: PathBuf,
    pub viewport: Viewport,
    pub timeout: Duration,
}

/// Print parameters handed to the engine, already resolved to inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub prefer_css_page_size: bool,
    pub page_ranges: Option<String>,
    pub print_background: bool,
}

impl PrintOptions {
    /// One page exactly as tall as the measured content.
    pub fn single_page(page_width_mm: f64, content_height_mm: u32) -> Self {
        Self {
            paper_width_in: page_width_mm / MM_PER_INCH,
            paper_height_in: f64::from(content_height_mm.max(1)) / MM_PER_INCH,
            prefer_css_page_size: false,
            page_ranges: Some("1".to_string()),
            print_background: true,
        }
    }

    pub fn fixed(format: PaperFormat) -> Self {
        let (width, height) = format.size_in();
        Self {
            paper_width_in: width,
            paper_height_in: height,
            prefer_css_page_size: true,
            page_ranges: None,
            print_background: true,
        }
    }

    pub fn for_paging(paging: PagingMode, content_height_mm: u32) -> Self {
        match paging {
            PagingMode::SinglePageFit { page_width_mm } => {
                Self::single_page(page_width_mm, content_height_mm)
            }
            PagingMode::FixedFormat(format) => Self::fixed(format),
        }
    }
}

/// Starts one isolated browser per job.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn launch(&self, options: LaunchOptions) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One browser with a single page, exclusively owned by a job.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Handle that can tear the browser down from another task.
    fn handle(&self) -> Arc<dyn EngineHandle>;

    /// Navigate to the document; resolves once the navigation committed.
    async fn open(&self, url: &Url) -> Result<(), EngineError>;

    /// Evaluate an expression, awaiting it when it yields a promise.
    async fn evaluate(&self, script: &str) -> Result<Value, EngineError>;

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, EngineError>;
}

#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Close the browser, force-killing it if it does not exit promptly.
    /// Safe to call more than once.
    async fn terminate(&self);
}
