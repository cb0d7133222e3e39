//! Headless Chromium behind the render engine seam, driven over CDP with
//! chromiumoxide. Every session is a separate browser process with its own
//! profile directory.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::{
        browser_protocol::{emulation::SetDeviceMetricsOverrideParams, page::PrintToPdfParams},
        js_protocol::runtime::EvaluateParams,
    },
};
use futures::StreamExt;
use serde_json::Value;
use tokio::{sync::Mutex, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::render::{
    EngineError, EngineHandle, EngineSession, LaunchOptions, PrintOptions, RenderEngine,
};

const CLOSE_GRACE: Duration = Duration::from_secs(3);
const LAUNCH_ARGS: [&str; 3] = [
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--hide-scrollbars",
];

/// Well-known install locations, probed in order when no executable is
/// configured.
fn candidate_executables() -> Vec<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };
    candidates.iter().map(PathBuf::from).collect()
}

/// Pick the browser executable: the configured path when it exists, else the
/// first installed candidate. `None` defers to chromiumoxide's own detection.
pub fn resolve_executable(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!(
            target = "md2pdf::infra::chromium",
            path = %path.display(),
            "configured browser executable not found, probing defaults"
        );
    }
    candidate_executables().into_iter().find(|path| path.exists())
}

#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
    request_timeout: Option<Duration>,
}

impl ChromiumEngine {
    pub fn new(configured: Option<&Path>) -> Self {
        let executable = resolve_executable(configured);
        match &executable {
            Some(path) => info!(
                target = "md2pdf::infra::chromium",
                executable = %path.display(),
                "browser executable resolved"
            ),
            None => info!(
                target = "md2pdf::infra::chromium",
                "no browser executable configured; relying on auto-detection"
            ),
        }
        Self {
            executable,
            request_timeout: None,
        }
    }

    /// Bound for individual CDP requests. Long prints need more than the
    /// chromiumoxide default.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = Some(request_timeout);
        self
    }

    fn browser_config(&self, options: &LaunchOptions) -> Result<BrowserConfig, EngineError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(&options.profile_dir)
            .launch_timeout(options.timeout)
            .window_size(options.viewport.width, options.viewport.height);

        for arg in LAUNCH_ARGS {
            builder = builder.arg(arg);
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(request_timeout) = self.request_timeout {
            builder = builder.request_timeout(request_timeout);
        }

        builder.build().map_err(EngineError::Launch)
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self, options: LaunchOptions) -> Result<Box<dyn EngineSession>, EngineError> {
        let config = self.browser_config(&options)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| EngineError::Launch(err.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(
                        target = "md2pdf::infra::chromium",
                        error = %err,
                        "browser event loop stopped"
                    );
                    break;
                }
            }
        });

        let handle = Arc::new(ChromiumHandle {
            browser: Mutex::new(None),
            events: Mutex::new(Some(events)),
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                *handle.browser.lock().await = Some(browser);
                handle.terminate().await;
                return Err(EngineError::Launch(format!("failed to open page: {err}")));
            }
        };
        *handle.browser.lock().await = Some(browser);

        let viewport = options.viewport;
        let metrics = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            viewport.device_scale,
            false,
        );
        if let Err(err) = page.execute(metrics).await {
            handle.terminate().await;
            return Err(EngineError::from_protocol(err.to_string()));
        }

        debug!(
            target = "md2pdf::infra::chromium",
            profile = %options.profile_dir.display(),
            width = viewport.width,
            height = viewport.height,
            scale = viewport.device_scale,
            "browser session ready"
        );
        Ok(Box::new(ChromiumSession { page, handle }))
    }
}

struct ChromiumSession {
    page: Page,
    handle: Arc<ChromiumHandle>,
}

#[async_trait]
impl EngineSession for ChromiumSession {
    fn handle(&self) -> Arc<dyn EngineHandle> {
        self.handle.clone()
    }

    async fn open(&self, url: &Url) -> Result<(), EngineError> {
        self.page
            .goto(url.as_str())
            .await
            .map(|_| ())
            .map_err(|err| EngineError::from_protocol(err.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, EngineError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(EngineError::Script)?;

        let result = self.page.evaluate_expression(params).await.map_err(|err| {
            let message = err.to_string();
            match EngineError::from_protocol(message) {
                EngineError::Protocol(message) => EngineError::Script(message),
                other => other,
            }
        })?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        let params = PrintToPdfParams {
            print_background: Some(options.print_background),
            paper_width: Some(options.paper_width_in),
            paper_height: Some(options.paper_height_in),
            prefer_css_page_size: Some(options.prefer_css_page_size),
            page_ranges: options.page_ranges.clone(),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            ..PrintToPdfParams::default()
        };

        self.page
            .pdf(params)
            .await
            .map_err(|err| EngineError::from_protocol(err.to_string()))
    }
}

struct ChromiumHandle {
    browser: Mutex<Option<Browser>>,
    events: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl EngineHandle for ChromiumHandle {
    async fn terminate(&self) {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            match timeout(CLOSE_GRACE, browser.close()).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => debug!(
                    target = "md2pdf::infra::chromium",
                    error = %err,
                    "browser close request failed"
                ),
                Err(_) => debug!(
                    target = "md2pdf::infra::chromium",
                    "browser did not close in time"
                ),
            }
            if let Some(Err(err)) = browser.kill().await {
                debug!(
                    target = "md2pdf::infra::chromium",
                    error = %err,
                    "browser process already gone"
                );
            }
        }

        if let Some(events) = self.events.lock().await.take() {
            events.abort();
        }
    }
}
