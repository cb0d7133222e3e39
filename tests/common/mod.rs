#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use md2pdf::application::render::{
    DriverConfig, EngineError, EngineHandle, EngineSession, JobRegistry, LaunchOptions,
    MEASURE_HEIGHT, PrintOptions, RenderDriver, RenderEngine, Viewport, WaitBudget,
    WaitCondition,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Notify;
use url::Url;

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake\n";

/// Behaviour of the fake browser.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Value returned by the height measurement.
    pub height_px: f64,
    /// Documents whose URL contains this fragment never finish their diagrams.
    pub stall_on: Option<&'static str>,
    pub fail_launch: bool,
    pub print_error: Option<&'static str>,
    /// What calls fail with after termination; defaults to "Target closed".
    pub closed_error: Option<&'static str>,
    /// The math readiness check never passes.
    pub math_never_ready: bool,
}

/// What the fake browser observed, shared with the test.
#[derive(Default)]
pub struct EngineLog {
    pub launches: AtomicUsize,
    pub terminations: AtomicUsize,
    pub viewports: Mutex<Vec<Viewport>>,
    pub prints: Mutex<Vec<PrintOptions>>,
    pub documents: Mutex<Vec<String>>,
    /// Every script evaluated, in order.
    pub scripts: Mutex<Vec<String>>,
    /// Signalled every time a stalled document is polled.
    pub stalled: Notify,
}

impl EngineLog {
    pub fn prints(&self) -> Vec<PrintOptions> {
        self.prints.lock().expect("prints lock").clone()
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().expect("documents lock").clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().expect("scripts lock").clone()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

pub struct FakeEngine {
    script: Script,
    log: Arc<EngineLog>,
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn launch(&self, options: LaunchOptions) -> Result<Box<dyn EngineSession>, EngineError> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_launch {
            return Err(EngineError::Launch("no browser executable found".to_string()));
        }
        self.log
            .viewports
            .lock()
            .expect("viewports lock")
            .push(options.viewport);

        Ok(Box::new(FakeSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            handle: Arc::new(FakeHandle {
                closed: AtomicBool::new(false),
                log: Arc::clone(&self.log),
            }),
            stalls: AtomicBool::new(false),
        }))
    }
}

struct FakeSession {
    script: Script,
    log: Arc<EngineLog>,
    handle: Arc<FakeHandle>,
    stalls: AtomicBool,
}

impl FakeSession {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.handle.closed.load(Ordering::SeqCst) {
            return Err(EngineError::from_protocol(
                self.script.closed_error.unwrap_or("Target closed"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EngineSession for FakeSession {
    fn handle(&self) -> Arc<dyn EngineHandle> {
        self.handle.clone()
    }

    async fn open(&self, url: &Url) -> Result<(), EngineError> {
        self.ensure_open()?;
        let path = url
            .to_file_path()
            .map_err(|()| EngineError::Protocol(format!("not a file url: {url}")))?;
        let html = std::fs::read_to_string(&path)
            .map_err(|err| EngineError::Protocol(format!("net::ERR_FILE_NOT_FOUND: {err}")))?;
        self.log
            .documents
            .lock()
            .expect("documents lock")
            .push(html);

        if let Some(fragment) = self.script.stall_on {
            self.stalls
                .store(url.as_str().contains(fragment), Ordering::SeqCst);
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, EngineError> {
        self.ensure_open()?;
        self.log
            .scripts
            .lock()
            .expect("scripts lock")
            .push(script.to_string());
        if script == MEASURE_HEIGHT {
            return Ok(json!(self.script.height_px));
        }
        if script == WaitCondition::DiagramsRendered.script() && self.stalls.load(Ordering::SeqCst)
        {
            self.log.stalled.notify_one();
            return Ok(Value::Bool(false));
        }
        if script == WaitCondition::MathReady.script() && self.script.math_never_ready {
            return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(true))
    }

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        if let Some(message) = self.script.print_error {
            return Err(EngineError::Protocol(message.to_string()));
        }
        self.log
            .prints
            .lock()
            .expect("prints lock")
            .push(options.clone());
        Ok(FAKE_PDF.to_vec())
    }
}

struct FakeHandle {
    closed: AtomicBool,
    log: Arc<EngineLog>,
}

#[async_trait]
impl EngineHandle for FakeHandle {
    async fn terminate(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.log.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A driver wired to the fake engine inside a throwaway directory.
pub struct Harness {
    pub driver: RenderDriver,
    pub log: Arc<EngineLog>,
    pub root: TempDir,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::with_config(script, |_| {})
    }

    pub fn with_config(script: Script, adjust: impl FnOnce(&mut DriverConfig)) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let mut config = DriverConfig {
            assets_dir: root.path().join("assets"),
            work_root: root.path().join("work"),
            debug_dir: None,
            session_budget: Duration::from_secs(10),
            launch_timeout: Duration::from_secs(5),
            waits: WaitBudget {
                readiness: Duration::from_secs(2),
                images: Duration::from_secs(2),
                diagrams: Duration::from_secs(30),
                math: Duration::from_secs(2),
                poll: Duration::from_millis(10),
                settle: Duration::from_millis(1),
            },
        };
        adjust(&mut config);

        let log = Arc::new(EngineLog::default());
        let engine = FakeEngine {
            script,
            log: Arc::clone(&log),
        };
        let driver = RenderDriver::new(Arc::new(engine), JobRegistry::new(), config);
        Self { driver, log, root }
    }

    pub fn work_root(&self) -> PathBuf {
        self.driver.config().work_root.clone()
    }

    /// Job directories still present under the work root.
    pub fn leftover_job_dirs(&self) -> usize {
        count_entries(&self.work_root())
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Wait until the fake browser reports a stalled document.
pub async fn until_stalled(log: &EngineLog) {
    tokio::time::timeout(Duration::from_secs(5), log.stalled.notified())
        .await
        .expect("render should reach the stalled diagram wait");
}
