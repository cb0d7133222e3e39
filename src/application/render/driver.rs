//! Drives one job from Markdown to PDF bytes through an isolated browser,
//! guaranteeing cleanup on every exit path.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, gauge, histogram};
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{error::DomainError, layout::px_to_mm, request::RenderRequest};

use super::{
    assemble::{AssetBase, DocumentOptions, assemble},
    embed::{EmbedMode, embed},
    engine::{EngineError, EngineHandle, EngineSession, LaunchOptions, PrintOptions, RenderEngine, Viewport},
    runtime::{JobAborted, JobRegistry, JobTicket},
    service::{TransformOptions, transformer},
    types::{JobPhase, PdfResult, RenderError},
    wait::{MEASURE_HEIGHT, TYPESET_MATH, WaitBudget, WaitCondition, wait},
};

const METRIC_JOBS_STARTED: &str = "md2pdf_jobs_started_total";
const METRIC_JOBS_COMPLETED: &str = "md2pdf_jobs_completed_total";
const METRIC_JOBS_ABORTED: &str = "md2pdf_jobs_aborted_total";
const METRIC_JOBS_FAILED: &str = "md2pdf_jobs_failed_total";
const METRIC_RENDER_MS: &str = "md2pdf_render_ms";
const METRIC_JOBS_IN_FLIGHT: &str = "md2pdf_jobs_in_flight";

/// Where the Markdown came from, which decides how local images resolve.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Submitted over HTTP; images exist only as request attachments.
    Uploaded,
    /// Read from disk; relative images resolve against `base_dir`.
    LocalFile { base_dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Absolute directory holding `style/` and `libs/`.
    pub assets_dir: PathBuf,
    /// Parent of the per-job directories.
    pub work_root: PathBuf,
    /// Successful outputs are also copied here when set.
    pub debug_dir: Option<PathBuf>,
    /// Upper bound for a whole browser session.
    pub session_budget: Duration,
    pub launch_timeout: Duration,
    pub waits: WaitBudget,
}

/// A fully assembled HTML document ready to be loaded.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub html: String,
    pub has_math: bool,
}

#[derive(Clone)]
pub struct RenderDriver {
    engine: Arc<dyn RenderEngine>,
    registry: JobRegistry,
    config: Arc<DriverConfig>,
}

enum StepError {
    Engine(EngineError),
    Aborted,
    Io(io::Error),
}

impl From<EngineError> for StepError {
    fn from(err: EngineError) -> Self {
        StepError::Engine(err)
    }
}

impl From<JobAborted> for StepError {
    fn from(_: JobAborted) -> Self {
        StepError::Aborted
    }
}

impl From<io::Error> for StepError {
    fn from(err: io::Error) -> Self {
        StepError::Io(err)
    }
}

impl RenderDriver {
    pub fn new(engine: Arc<dyn RenderEngine>, registry: JobRegistry, config: DriverConfig) -> Self {
        Self {
            engine,
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run the content pipeline without touching the engine.
    pub fn prepare(
        &self,
        request: &RenderRequest,
        source: &DocumentSource,
        assets: AssetBase,
    ) -> Result<PreparedDocument, RenderError> {
        let (options, mode) = match source {
            DocumentSource::Uploaded => (TransformOptions::default(), EmbedMode::Detached),
            DocumentSource::LocalFile { base_dir } => {
                let base = Url::from_directory_path(base_dir).map_err(|()| {
                    DomainError::validation("file", "source directory must be an absolute path")
                })?;
                (TransformOptions::with_image_base(base), EmbedMode::LocalFiles)
            }
        };

        let transformed = transformer().transform(&request.markdown, &options)?;
        let (body, _) = embed(&transformed.html, &request.images, mode)?;
        let html = assemble(
            &body,
            &DocumentOptions {
                theme: request.theme,
                content_width_mm: request.paging.content_width_mm(),
                margin_mm: request.margin_mm,
                title: request.file_name.clone(),
                has_math: transformed.has_math,
                assets,
            },
        );

        Ok(PreparedDocument {
            html,
            has_math: transformed.has_math,
        })
    }

    /// Assembled document with asset URLs under `origin`, for in-browser preview.
    pub fn preview(&self, request: &RenderRequest, origin: &str) -> Result<String, RenderError> {
        let document = self.prepare(
            request,
            &DocumentSource::Uploaded,
            AssetBase::Origin(origin.to_string()),
        )?;
        Ok(document.html)
    }

    pub async fn generate(
        &self,
        request: &RenderRequest,
        source: DocumentSource,
    ) -> Result<PdfResult, RenderError> {
        let started = Instant::now();
        let document = self.prepare(
            request,
            &source,
            AssetBase::Directory(self.config.assets_dir.clone()),
        )?;

        let timestamp = unix_millis();
        let work_dir = create_work_dir(&self.config.work_root, &request.file_name, timestamp)?;
        let document_path = work_dir.path().join(format!("{}.html", request.file_name));
        tokio::fs::write(&document_path, document.html.as_bytes()).await?;
        let document_url = Url::from_file_path(&document_path).map_err(|()| RenderError::Document {
            message: "work directory must be an absolute path".to_string(),
        })?;

        let ticket = self.registry.register(&request.job_id, work_dir.path());
        counter!(METRIC_JOBS_STARTED).increment(1);
        gauge!(METRIC_JOBS_IN_FLIGHT).increment(1.0);
        info!(
            target = "md2pdf::render::driver",
            job_id = request.job_id.as_str(),
            theme = request.theme.as_str(),
            paging = ?request.paging,
            has_math = document.has_math,
            "render job started"
        );

        let mut cleanup = JobCleanup {
            registry: self.registry.clone(),
            ticket: ticket.clone(),
            engine: None,
            work_dir: Some(work_dir),
        };

        let session = async {
            tokio::select! {
                outcome = self.run_session(
                    request,
                    &ticket,
                    &mut cleanup,
                    &document_url,
                    document.has_math,
                ) => outcome,
                () = ticket.aborted() => Err(StepError::Aborted),
            }
        };
        let outcome = match timeout(self.config.session_budget, session).await {
            Ok(outcome) => outcome.map_err(|err| self.classify(&ticket, err)),
            Err(_) => Err(if ticket.is_aborted() {
                RenderError::Aborted
            } else {
                RenderError::failed(
                    ticket.phase(),
                    format!(
                        "session exceeded its {:?} budget",
                        self.config.session_budget
                    ),
                )
            }),
        };

        let result = match outcome {
            Ok(bytes) => match self.registry.advance(&ticket, JobPhase::Completed) {
                Ok(()) => Ok(bytes),
                Err(JobAborted) => Err(RenderError::Aborted),
            },
            Err(err) => Err(err),
        };

        let result = match result {
            Ok(bytes) => {
                let file_name = request.suggested_file_name(timestamp);
                let debug_artifact = self.retain_debug_copy(&ticket, &file_name, &bytes).await;
                Ok(PdfResult {
                    bytes,
                    file_name,
                    debug_artifact,
                })
            }
            Err(err) => {
                let terminal = if err.is_aborted() {
                    JobPhase::Aborted
                } else {
                    JobPhase::Failed
                };
                let failed_in = ticket.phase();
                self.registry.set_phase(&ticket, terminal);
                self.record_failure(request, failed_in, &err);
                Err(err)
            }
        };

        cleanup.finish().await;

        if let Ok(pdf) = &result {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            counter!(METRIC_JOBS_COMPLETED).increment(1);
            histogram!(METRIC_RENDER_MS).record(elapsed_ms);
            info!(
                target = "md2pdf::render::driver",
                job_id = request.job_id.as_str(),
                bytes = pdf.bytes.len(),
                file_name = pdf.file_name.as_str(),
                elapsed_ms = elapsed_ms as u64,
                "render job completed"
            );
        }
        result
    }

    async fn run_session(
        &self,
        request: &RenderRequest,
        ticket: &JobTicket,
        cleanup: &mut JobCleanup,
        document_url: &Url,
        has_math: bool,
    ) -> Result<Vec<u8>, StepError> {
        let waits = self.config.waits;

        self.registry.advance(ticket, JobPhase::EngineLaunching)?;
        let launch = LaunchOptions {
            profile_dir: cleanup.profile_dir()?,
            viewport: Viewport::new(request.resolution, request.device_scale),
            timeout: self.config.launch_timeout,
        };
        let session = self.engine.launch(launch).await?;
        let handle = session.handle();
        cleanup.engine = Some(Arc::clone(&handle));
        self.registry.attach_engine(ticket, handle)?;

        self.registry.advance(ticket, JobPhase::DocumentLoading)?;
        session.open(document_url).await?;
        for condition in [WaitCondition::DocumentComplete, WaitCondition::NetworkIdle] {
            wait(session.as_ref(), condition, waits.limit_for(condition), waits.poll).await?;
        }

        self.registry.advance(ticket, JobPhase::AwaitingAsyncRender)?;
        for condition in [WaitCondition::ImagesSettled, WaitCondition::DiagramsRendered] {
            wait(session.as_ref(), condition, waits.limit_for(condition), waits.poll).await?;
        }
        if has_math {
            self.typeset_math(session.as_ref(), ticket, waits).await?;
        }

        self.registry.advance(ticket, JobPhase::Measuring)?;
        let measured = session.evaluate(MEASURE_HEIGHT).await?;
        let height_px = measured.as_f64().ok_or_else(|| {
            EngineError::Script(format!("document height is not a number: {measured}"))
        })?;
        let height_mm = px_to_mm(height_px);
        debug!(
            target = "md2pdf::render::driver",
            job_id = ticket.job_id(),
            height_px,
            height_mm,
            "content measured"
        );

        self.registry.advance(ticket, JobPhase::Paginating)?;
        let print = PrintOptions::for_paging(request.paging, height_mm);
        let bytes = session.print_pdf(&print).await?;
        if ticket.is_aborted() {
            return Err(StepError::Aborted);
        }
        Ok(bytes)
    }

    async fn typeset_math(
        &self,
        session: &dyn EngineSession,
        ticket: &JobTicket,
        waits: WaitBudget,
    ) -> Result<(), StepError> {
        let ready = wait(session, WaitCondition::MathReady, waits.math, waits.poll).await?;
        if !ready.is_satisfied() {
            return Ok(());
        }

        match timeout(waits.math, session.evaluate(TYPESET_MATH)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.is_teardown() => return Err(err.into()),
            Ok(Err(err)) => warn!(
                target = "md2pdf::render::driver",
                job_id = ticket.job_id(),
                error = %err,
                "math typesetting failed, continuing"
            ),
            Err(_) => warn!(
                target = "md2pdf::render::driver",
                job_id = ticket.job_id(),
                "math typesetting timed out, continuing"
            ),
        }
        sleep(waits.settle).await;
        Ok(())
    }

    fn classify(&self, ticket: &JobTicket, err: StepError) -> RenderError {
        if ticket.is_aborted() {
            return RenderError::Aborted;
        }
        match err {
            StepError::Aborted => RenderError::Aborted,
            StepError::Engine(err) if err.is_teardown() => RenderError::Aborted,
            StepError::Engine(err) => RenderError::failed(ticket.phase(), err.to_string()),
            StepError::Io(err) => RenderError::failed(ticket.phase(), err.to_string()),
        }
    }

    fn record_failure(&self, request: &RenderRequest, phase: JobPhase, err: &RenderError) {
        if err.is_aborted() {
            counter!(METRIC_JOBS_ABORTED).increment(1);
            info!(
                target = "md2pdf::render::driver",
                job_id = request.job_id.as_str(),
                phase = phase.as_str(),
                "render job aborted"
            );
        } else {
            counter!(METRIC_JOBS_FAILED).increment(1);
            warn!(
                target = "md2pdf::render::driver",
                job_id = request.job_id.as_str(),
                phase = phase.as_str(),
                error = %err,
                "render job failed"
            );
        }
    }

    async fn retain_debug_copy(
        &self,
        ticket: &JobTicket,
        file_name: &str,
        bytes: &[u8],
    ) -> Option<PathBuf> {
        let debug_dir = self.config.debug_dir.as_ref()?;
        let path = debug_dir.join(file_name);
        let written = async {
            tokio::fs::create_dir_all(debug_dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;

        match written {
            Ok(()) => {
                self.registry.record_debug_artifact(ticket, path.clone());
                debug!(
                    target = "md2pdf::render::driver",
                    job_id = ticket.job_id(),
                    path = %path.display(),
                    "debug copy written"
                );
                Some(path)
            }
            Err(err) => {
                warn!(
                    target = "md2pdf::render::driver",
                    job_id = ticket.job_id(),
                    path = %path.display(),
                    error = %err,
                    "failed to write debug copy"
                );
                None
            }
        }
    }
}

/// Releases everything a job holds. `finish` does it in order; `Drop` covers
/// futures dropped mid-session.
struct JobCleanup {
    registry: JobRegistry,
    ticket: JobTicket,
    engine: Option<Arc<dyn EngineHandle>>,
    work_dir: Option<TempDir>,
}

impl JobCleanup {
    fn profile_dir(&self) -> Result<PathBuf, io::Error> {
        self.work_dir
            .as_ref()
            .map(|dir| dir.path().join("profile"))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "job directory already removed"))
    }

    async fn finish(mut self) {
        if let Some(engine) = self.engine.take() {
            engine.terminate().await;
        }
        if let Some(dir) = self.work_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close()
                && err.kind() != io::ErrorKind::NotFound
            {
                warn!(
                    target = "md2pdf::render::driver",
                    job_id = self.ticket.job_id(),
                    path = %path.display(),
                    error = %err,
                    "failed to remove job directory"
                );
            }
        }
    }
}

impl Drop for JobCleanup {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take()
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            runtime.spawn(async move { engine.terminate().await });
        }
        self.registry.release(&self.ticket);
        gauge!(METRIC_JOBS_IN_FLIGHT).decrement(1.0);
    }
}

fn create_work_dir(root: &Path, file_name: &str, timestamp: i128) -> Result<TempDir, io::Error> {
    std::fs::create_dir_all(root)?;
    tempfile::Builder::new()
        .prefix(&format!("{file_name}-{timestamp}-"))
        .tempdir_in(root)
}

pub fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}
