use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{engine::EngineHandle, types::JobPhase};

/// Shared between the registry entry and the driver that owns the job.
#[derive(Debug)]
struct JobState {
    aborted: watch::Sender<bool>,
    phase: AtomicU8,
}

impl JobState {
    fn new() -> Self {
        Self {
            aborted: watch::Sender::new(false),
            phase: AtomicU8::new(JobPhase::Created as u8),
        }
    }

    fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }

    fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.phase.load(Ordering::Acquire))
    }
}

struct JobEntry {
    ticket: u64,
    state: Arc<JobState>,
    work_dir: PathBuf,
    engine: Option<Arc<dyn EngineHandle>>,
    debug_artifact: Option<PathBuf>,
}

/// Proof of registration held by the driver for the lifetime of a job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    job_id: String,
    ticket: u64,
    state: Arc<JobState>,
}

impl JobTicket {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_aborted(&self) -> bool {
        self.state.is_aborted()
    }

    /// Resolves once the job has been cancelled.
    pub async fn aborted(&self) {
        let mut flag = self.state.aborted.subscribe();
        // The sender lives in `state`, which this ticket keeps alive.
        flag.wait_for(|aborted| *aborted).await.ok();
    }

    pub fn phase(&self) -> JobPhase {
        self.state.phase()
    }

    pub fn set_phase(&self, phase: JobPhase) {
        self.state.phase.store(phase as u8, Ordering::Release);
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("render job was cancelled")]
pub struct JobAborted;

/// Everything a cancellation has to tear down, detached from the registry.
pub struct AbortedJob {
    pub job_id: String,
    pub engine: Option<Arc<dyn EngineHandle>>,
    pub work_dir: PathBuf,
    pub debug_artifact: Option<PathBuf>,
}

pub enum MarkOutcome {
    Marked(AbortedJob),
    AlreadyFinished,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    AlreadyFinished,
    NotFound,
}

impl CancelOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::AlreadyFinished => "already_finished",
            CancelOutcome::NotFound => "not_found",
        }
    }
}

/// In-flight render jobs keyed by caller-visible job id.
///
/// Registration is last-write-wins; every entry carries a ticket number so a
/// superseded job releasing late cannot evict its successor.
#[derive(Default, Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, JobEntry>>,
    next_ticket: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: &str, work_dir: &Path) -> JobTicket {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let state = Arc::new(JobState::new());
        let previous = self.jobs.insert(
            job_id.to_string(),
            JobEntry {
                ticket,
                state: Arc::clone(&state),
                work_dir: work_dir.to_path_buf(),
                engine: None,
                debug_artifact: None,
            },
        );
        if previous.is_some() {
            warn!(
                target = "md2pdf::render::registry",
                job_id, "job id reused while in flight; previous job is no longer cancellable"
            );
        }

        JobTicket {
            job_id: job_id.to_string(),
            ticket,
            state,
        }
    }

    /// Record the engine so a cancel can terminate it. Fails when the job was
    /// cancelled before the engine came up; the caller must then terminate the
    /// engine itself.
    pub fn attach_engine(
        &self,
        ticket: &JobTicket,
        engine: Arc<dyn EngineHandle>,
    ) -> Result<(), JobAborted> {
        if let Some(mut entry) = self.jobs.get_mut(&ticket.job_id)
            && entry.ticket == ticket.ticket
        {
            if entry.state.is_aborted() {
                return Err(JobAborted);
            }
            entry.engine = Some(engine);
            return Ok(());
        }

        if ticket.is_aborted() {
            Err(JobAborted)
        } else {
            Ok(())
        }
    }

    pub fn record_debug_artifact(&self, ticket: &JobTicket, path: PathBuf) {
        if let Some(mut entry) = self.jobs.get_mut(&ticket.job_id)
            && entry.ticket == ticket.ticket
        {
            entry.debug_artifact = Some(path);
        }
    }

    /// Move a live job to `phase`, refusing once it has been cancelled. The
    /// check and the store happen under the entry lock, so a concurrent
    /// cancel either sees the new phase or the driver sees the abort.
    pub fn advance(&self, ticket: &JobTicket, phase: JobPhase) -> Result<(), JobAborted> {
        if let Some(entry) = self.jobs.get(&ticket.job_id)
            && entry.ticket == ticket.ticket
        {
            if entry.state.is_aborted() {
                return Err(JobAborted);
            }
            self.set_phase(ticket, phase);
            return Ok(());
        }

        if ticket.is_aborted() {
            return Err(JobAborted);
        }
        self.set_phase(ticket, phase);
        Ok(())
    }

    pub fn set_phase(&self, ticket: &JobTicket, phase: JobPhase) {
        ticket.set_phase(phase);
        debug!(
            target = "md2pdf::render::registry",
            job_id = ticket.job_id.as_str(),
            phase = phase.as_str(),
            "job phase changed"
        );
    }

    pub fn phase(&self, job_id: &str) -> Option<JobPhase> {
        self.jobs.get(job_id).map(|entry| entry.state.phase())
    }

    /// Flag the job as aborted and detach it from the registry in one step.
    pub fn mark_aborted(&self, job_id: &str) -> MarkOutcome {
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(occupied) => {
                let state = Arc::clone(&occupied.get().state);
                if state.phase() == JobPhase::Completed {
                    return MarkOutcome::AlreadyFinished;
                }
                state.aborted.send_replace(true);
                state
                    .phase
                    .store(JobPhase::Aborted as u8, Ordering::Release);
                let (job_id, entry) = occupied.remove_entry();
                MarkOutcome::Marked(AbortedJob {
                    job_id,
                    engine: entry.engine,
                    work_dir: entry.work_dir,
                    debug_artifact: entry.debug_artifact,
                })
            }
            Entry::Vacant(_) => MarkOutcome::NotFound,
        }
    }

    /// Cancel a job: terminate its engine and delete its files.
    pub async fn cancel(&self, job_id: &str) -> CancelOutcome {
        let job = match self.mark_aborted(job_id) {
            MarkOutcome::Marked(job) => job,
            MarkOutcome::AlreadyFinished => {
                debug!(
                    target = "md2pdf::render::registry",
                    job_id, "cancel ignored; job already produced its output"
                );
                return CancelOutcome::AlreadyFinished;
            }
            MarkOutcome::NotFound => return CancelOutcome::NotFound,
        };

        if let Some(engine) = &job.engine {
            engine.terminate().await;
        }
        remove_quietly(&job.work_dir, true).await;
        if let Some(artifact) = &job.debug_artifact {
            remove_quietly(artifact, false).await;
        }

        info!(
            target = "md2pdf::render::registry",
            job_id = job.job_id.as_str(),
            engine_attached = job.engine.is_some(),
            "render job cancelled"
        );
        CancelOutcome::Cancelled
    }

    /// Drop the entry owned by `ticket`. Idempotent.
    pub fn release(&self, ticket: &JobTicket) {
        self.jobs
            .remove_if(&ticket.job_id, |_, entry| entry.ticket == ticket.ticket);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

async fn remove_quietly(path: &Path, directory: bool) {
    let result = if directory {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            target = "md2pdf::render::registry",
            path = %path.display(),
            error = %err,
            "failed to remove job file"
        ),
    }
}
