//! Grammar correction results
//!
//! A grammar message only carries the job id and the original document. The
//! corrected document is resolved here: the job status is polled until it
//! reports `grammar_completed`, the output is fetched once and cached under
//! the job id so revisiting the conversation does not hit the backend again.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversation::GrammarJob;
use crate::diff::DiffView;
use crate::jobs::{poll_until, JobClient, JobError, JobStatus, PollPolicy, Tool};

use super::storage::KvStorage;

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Job {0} finished without output")]
    EmptyOutput(String),
}

/// A resolved correction ready for display
#[derive(Debug, Clone, Serialize)]
pub struct Correction {
    pub job_id: String,
    pub corrected: String,
    pub view: DiffView,
    /// Served from the local cache
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CorrectionState {
    Pending { status: JobStatus },
    Ready(Correction),
}

pub struct CorrectionService {
    jobs: Arc<JobClient>,
    storage: Arc<dyn KvStorage>,
    policy: PollPolicy,
}

impl CorrectionService {
    pub fn new(jobs: Arc<JobClient>, storage: Arc<dyn KvStorage>, policy: PollPolicy) -> Self {
        Self {
            jobs,
            storage,
            policy,
        }
    }

    pub fn download_url(&self, job_id: &str) -> String {
        self.jobs.download_url(job_id)
    }

    /// Corrected content previously stored for this job
    pub async fn cached(&self, job_id: &str) -> Option<String> {
        match self.storage.get(job_id).await {
            Ok(value) => value,
            Err(e) => {
                warn!(job_id, error = %e, "Failed to read cached correction");
                None
            }
        }
    }

    /// One status check; the caller decides when to ask again
    pub async fn check(&self, job: &GrammarJob) -> Result<CorrectionState, CorrectionError> {
        if let Some(corrected) = self.cached(&job.job_id).await {
            return Ok(CorrectionState::Ready(correction(job, corrected, true)));
        }

        let status = self
            .jobs
            .job_status(Tool::GrammarCorrection, &job.job_id)
            .await?;
        if status != JobStatus::GrammarCompleted {
            debug!(job_id = %job.job_id, status = status.as_str(), "Correction pending");
            return Ok(CorrectionState::Pending { status });
        }

        Ok(CorrectionState::Ready(self.fetch(job).await?))
    }

    /// Poll until the job completes, then fetch and cache its output
    pub async fn resolve(&self, job: &GrammarJob) -> Result<Correction, CorrectionError> {
        if let Some(corrected) = self.cached(&job.job_id).await {
            return Ok(correction(job, corrected, true));
        }

        let jobs = &self.jobs;
        let job_id = job.job_id.as_str();
        poll_until(
            self.policy,
            job_id,
            move || jobs.job_status(Tool::GrammarCorrection, job_id),
            |status| *status == JobStatus::GrammarCompleted,
        )
        .await?;

        self.fetch(job).await
    }

    async fn fetch(&self, job: &GrammarJob) -> Result<Correction, CorrectionError> {
        let output = self
            .jobs
            .job_output(Tool::GrammarCorrection, &job.job_id)
            .await?;
        let corrected = output
            .into_text()
            .ok_or_else(|| CorrectionError::EmptyOutput(job.job_id.clone()))?;

        if let Err(e) = self.storage.set(&job.job_id, &corrected).await {
            warn!(job_id = %job.job_id, error = %e, "Failed to cache correction");
        }
        info!(job_id = %job.job_id, "Grammar correction resolved");

        Ok(correction(job, corrected, false))
    }
}

fn correction(job: &GrammarJob, corrected: String, cached: bool) -> Correction {
    Correction {
        job_id: job.job_id.clone(),
        view: DiffView::build(&job.original_content, &corrected, job.is_html),
        corrected,
        cached,
    }
}
