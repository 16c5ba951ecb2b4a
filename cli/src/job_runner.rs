use crate::arg_parser::OutputFormat;
use joblib::config::OrchestratorConfig;
use joblib::errors::JobError;
use joblib::types::{JobId, JobParameters};
use joblib::{JobApi, JobSnapshot, JobStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    Invalid { path: PathBuf, source: JobError },
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Read and validate one job parameter file.
pub fn load_params(path: &Path) -> Result<JobParameters, RunnerError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RunnerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parameters: JobParameters =
        serde_json::from_str(&contents).map_err(|source| RunnerError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    parameters
        .validate()
        .map_err(|source| RunnerError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parameters)
}

/// How one submitted job ended.
#[derive(Clone, Debug, Serialize)]
pub struct JobOutcome {
    pub file: PathBuf,
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub artifact: Option<PathBuf>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[derive(Serialize)]
struct ProgressLine<'a> {
    job_id: JobId,
    #[serde(flatten)]
    snapshot: &'a JobSnapshot,
}

/// Drives an in-process orchestrator: submits jobs, prints their progress and collects outcomes.
pub struct JobRunner {
    api: JobApi,
    format: OutputFormat,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn launch(config: &OrchestratorConfig, format: OutputFormat) -> Self {
        let shutdown = CancellationToken::new();
        let api = JobApi::launch(config, shutdown.clone());
        Self {
            api,
            format,
            shutdown,
        }
    }

    /// Submit every job in order, then follow them all until they finish.
    pub async fn run(
        &self,
        jobs: Vec<(PathBuf, JobParameters)>,
        timeout: Option<Duration>,
    ) -> Result<Vec<JobOutcome>, RunnerError> {
        let mut submitted = Vec::with_capacity(jobs.len());
        for (file, parameters) in jobs {
            let created = self.api.create(parameters).await?;
            tracing::info!(job_id = %created.job_id, file = %file.display(), status = %created.status, "job submitted");
            submitted.push((file, created.job_id));
        }

        let mut followers = Vec::with_capacity(submitted.len());
        for (file, job_id) in submitted {
            let api = self.api.clone();
            let format = self.format;
            followers.push(tokio::spawn(async move {
                follow(api, file, job_id, timeout, format).await
            }));
        }

        let mut outcomes = Vec::with_capacity(followers.len());
        for follower in followers {
            match follower.await {
                Ok(outcome) => outcomes.push(outcome?),
                Err(err) => tracing::error!(error = %err, "job follower panicked"),
            }
        }
        Ok(outcomes)
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn follow(
    api: JobApi,
    file: PathBuf,
    job_id: JobId,
    timeout: Option<Duration>,
    format: OutputFormat,
) -> Result<JobOutcome, RunnerError> {
    let mut stream = api.stream(job_id).await?;
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = stream.next().await {
            print_progress(job_id, &snapshot, format);
        }
    });

    let last = match api.await_terminal(job_id, timeout).await {
        Ok(snapshot) => snapshot,
        Err(JobError::TimedOut(limit)) => {
            tracing::warn!(job_id = %job_id, timeout = ?limit, "job timed out");
            api.await_terminal(job_id, None).await?
        }
        Err(err) => return Err(err.into()),
    };
    let _ = printer.await;

    Ok(JobOutcome {
        file,
        job_id,
        status: last.status,
        message: last.message,
        artifact: api.artifact(job_id).ok(),
    })
}

fn print_progress(job_id: JobId, snapshot: &JobSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!(
            "[{}] {:>9} {:>3}% {}",
            short_id(job_id),
            snapshot.status,
            snapshot.progress,
            snapshot.message
        ),
        OutputFormat::Json => match serde_json::to_string(&ProgressLine { job_id, snapshot }) {
            Ok(line) => println!("{}", line),
            Err(err) => tracing::warn!(error = %err, "failed to encode progress"),
        },
    }
}

pub fn print_summary(outcomes: &[JobOutcome], format: OutputFormat) {
    for outcome in outcomes {
        match format {
            OutputFormat::Text => {
                let detail = match &outcome.artifact {
                    Some(path) => path.display().to_string(),
                    None => outcome.message.clone(),
                };
                println!(
                    "{} {} {}: {}",
                    outcome.file.display(),
                    short_id(outcome.job_id),
                    outcome.status,
                    detail
                );
            }
            OutputFormat::Json => match serde_json::to_string(outcome) {
                Ok(line) => println!("{}", line),
                Err(err) => tracing::warn!(error = %err, "failed to encode outcome"),
            },
        }
    }
}

fn short_id(job_id: JobId) -> String {
    job_id.to_simple().to_string()[..8].to_string()
}
