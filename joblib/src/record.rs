use crate::errors::{JobError, Result};
use crate::events::{JobSnapshot, JobStatus};
use crate::protocol::{parse_line, LogLine};
use crate::types::{JobId, JobParameters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub line: String,
}

/// The authoritative state of one job.
///
/// The record is plain data: the live worker process is owned by the job's supervisor, never by
/// the record. All lifecycle changes go through the methods below so that a record can never
/// regress or change after reaching a terminal state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub log_lines: Vec<LogEntry>,
    pub parameters: JobParameters,
    pub output_artifact_path: Option<PathBuf>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, parameters: JobParameters) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            message: "Queued".to_string(),
            log_lines: Vec::new(),
            parameters,
            output_artifact_path: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Admission: `Pending -> Running`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.message = "Worker started".to_string();
        Ok(())
    }

    /// Apply one line of worker output. Returns false if the line was ignored.
    ///
    /// stdout lines may carry a structured status/progress update, stderr lines are only logged.
    /// Blank lines are logged too, they count as a sign of life.
    pub fn record_output(&mut self, level: LogLevel, line: &str) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        if level == LogLevel::Info && !line.trim().is_empty() {
            match parse_line(line) {
                LogLine::Structured { status, progress } => {
                    if let Some(status) = status {
                        self.message = status;
                    }
                    if let Some(progress) = progress {
                        self.progress = self.progress.max(progress);
                    }
                }
                LogLine::Raw(text) => self.message = text,
            }
        }
        self.log_lines.push(LogEntry {
            at: Utc::now(),
            level,
            line: line.trim_end().to_string(),
        });
        self.touch();
        true
    }

    pub fn complete(&mut self, artifact: PathBuf) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.message = format!("DXF export complete: {}", artifact.display());
        self.output_artifact_path = Some(artifact);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Error)?;
        self.message = message.into();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transition(JobStatus::Cancelled)?;
        self.message = "Cancelled".to_string();
        Ok(())
    }

    /// Flag the job for cancellation. Returns false if the job already finished.
    pub fn request_cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.cancel_requested = true;
        true
    }
}
