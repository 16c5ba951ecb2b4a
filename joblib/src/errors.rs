use crate::events::JobStatus;
use std::{result, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("no such job exists")]
    NotFound,
    #[error("job has not produced an artifact yet")]
    NotReady,
    #[error("job queue is full ({depth} jobs waiting)")]
    Capacity { depth: usize },
    #[error("invalid job parameters: {0}")]
    Validation(String),
    #[error("job cannot move from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("job did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("job coordinator exited")]
    CoordinatorExited,
}

pub type Result<T> = result::Result<T, JobError>;
