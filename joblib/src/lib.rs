//! Asynchronous orchestration of DXF export jobs.
//!
//! Jobs are submitted to a coordinator which runs at most `max_concurrent_jobs` external worker
//! processes at a time, admitting the rest in submission order as slots free up. Each running job
//! is supervised by its own task, which turns worker output into record updates and progress
//! snapshots. A periodic garbage collector drops old finished jobs and kills stalled ones.

mod actors;
pub mod api;
pub mod config;
pub mod errors;
mod events;
pub mod gc;
pub mod invoker;
pub mod protocol;
pub mod record;
pub mod store;
pub mod types;

// re-export the job coord handle as if it is the job coordinator itself.
pub use actors::coordinator::JobCoordinatorHandle as JobCoordinator;
pub use actors::coordinator::{CancelOutcome, SchedulerStats};
pub use api::{CancelAccepted, JobApi, JobCreated, ProgressStream};
pub use events::{JobSnapshot, JobStatus, Output, WorkerExit};
