#![allow(dead_code)]

use joblib::config::SchedulerConfig;
use joblib::invoker::{Invoker, WorkerSpawn};
use joblib::store::{InMemoryJobStore, JobStore};
use joblib::types::{JobId, JobParameters};
use joblib::{JobApi, JobCoordinator, JobSnapshot, JobStatus, Output, WorkerExit};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// The test's end of a scripted worker.
pub struct WorkerControl {
    output: Option<mpsc::UnboundedSender<Output>>,
    exit: Option<oneshot::Sender<WorkerExit>>,
    kills: Arc<AtomicUsize>,
}

impl WorkerControl {
    pub fn stdout(&self, line: &str) {
        if let Some(output) = &self.output {
            let _ = output.send(Output::Stdout(line.to_string()));
        }
    }

    pub fn stderr(&self, line: &str) {
        if let Some(output) = &self.output {
            let _ = output.send(Output::Stderr(line.to_string()));
        }
    }

    pub fn progress(&self, status: &str, progress: u8) {
        self.stdout(&format!(
            r#"{{"status": "{}", "progress": {}}}"#,
            status, progress
        ));
    }

    fn finish(&mut self, exit: WorkerExit) {
        self.output.take();
        if let Some(tx) = self.exit.take() {
            let _ = tx.send(exit);
        }
    }

    pub fn exit(&mut self, code: i32) {
        self.finish(WorkerExit::Exited { code });
    }

    pub fn die(&mut self, signal: i32) {
        self.finish(WorkerExit::Killed { signal });
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub async fn wait_killed(&self) {
        let kills = self.kills.clone();
        wait_until(move || kills.load(Ordering::SeqCst) > 0).await;
    }
}

/// An invoker whose workers are driven by the test.
#[derive(Default)]
pub struct ScriptedInvoker {
    started: Mutex<Vec<JobId>>,
    controls: Mutex<HashMap<JobId, WorkerControl>>,
    fail_spawns: AtomicBool,
}

impl ScriptedInvoker {
    pub fn fail_spawns(&self, fail: bool) {
        self.fail_spawns.store(fail, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<JobId> {
        self.started.lock().unwrap().clone()
    }

    pub fn control(&self, job_id: JobId) -> WorkerControl {
        self.controls
            .lock()
            .unwrap()
            .remove(&job_id)
            .expect("worker was never started")
    }
}

impl Invoker for ScriptedInvoker {
    fn start(&self, job_id: JobId, _parameters: &JobParameters) -> io::Result<WorkerSpawn> {
        if self.fail_spawns.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "worker binary missing",
            ));
        }
        let (output_tx, output) = mpsc::unbounded_channel();
        let (exit_tx, exit) = oneshot::channel();
        let (kill, kill_rx) = oneshot::channel::<()>();
        let kills = Arc::new(AtomicUsize::new(0));
        let counter = kills.clone();
        tokio::spawn(async move {
            if kill_rx.await.is_ok() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        self.started.lock().unwrap().push(job_id);
        self.controls.lock().unwrap().insert(
            job_id,
            WorkerControl {
                output: Some(output_tx),
                exit: Some(exit_tx),
                kills,
            },
        );
        Ok(WorkerSpawn {
            output,
            exit,
            kill,
            artifact: PathBuf::from(format!("/exports/{}.dxf", job_id)),
        })
    }
}

pub struct Harness {
    pub api: JobApi,
    pub store: Arc<dyn JobStore>,
    pub invoker: Arc<ScriptedInvoker>,
}

impl Harness {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self::with_config(SchedulerConfig {
            max_concurrent_jobs,
            ..SchedulerConfig::default()
        })
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryJobStore::new()))
    }

    pub fn with_store(config: SchedulerConfig, store: Arc<dyn JobStore>) -> Self {
        let invoker = Arc::new(ScriptedInvoker::default());
        let coordinator = JobCoordinator::spawn(config, store.clone(), invoker.clone());
        Self {
            api: JobApi::new(coordinator, store.clone()),
            store,
            invoker,
        }
    }

    pub async fn submit(&self) -> JobId {
        self.api
            .create(params())
            .await
            .expect("job create err")
            .job_id
    }

    pub fn status(&self, job_id: JobId) -> JobSnapshot {
        self.api.status(job_id).expect("job vanished")
    }

    pub async fn wait_for(&self, job_id: JobId, status: JobStatus) -> JobSnapshot {
        let api = self.api.clone();
        wait_until(move || api.status(job_id).map(|s| s.status == status).unwrap_or(false)).await;
        self.status(job_id)
    }

    pub async fn wait_for_progress(&self, job_id: JobId, progress: u8) {
        let api = self.api.clone();
        wait_until(move || {
            api.status(job_id)
                .map(|s| s.progress >= progress)
                .unwrap_or(false)
        })
        .await;
    }

    pub fn running_count(&self) -> usize {
        self.store
            .list(usize::MAX)
            .iter()
            .filter(|job| job.status == JobStatus::Running)
            .count()
    }
}

pub fn params() -> JobParameters {
    JobParameters::circle(-22.9, -43.2, 750.0)
}

pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
