use crate::config::WorkerConfig;
use crate::events::{Output, WorkerExit};
use crate::types::{JobId, JobParameters};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncRead, BufReader},
    process::{self, Child},
    select,
    sync::{mpsc, oneshot},
};

/// A started worker.
///
/// Whoever holds this owns the worker: `output` yields its lines, `exit` resolves once it is gone,
/// and sending on `kill` terminates it.
#[derive(Debug)]
pub struct WorkerSpawn {
    pub output: mpsc::UnboundedReceiver<Output>,
    pub exit: oneshot::Receiver<WorkerExit>,
    pub kill: oneshot::Sender<()>,
    /// Where the worker writes its artifact on success.
    pub artifact: PathBuf,
}

/// Starts the external generation worker for one job.
pub trait Invoker: Send + Sync + 'static {
    fn start(&self, job_id: JobId, parameters: &JobParameters) -> io::Result<WorkerSpawn>;
}

/// Runs the worker as a child process.
#[derive(Clone, Debug)]
pub struct ProcessInvoker {
    config: WorkerConfig,
}

impl ProcessInvoker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn artifact_path(&self, job_id: JobId) -> PathBuf {
        self.config.output_dir.join(format!("{}.dxf", job_id))
    }
}

impl Invoker for ProcessInvoker {
    fn start(&self, job_id: JobId, parameters: &JobParameters) -> io::Result<WorkerSpawn> {
        let artifact = self.artifact_path(job_id);
        let mut command = process::Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .args(parameters.to_args(&artifact))
            .envs(&self.config.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn()?;
        tracing::debug!(job_id = %job_id, pid = ?child.id(), program = %self.config.program, "worker spawned");

        let (output_tx, output) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            pipe_lines(stdout, output_tx.clone(), Output::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            pipe_lines(stderr, output_tx, Output::Stderr);
        }

        let (kill, kill_rx) = oneshot::channel();
        let (exit_tx, exit) = oneshot::channel();
        tokio::spawn(wait_for_exit(child, kill_rx, exit_tx));

        Ok(WorkerSpawn {
            output,
            exit,
            kill,
            artifact,
        })
    }
}

// forward each line of a child pipe until it closes
//
// the read end stays open until EOF even when nobody listens any more, otherwise the worker's next
// write fails with SIGPIPE
fn pipe_lines<R>(pipe: R, tx: mpsc::UnboundedSender<Output>, wrap: fn(String) -> Output)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => return,
                Ok(_) => {
                    if tx.send(wrap(decode_line(&buf))).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read worker output, discarding the rest");
                    break;
                }
            }
        }
        if let Err(err) = io::copy(&mut reader, &mut io::sink()).await {
            tracing::debug!(error = %err, "worker output pipe closed with an error");
        }
    });
}

// worker output is not guaranteed to be UTF-8, e.g. latin-1 street names
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}

async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<WorkerExit>,
) {
    let mut kill_rx = Some(kill_rx);
    let exit = loop {
        select! {
            requested = recv_kill(&mut kill_rx), if kill_rx.is_some() => {
                kill_rx = None;
                if requested {
                    if let Err(err) = child.start_kill() {
                        tracing::warn!(error = %err, "failed to signal worker");
                    }
                }
            }
            status = child.wait() => {
                break match status {
                    Ok(status) => match (status.code(), status.signal()) {
                        (Some(code), _) => WorkerExit::Exited { code },
                        (None, Some(signal)) => WorkerExit::Killed { signal },
                        (None, None) => WorkerExit::Lost("unknown exit status".to_string()),
                    },
                    Err(err) => WorkerExit::Lost(err.to_string()),
                };
            }
        }
    };
    let _ = exit_tx.send(exit);
}

// a dropped kill sender is not a kill request
async fn recv_kill(kill_rx: &mut Option<oneshot::Receiver<()>>) -> bool {
    match kill_rx {
        Some(rx) => rx.await.is_ok(),
        None => futures::future::pending().await,
    }
}
