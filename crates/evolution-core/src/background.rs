//! Background memory processing: a bounded queue feeding isolated worker processes.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Subcommand that runs the worker side in a child process.
pub const MEMORY_WORKER_COMMAND: &str = "memory-worker";
const MAX_STDERR_LOG_CHARS: usize = 4000;

/// One completed exchange to mine for memories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryJob {
    pub user_input: String,
    pub agent_response: String,
}

/// Errors raised while processing memory jobs.
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),
    #[error("worker io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid job payload: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("worker timed out after {0} seconds")]
    Timeout(u64),
    #[error("worker exited with status {code:?}: {stderr}")]
    WorkerFailed { code: Option<i32>, stderr: String },
    #[error("fact extraction failed: {0}")]
    Extraction(String),
    #[error("memory error: {0}")]
    Memory(String),
}

/// Outcome of handing a job to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    /// The response was empty or whitespace only.
    SkippedEmpty,
    /// The queue was full or already shut down.
    Dropped,
}

/// Executes one memory job.
#[async_trait]
pub trait MemoryJobRunner: Send + Sync {
    async fn run(&self, job: MemoryJob) -> Result<(), BackgroundError>;
}

/// Runs each job in a fresh child process fed through stdin.
#[derive(Debug, Clone)]
pub struct ProcessJobRunner {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessJobRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Re-run the current executable with the worker subcommand, after `leading_args`.
    pub fn current_exe(
        leading_args: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, BackgroundError> {
        let program = std::env::current_exe()?;
        let mut args = leading_args;
        args.push(MEMORY_WORKER_COMMAND.to_string());
        Ok(Self::new(program, args, timeout))
    }
}

#[async_trait]
impl MemoryJobRunner for ProcessJobRunner {
    async fn run(&self, job: MemoryJob) -> Result<(), BackgroundError> {
        let payload = serde_json::to_vec(&job)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(BackgroundError::Spawn)?;
        debug!(
            "spawned memory worker (pid={:?}, payload_len={})",
            child.id(),
            payload.len()
        );

        if let Some(mut stdin) = child.stdin.take() {
            let written = match stdin.write_all(&payload).await {
                Ok(()) => stdin.shutdown().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                warn!(
                    "failed to send job to memory worker (pid={:?}, err={})",
                    child.id(),
                    err
                );
                if let Err(kill_err) = child.kill().await {
                    debug!("failed to kill memory worker (err={})", kill_err);
                }
                return Err(BackgroundError::Io(err));
            }
        }
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                if let Err(err) = stderr.read_to_string(&mut buf).await {
                    debug!("failed to capture memory worker stderr (err={})", err);
                }
                buf
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                if let Err(err) = child.kill().await {
                    debug!("failed to kill memory worker (err={})", err);
                }
                return Err(BackgroundError::Timeout(self.timeout.as_secs()));
            }
        };
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            let stderr: String = stderr.chars().take(MAX_STDERR_LOG_CHARS).collect();
            return Err(BackgroundError::WorkerFailed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        debug!("memory worker finished (status={:?})", status.code());
        Ok(())
    }
}

/// Hands completed exchanges to a runner without blocking the caller.
pub struct BackgroundMemoryProcessor {
    sender: Mutex<Option<mpsc::Sender<MemoryJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundMemoryProcessor {
    /// Spawn the worker loop; `capacity` bounds the pending queue.
    pub fn start(runner: Arc<dyn MemoryJobRunner>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(worker_loop(runner, receiver));
        info!("started background memory processor (capacity={})", capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue an exchange for memory processing. Never blocks and never fails.
    pub fn dispatch(&self, user_input: &str, agent_response: &str) -> Dispatch {
        if agent_response.trim().is_empty() {
            debug!("skipping memory job for empty response");
            return Dispatch::SkippedEmpty;
        }
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            warn!("memory job dropped (reason=shutdown)");
            return Dispatch::Dropped;
        };
        let job = MemoryJob {
            user_input: user_input.to_string(),
            agent_response: agent_response.to_string(),
        };
        match sender.try_send(job) {
            Ok(()) => {
                debug!(
                    "queued memory job (input_len={}, response_len={})",
                    user_input.len(),
                    agent_response.len()
                );
                Dispatch::Queued
            }
            Err(TrySendError::Full(_)) => {
                warn!("memory job dropped (reason=queue_full)");
                Dispatch::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                warn!("memory job dropped (reason=closed)");
                Dispatch::Dropped
            }
        }
    }

    /// Close the queue and wait up to `grace` for pending jobs.
    ///
    /// Jobs still running after `grace` are abandoned; worker processes that
    /// were already spawned keep running on their own.
    pub async fn shutdown(&self, grace: Duration) {
        self.sender.lock().take();
        let Some(mut worker) = self.worker.lock().take() else {
            return;
        };
        match tokio::time::timeout(grace, &mut worker).await {
            Ok(Ok(())) => info!("background memory processor stopped"),
            Ok(Err(err)) => error!("background memory processor failed (err={})", err),
            Err(_) => {
                warn!(
                    "background memory processor shutdown timed out (grace_secs={})",
                    grace.as_secs()
                );
                worker.abort();
            }
        }
    }
}

async fn worker_loop(runner: Arc<dyn MemoryJobRunner>, mut receiver: mpsc::Receiver<MemoryJob>) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    let runner = runner.clone();
                    tasks.spawn(async move { runner.run(job).await });
                }
                None => break,
            },
            Some(result) = tasks.join_next(), if !tasks.is_empty() => log_job_result(result),
        }
    }
    while let Some(result) = tasks.join_next().await {
        log_job_result(result);
    }
}

fn log_job_result(result: Result<Result<(), BackgroundError>, JoinError>) {
    match result {
        Ok(Ok(())) => debug!("memory job completed"),
        Ok(Err(err)) => warn!("memory job failed (err={})", err),
        Err(err) if err.is_panic() => error!("memory job panicked (err={})", err),
        Err(err) => warn!("memory job cancelled (err={})", err),
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryJob, ProcessJobRunner};
    use pretty_assertions::assert_eq;

    #[test]
    fn jobs_round_trip_through_json() {
        let job = MemoryJob {
            user_input: "my server runs Ubuntu".to_string(),
            agent_response: "Noted.".to_string(),
        };
        let encoded = serde_json::to_string(&job).expect("encode");
        assert_eq!(
            encoded,
            r#"{"user_input":"my server runs Ubuntu","agent_response":"Noted."}"#
        );
    }

    #[test]
    fn current_exe_appends_worker_subcommand() {
        let runner = ProcessJobRunner::current_exe(
            vec!["--config".to_string(), "x.json5".to_string()],
            std::time::Duration::from_secs(1),
        )
        .expect("runner");
        assert_eq!(runner.args, vec!["--config", "x.json5", "memory-worker"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_reports_failures_with_stderr() {
        use super::{BackgroundError, MemoryJobRunner};
        let runner = ProcessJobRunner::new(
            "sh",
            vec!["-c".to_string(), "cat >/dev/null; echo broken >&2; exit 3".to_string()],
            std::time::Duration::from_secs(5),
        );
        let job = MemoryJob {
            user_input: "a".to_string(),
            agent_response: "b".to_string(),
        };
        let err = runner.run(job).await.unwrap_err();
        match err {
            BackgroundError::WorkerFailed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn process_runner_reaps_worker_that_closes_stdin() {
        use super::{BackgroundError, MemoryJobRunner};
        let temp = tempfile::tempdir().expect("tempdir");
        let pid_file = temp.path().join("worker.pid");
        // The worker closes stdin and keeps running, so the write fails.
        let runner = ProcessJobRunner::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("echo $$ > {}; exec 0<&-; sleep 30", pid_file.display()),
            ],
            std::time::Duration::from_secs(60),
        );
        let job = MemoryJob {
            user_input: "x".to_string(),
            agent_response: "y".repeat(4 * 1024 * 1024),
        };
        let err = runner.run(job).await.unwrap_err();
        assert!(matches!(err, BackgroundError::Io(_)));

        let pid = std::fs::read_to_string(&pid_file).expect("pid");
        let proc_dir = std::path::Path::new("/proc").join(pid.trim());
        assert!(!proc_dir.exists(), "worker {} still present", pid.trim());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_feeds_job_on_stdin() {
        use super::MemoryJobRunner;
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("job.json");
        let runner = ProcessJobRunner::new(
            "sh",
            vec!["-c".to_string(), format!("cat > {}", out.display())],
            std::time::Duration::from_secs(5),
        );
        let job = MemoryJob {
            user_input: "hi".to_string(),
            agent_response: "hello".to_string(),
        };
        runner.run(job.clone()).await.expect("run");
        let written: MemoryJob =
            serde_json::from_slice(&std::fs::read(out).expect("read")).expect("decode");
        assert_eq!(written, job);
    }
}
