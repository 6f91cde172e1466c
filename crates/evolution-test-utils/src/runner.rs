use async_trait::async_trait;
use evolution_core::{BackgroundError, MemoryJob, MemoryJobRunner};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Runner that records jobs it is handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    jobs: Arc<Mutex<Vec<MemoryJob>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<MemoryJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl MemoryJobRunner for RecordingRunner {
    async fn run(&self, job: MemoryJob) -> Result<(), BackgroundError> {
        self.jobs.lock().push(job);
        Ok(())
    }
}

/// Runner whose jobs always fail, counting attempts.
#[derive(Debug, Clone, Default)]
pub struct FailingRunner {
    attempts: Arc<AtomicUsize>,
}

impl FailingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryJobRunner for FailingRunner {
    async fn run(&self, _job: MemoryJob) -> Result<(), BackgroundError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackgroundError::WorkerFailed {
            code: Some(1),
            stderr: "worker crashed".to_string(),
        })
    }
}

/// Runner that panics inside the job task.
#[derive(Debug, Clone, Default)]
pub struct PanickingRunner;

#[async_trait]
impl MemoryJobRunner for PanickingRunner {
    async fn run(&self, _job: MemoryJob) -> Result<(), BackgroundError> {
        panic!("memory worker panicked");
    }
}

/// Runner that holds each job for a fixed delay before recording it.
#[derive(Debug, Clone)]
pub struct SlowRunner {
    delay: Duration,
    completed: Arc<AtomicUsize>,
}

impl SlowRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryJobRunner for SlowRunner {
    async fn run(&self, _job: MemoryJob) -> Result<(), BackgroundError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
