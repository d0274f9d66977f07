use async_trait::async_trait;
use busline_core::CoreError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(#[from] CoreError),

    #[error("job panicked")]
    Panicked,
}

/// Periodic background work.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<(), CoreError>;
}

/// Run one invocation on its own task so a panic is contained and reported
/// instead of unwinding through the scheduler.
pub async fn run_once(job: Arc<dyn ScheduledJob>) -> Result<(), JobError> {
    let task = job.clone();
    match tokio::spawn(async move { task.run().await }).await {
        Ok(result) => result.map_err(JobError::from),
        Err(e) if e.is_panic() => Err(JobError::Panicked),
        Err(e) => Err(JobError::Failed(CoreError::Transient(e.to_string()))),
    }
}

/// Owns the background loops and stops them together.
pub struct JobScheduler {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn spawn(&mut self, job: Arc<dyn ScheduledJob>) {
        let token = self.shutdown.child_token();
        let name = job.name();
        let period = job.interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(job = name, interval_secs = period.as_secs(), "Background job started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match run_once(job.clone()).await {
                            Ok(()) => debug!(job = name, "Job run finished"),
                            Err(e) => error!(job = name, error = %e, "Job run failed"),
                        }
                    }
                }
            }
            info!(job = name, "Background job stopped");
        });
        self.handles.push(handle);
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Background job task ended abnormally");
            }
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Exploding;

    #[async_trait]
    impl ScheduledJob for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> Result<(), CoreError> {
            panic!("boom");
        }
    }

    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ScheduledJob for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> Result<(), CoreError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Transient("storage down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_panic_is_reported_not_propagated() {
        let result = run_once(Arc::new(Exploding)).await;
        assert!(matches!(result, Err(JobError::Panicked)));
    }

    #[tokio::test]
    async fn test_loop_survives_failures_and_stops_on_shutdown() {
        let job = Arc::new(Counting::default());
        let mut scheduler = JobScheduler::new();
        scheduler.spawn(job.clone());
        scheduler.spawn(Arc::new(Exploding));

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;

        let runs = job.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected repeated runs, got {}", runs);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs);
    }
}
