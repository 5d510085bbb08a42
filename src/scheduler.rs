/// Self-rescheduling periodic jobs
///
/// Every job runs in its own tokio task. A run returns the delay before the
/// next run, so a job picks its own cadence. Rescheduling stops the running
/// loop, waits for an in-flight run to finish, and starts a fresh loop.
use futures_util::future::BoxFuture;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    VoltageMonitor,
    TemperatureMonitor,
    StatusNotify,
}

impl Job {
    pub const ALL: [Job; 3] = [
        Job::VoltageMonitor,
        Job::TemperatureMonitor,
        Job::StatusNotify,
    ];
}

/// One run of a job, resolving to the delay before the next run
pub type TaskBody = Arc<dyn Fn() -> BoxFuture<'static, Duration> + Send + Sync>;

struct RunningTask {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

struct PeriodicTask {
    body: TaskBody,
    running: Mutex<Option<RunningTask>>,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: HashMap<Job, PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Job, body: TaskBody) {
        self.tasks.insert(
            job,
            PeriodicTask {
                body,
                running: Mutex::new(None),
            },
        );
    }

    /// Run `job` after `delay`, replacing any pending run
    ///
    /// # Returns
    /// false when the job was never registered
    pub async fn schedule(&self, job: Job, delay: Duration) -> bool {
        let Some(task) = self.tasks.get(&job) else {
            warn!("{:?} is not registered", job);
            return false;
        };

        let mut running = task.running.lock().await;
        if let Some(previous) = running.take() {
            stop_task(job, previous).await;
        }

        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(run_periodic(
            job,
            Arc::clone(&task.body),
            Arc::clone(&stop),
            delay,
        ));
        debug!("{:?} scheduled in {:?}", job, delay);
        *running = Some(RunningTask { stop, handle });
        true
    }

    /// Stop `job`, waiting for a run in progress
    ///
    /// # Returns
    /// true when the job had been scheduled
    pub async fn cancel(&self, job: Job) -> bool {
        let Some(task) = self.tasks.get(&job) else {
            return false;
        };

        let previous = task.running.lock().await.take();
        match previous {
            Some(previous) => {
                stop_task(job, previous).await;
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        for job in Job::ALL {
            self.cancel(job).await;
        }
    }

    pub async fn is_scheduled(&self, job: Job) -> bool {
        match self.tasks.get(&job) {
            Some(task) => task
                .running
                .lock()
                .await
                .as_ref()
                .is_some_and(|running| !running.handle.is_finished()),
            None => false,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.values_mut() {
            if let Some(running) = task.running.get_mut().take() {
                running.handle.abort();
            }
        }
    }
}

async fn stop_task(job: Job, task: RunningTask) {
    // A stored permit stops the loop at its next wait
    task.stop.notify_one();
    if let Err(e) = task.handle.await {
        if !e.is_cancelled() {
            error!("{:?} task failed: {}", job, e);
        }
    }
}

async fn run_periodic(job: Job, body: TaskBody, stop: Arc<Notify>, mut delay: Duration) {
    loop {
        tokio::select! {
            biased;
            _ = stop.notified() => break,
            _ = sleep(delay) => {}
        }

        delay = body().await;
        debug!("{:?} next run in {:?}", job, delay);
    }
    debug!("{:?} stopped", job);
}
