//! Worker pool: N tasks sharing one intake, each racing the next item
//! against an idle timeout.

use crate::model::{TaskTiming, WorkerId};
use crate::telemetry::metrics::GroupInstruments;
use chrono::Utc;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Boxed future returned by a registered worker.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A registered task handler, invoked once per item.
pub type WorkerFn<W> = Arc<dyn Fn(WorkerId, W) -> BoxFuture + Send + Sync>;

/// A registered per-worker setup hook.
pub type InitializerFn = Arc<dyn Fn(WorkerId) + Send + Sync>;

/// Counters shared by every worker of a running group.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub processed: AtomicU64,
    pub panicked: AtomicU64,
    pub failed_initializers: AtomicU64,
    pub idle_timeouts: AtomicU64,
    pub active: AtomicUsize,
}

/// Everything a worker task needs. Shared behind an `Arc`; when the last
/// worker exits, the intake receiver and outtake sender go with it.
pub(crate) struct Pool<W> {
    pub group: String,
    pub intake: Mutex<mpsc::Receiver<W>>,
    pub outtake: Option<mpsc::Sender<W>>,
    pub monitor: Option<mpsc::Sender<TaskTiming>>,
    pub worker: WorkerFn<W>,
    pub initializer: Option<InitializerFn>,
    pub timeout: Duration,
    pub counters: Arc<Counters>,
    pub instruments: GroupInstruments,
}

impl<W: Clone + Send + 'static> Pool<W> {
    /// Spawn `workers` tasks into a fresh join set.
    pub fn spawn(self, workers: usize) -> JoinSet<()> {
        let pool = Arc::new(self);
        let mut set = JoinSet::new();
        for id in 0..workers {
            let pool = Arc::clone(&pool);
            set.spawn(async move { pool.run_worker(id).await });
        }
        set
    }

    async fn run_worker(&self, id: WorkerId) {
        self.counters.active.fetch_add(1, Ordering::Relaxed);
        debug!(group = %self.group, worker = id, "worker started");

        // Setup failures are contained; the worker still serves.
        if let Some(ref initialize) = self.initializer {
            if panic::catch_unwind(AssertUnwindSafe(|| initialize(id))).is_err() {
                self.counters.failed_initializers.fetch_add(1, Ordering::Relaxed);
                self.instruments.record_panic();
                error!(group = %self.group, worker = id, "initializer panicked, serving anyway");
            }
        }

        loop {
            let next = tokio::time::timeout(self.timeout, async {
                self.intake.lock().await.recv().await
            })
            .await;

            match next {
                Ok(Some(item)) => self.process(id, item).await,
                // Intake closed and drained: the only way out.
                Ok(None) => break,
                Err(_) => {
                    self.counters.idle_timeouts.fetch_add(1, Ordering::Relaxed);
                    self.instruments.record_idle_timeout();
                    warn!(
                        group = %self.group,
                        worker = id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "idle timeout: no work received"
                    );
                }
            }
        }

        let remaining = self.counters.active.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(group = %self.group, worker = id, remaining, "worker exited");
    }

    /// Run the worker on one item, then publish timing and forward the
    /// original item downstream.
    async fn process(&self, id: WorkerId, item: W) {
        let forward = self.outtake.as_ref().map(|_| item.clone());
        let worker = Arc::clone(&self.worker);

        let started = Instant::now();
        let outcome = tokio::spawn(async move { worker(id, item).await }).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(()) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                self.instruments.record_processed();
            }
            Err(e) => {
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                self.instruments.record_panic();
                error!(group = %self.group, worker = id, error = %e, "worker panicked");
            }
        }

        if let Some(ref monitor) = self.monitor {
            self.instruments.record_duration(elapsed);
            let timing = TaskTiming {
                group: self.group.clone(),
                worker: id,
                elapsed,
                finished_at: Utc::now(),
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = monitor.try_send(timing) {
                debug!(group = %self.group, worker = id, "monitor queue full, dropping timing");
            }
        }

        if let (Some(outtake), Some(item)) = (&self.outtake, forward) {
            if outtake.send(item).await.is_err() {
                debug!(group = %self.group, worker = id, "downstream gone, item not forwarded");
            }
        }
    }
}
