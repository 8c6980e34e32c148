//! The work group: construction, one-time configuration, and start.

use crate::config::{Options, Parallelism};
use crate::error::{Error, Result, Slot};
use crate::model::{State, Summary, TaskTiming, WorkerId};
use crate::source::{Sink, Source};
use crate::telemetry::group::{record_state_transition, start_group_span};
use crate::telemetry::metrics::GroupInstruments;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{Instrument, debug, error, info, warn};

use super::drain;
use super::pool::{BoxFuture, Counters, InitializerFn, Pool, WorkerFn};

/// Process-wide sequence used to tell groups apart in diagnostics.
static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

/// Outtake queue, created the first time another group drains this one.
struct Outtake<W> {
    tx: mpsc::Sender<W>,
    rx: Mutex<Option<mpsc::Receiver<W>>>,
}

/// A pool of workers fed by one [`Source`].
///
/// Configure it with [`with`](Self::with) (mandatory), [`drain`](Self::drain)
/// (mandatory) and [`configure`](Self::configure) (optional), then
/// [`start`](Self::start) it. Each slot accepts exactly one registration;
/// later calls are rejected with [`Error::AlreadyConfigured`] and the first
/// registration stays in effect. Configuration takes `&self`, so it is safe
/// from several threads before start.
///
/// A group is itself a [`Source`]: draining one group from another chains
/// them, and every item the upstream group processes is passed on, unchanged,
/// to the downstream group. Only the outer-most group is started by hand.
pub struct WorkGroup<W> {
    name: String,
    options: Options,
    intake_tx: mpsc::Sender<W>,
    intake_rx: tokio::sync::Mutex<mpsc::Receiver<W>>,
    worker: OnceLock<WorkerFn<W>>,
    initializer: OnceLock<InitializerFn>,
    source: OnceLock<Mutex<Box<dyn Source<W>>>>,
    outtake: OnceLock<Outtake<W>>,
    monitor_tx: Option<mpsc::Sender<TaskTiming>>,
    monitor_rx: Mutex<Option<mpsc::Receiver<TaskTiming>>>,
}

impl<W> std::fmt::Debug for WorkGroup<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkGroup")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("worker", &self.worker.get().is_some())
            .field("initializer", &self.initializer.get().is_some())
            .field("source", &self.source.get().is_some())
            .field("chained", &self.outtake.get().is_some())
            .finish()
    }
}

impl<W> std::fmt::Display for WorkGroup<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl<W: Clone + Send + 'static> WorkGroup<W> {
    /// Create a group, normalizing `options` against the host's parallelism.
    pub fn new(options: Options) -> Self {
        Self::with_parallelism(options, Parallelism::host())
    }

    /// Create a group, normalizing `options` against an explicit parallelism.
    pub fn with_parallelism(options: Options, parallelism: Parallelism) -> Self {
        let options = options.normalize(parallelism);
        let seq = NEXT_GROUP.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}/{}/{}", options.name, seq, options.workers);

        let (intake_tx, intake_rx) = mpsc::channel(1);
        let (monitor_tx, monitor_rx) = if options.timing {
            let (tx, rx) = mpsc::channel(options.monitor_capacity);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        Self {
            name,
            options,
            intake_tx,
            intake_rx: tokio::sync::Mutex::new(intake_rx),
            worker: OnceLock::new(),
            initializer: OnceLock::new(),
            source: OnceLock::new(),
            outtake: OnceLock::new(),
            monitor_tx,
            monitor_rx: Mutex::new(monitor_rx),
        }
    }

    /// A group with `workers` concurrent workers.
    pub fn fan_out(workers: usize) -> Self {
        Self::fan_out_named(workers, "")
    }

    /// A named group with `workers` concurrent workers.
    pub fn fan_out_named(workers: usize, name: impl Into<String>) -> Self {
        if workers == 1 {
            warn!("it is not really a fan-out with only one worker");
        }
        Self::new(Options::workers(workers).name(name))
    }

    /// A single-worker group, for aggregating what upstream groups produce.
    pub fn fan_in() -> Self {
        Self::fan_in_with(Options::default())
    }

    /// A single-worker group. The worker count in `options` is ignored.
    pub fn fan_in_with(options: Options) -> Self {
        Self::new(Options {
            workers: 1,
            ..options
        })
    }

    /// Diagnostic name: `{name}/{sequence}/{workers}`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// `Configured` once both a worker and a source are registered.
    pub fn state(&self) -> State {
        if self.worker.get().is_some() && self.source.get().is_some() {
            State::Configured
        } else {
            State::Created
        }
    }

    /// Register a hook run once by each worker before it takes any work.
    pub fn configure<F>(&self, initializer: F) -> Result<&Self>
    where
        F: Fn(WorkerId) + Send + Sync + 'static,
    {
        let initializer: InitializerFn = Arc::new(initializer);
        self.set_once(&self.initializer, initializer, Slot::Initializer)
    }

    /// Register the async task handler, invoked once per item.
    pub fn with<F, Fut>(&self, handler: F) -> Result<&Self>
    where
        F: Fn(WorkerId, W) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let worker: WorkerFn<W> =
            Arc::new(move |id: WorkerId, item: W| -> BoxFuture { Box::pin(handler(id, item)) });
        self.set_once(&self.worker, worker, Slot::Worker)
    }

    /// Register a synchronous task handler. Each invocation runs on tokio's
    /// blocking pool, so it may sleep or do blocking I/O.
    pub fn with_blocking<F>(&self, handler: F) -> Result<&Self>
    where
        F: Fn(WorkerId, W) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let worker: WorkerFn<W> = Arc::new(move |id: WorkerId, item: W| -> BoxFuture {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                if let Err(e) = tokio::task::spawn_blocking(move || handler(id, item)).await {
                    if e.is_panic() {
                        std::panic::resume_unwind(e.into_panic());
                    }
                }
            })
        });
        self.set_once(&self.worker, worker, Slot::Worker)
    }

    /// Wire the intake to an upstream source.
    ///
    /// Draining another `WorkGroup` gives that group an outtake, so that
    /// everything it processes flows into this one.
    pub fn drain<S: Source<W>>(&self, mut source: S) -> Result<&Self> {
        if self.source.get().is_some() {
            return Err(self.already(Slot::Source));
        }
        source.attach();
        let source: Box<dyn Source<W>> = Box::new(source);
        self.set_once(&self.source, Mutex::new(source), Slot::Source)
    }

    /// Take the receiving end of the monitor queue.
    ///
    /// `None` when timing is disabled or the receiver was already taken.
    /// Measurements are dropped, never waited on, if the queue is full.
    pub fn take_monitor(&self) -> Option<mpsc::Receiver<TaskTiming>> {
        self.monitor_rx.lock().ok()?.take()
    }

    /// Run the group to completion.
    ///
    /// Spawns the workers, drains the source into them, closes the intake
    /// when the source is exhausted, joins every worker, and finally closes
    /// the outtake if a downstream group is attached. Chained upstream
    /// groups are started from here too.
    pub async fn start(self) -> Result<Summary> {
        let WorkGroup {
            name,
            options,
            intake_tx,
            intake_rx,
            worker,
            initializer,
            source,
            outtake,
            monitor_tx,
            monitor_rx: _,
        } = self;

        let worker = worker.into_inner().ok_or_else(|| Error::MissingWorker {
            group: name.clone(),
        })?;
        let source = source
            .into_inner()
            .ok_or_else(|| Error::MissingSource {
                group: name.clone(),
            })?
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let outtake = outtake.into_inner().map(|o| o.tx);

        let span = start_group_span(&name, options.workers);
        let started = Instant::now();
        let counters = Arc::new(Counters::default());

        async {
            let pool = Pool {
                group: name.clone(),
                intake: intake_rx,
                outtake: outtake.clone(),
                monitor: monitor_tx,
                worker,
                initializer: initializer.into_inner(),
                timeout: options.timeout,
                counters: Arc::clone(&counters),
                instruments: GroupInstruments::new(&name),
            };
            let mut workers = pool.spawn(options.workers);
            record_state_transition(&span, State::Configured, State::Running);

            record_state_transition(&span, State::Running, State::Draining);
            let (received, outcome) = drain::relay(&name, source, intake_tx).await;

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(group = %name, error = %e, "worker task failed");
                }
            }
            record_state_transition(&span, State::Draining, State::Completed);

            if let Some(outtake) = outtake {
                drop(outtake);
                record_state_transition(&span, State::Completed, State::Closed);
            }

            let summary = Summary {
                group: name.clone(),
                workers: options.workers,
                received,
                processed: counters.processed.load(Ordering::Relaxed),
                panicked: counters.panicked.load(Ordering::Relaxed),
                failed_initializers: counters.failed_initializers.load(Ordering::Relaxed),
                idle_timeouts: counters.idle_timeouts.load(Ordering::Relaxed),
                elapsed: started.elapsed(),
            };
            info!(
                group = %name,
                received = summary.received,
                processed = summary.processed,
                panicked = summary.panicked,
                failed_initializers = summary.failed_initializers,
                idle_timeouts = summary.idle_timeouts,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "group completed"
            );

            outcome.map(|()| summary)
        }
        .instrument(span.clone())
        .await
    }

    /// Create the outtake queue, once.
    fn enable_pump(&self) -> &Outtake<W> {
        self.outtake.get_or_init(|| {
            debug!(group = %self.name, "outtake enabled");
            let (tx, rx) = mpsc::channel(1);
            Outtake {
                tx,
                rx: Mutex::new(Some(rx)),
            }
        })
    }

    fn set_once<T>(&self, slot: &OnceLock<T>, value: T, which: Slot) -> Result<&Self> {
        slot.set(value).map_err(|_| self.already(which))?;
        Ok(self)
    }

    fn already(&self, slot: Slot) -> Error {
        debug!(group = %self.name, %slot, "ignoring repeated registration");
        Error::AlreadyConfigured {
            group: self.name.clone(),
            slot,
        }
    }
}

#[async_trait]
impl<W: Clone + Send + 'static> Source<W> for WorkGroup<W> {
    fn attach(&mut self) {
        self.enable_pump();
    }

    /// Start this group in the background and relay its outtake into `sink`
    /// until the group closes it.
    async fn pump(self: Box<Self>, sink: Sink<W>) -> Result<()> {
        let receiver = self
            .enable_pump()
            .rx
            .lock()
            .ok()
            .and_then(|mut rx| rx.take());
        let name = self.name.clone();
        let upstream = tokio::spawn((*self).start());

        if let Some(mut receiver) = receiver {
            while let Some(item) = receiver.recv().await {
                if !sink.send(item).await {
                    debug!(group = %name, "downstream gone, stopping relay");
                    break;
                }
            }
        }

        upstream_outcome(&name, upstream.await)
    }
}

fn upstream_outcome(
    group: &str,
    joined: std::result::Result<Result<Summary>, JoinError>,
) -> Result<()> {
    match joined {
        Ok(Ok(_summary)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(e) => {
            error!(group, error = %e, "upstream group panicked");
            Err(Error::UpstreamPanicked {
                group: group.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upstream_panic_has_its_own_error() {
        let fail = true;
        let joined = tokio::spawn(async move {
            if fail {
                panic!("upstream broke");
            }
            Ok(Summary::default())
        })
        .await;

        let err = upstream_outcome("stage", joined).unwrap_err();
        assert!(matches!(err, Error::UpstreamPanicked { ref group } if group == "stage"));
    }

    #[tokio::test]
    async fn upstream_errors_pass_through_unchanged() {
        let joined = tokio::spawn(async {
            Err::<Summary, _>(Error::MissingWorker {
                group: "stage".into(),
            })
        })
        .await;

        let err = upstream_outcome("stage", joined).unwrap_err();
        assert!(matches!(err, Error::MissingWorker { .. }));
    }
}
