//! Pipelined execution of concurrent runs.
//!
//! One worker task per module, each with its own inbox. Payloads carry the
//! [`RunId`] they belong to, so a worker keeps the inputs of different runs
//! apart and downstream modules work on run K while upstream modules are
//! already on run K+1:
//!
//! ```text
//! Time →   0      1      2      3
//! mod0:  [r0]   [r1]   [r2]
//! mod1:         [r0]   [r1]   [r2]
//! ```
//!
//! Each worker invokes its module on the blocking pool and awaits the result
//! before taking the next ready run, so an instance never runs twice at once.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tandem_types::config::ExecutorConfig;
use tandem_types::{ModuleIndex, Tensor};

use crate::error::{PipelineError, Result};
use crate::layout::{Delivery, PipelineLayout};
use crate::pool::{ModuleInstance, ModuleInstancePool};
use crate::run::{OutputCollector, PendingInputs, PipelineOutputs, RunId, RunInputs};

// ── Messages ─────────────────────────────────────────────────────────────────

/// Work delivered to a module worker.
#[derive(Debug)]
enum StageEnvelope {
    Input {
        run_id: RunId,
        input_idx: u32,
        tensor: Tensor,
    },
    /// Kick a module that takes no inputs.
    Start { run_id: RunId },
}

/// Out-of-band signals; handled before any queued envelope.
#[derive(Debug)]
enum Control {
    /// Drop whatever is pending for a run that ended early.
    Purge { run_id: RunId },
    Shutdown,
}

// ── Shared run table ─────────────────────────────────────────────────────────

struct RunSlot {
    outputs: OutputCollector,
    reply: oneshot::Sender<Result<PipelineOutputs>>,
    /// Timer that cancels the run when its deadline passes.
    deadline: Option<AbortHandle>,
}

impl RunSlot {
    fn complete(self) {
        let Self { outputs, reply, deadline } = self;
        if let Some(timer) = deadline {
            timer.abort();
        }
        let _ = reply.send(outputs.finish());
    }

    fn fail(self, error: PipelineError) {
        if let Some(timer) = self.deadline {
            timer.abort();
        }
        let _ = self.reply.send(Err(error));
    }
}

/// Counters since the runtime started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

struct Shared {
    layout: Arc<PipelineLayout>,
    runs: Mutex<HashMap<RunId, RunSlot>>,
    controls: Vec<mpsc::UnboundedSender<Control>>,
    counters: Counters,
}

impl Shared {
    fn runs(&self) -> MutexGuard<'_, HashMap<RunId, RunSlot>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, run_id: RunId) -> bool {
        self.runs().contains_key(&run_id)
    }

    /// Record a global output; completes the run when it was the last slot.
    fn publish(&self, run_id: RunId, slot: u32, tensor: Tensor) {
        let mut runs = self.runs();
        let Some(run) = runs.get_mut(&run_id) else {
            debug!(%run_id, slot, "dropping output of a finished run");
            return;
        };
        if let Err(e) = run.outputs.fill(slot, tensor) {
            drop(runs);
            self.abort(run_id, e);
            return;
        }
        if !run.outputs.is_complete() {
            return;
        }
        let Some(run) = runs.remove(&run_id) else {
            return;
        };
        drop(runs);

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        debug!(%run_id, "run complete");
        run.complete();
    }

    /// End a run early with `error` and release its queued payloads.
    /// Returns `false` if the run had already finished.
    fn abort(&self, run_id: RunId, error: PipelineError) -> bool {
        let Some(run) = self.runs().remove(&run_id) else {
            return false;
        };
        match error {
            PipelineError::Cancelled { .. } => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        run.fail(error);
        for control in &self.controls {
            let _ = control.send(Control::Purge { run_id });
        }
        true
    }
}

// ── Stage worker ─────────────────────────────────────────────────────────────

struct StageWorker {
    mod_idx: ModuleIndex,
    num_inputs: usize,
    instance: Arc<ModuleInstance>,
    shared: Arc<Shared>,
    inboxes: Arc<BTreeMap<ModuleIndex, mpsc::Sender<StageEnvelope>>>,
    pending: HashMap<RunId, PendingInputs>,
}

impl StageWorker {
    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<StageEnvelope>,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        loop {
            tokio::select! {
                biased;
                signal = control.recv() => match signal {
                    Some(Control::Purge { run_id }) => {
                        if self.pending.remove(&run_id).is_some() {
                            debug!(mod_idx = %self.mod_idx, %run_id, "released pending inputs");
                        }
                    }
                    Some(Control::Shutdown) | None => break,
                },
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.accept(envelope).await,
                    None => break,
                },
            }
        }
        debug!(mod_idx = %self.mod_idx, "stage worker stopped");
    }

    async fn accept(&mut self, envelope: StageEnvelope) {
        let (run_id, ready) = match envelope {
            StageEnvelope::Start { run_id } => (run_id, true),
            StageEnvelope::Input { run_id, input_idx, tensor } => {
                let num_inputs = self.num_inputs;
                let pending = self
                    .pending
                    .entry(run_id)
                    .or_insert_with(|| PendingInputs::new(num_inputs));
                match pending.insert(self.mod_idx, input_idx, tensor) {
                    Ok(ready) => (run_id, ready),
                    Err(e) => {
                        self.pending.remove(&run_id);
                        self.shared.abort(run_id, e);
                        return;
                    }
                }
            }
        };

        if !self.shared.is_live(run_id) {
            self.pending.remove(&run_id);
            return;
        }
        if !ready {
            return;
        }

        let inputs = self
            .pending
            .remove(&run_id)
            .map(PendingInputs::take)
            .unwrap_or_default();
        if let Err(e) = self.execute(run_id, inputs).await {
            warn!(mod_idx = %self.mod_idx, %run_id, error = %e, "run failed");
            self.shared.abort(run_id, e);
        }
    }

    async fn execute(&self, run_id: RunId, inputs: Vec<Tensor>) -> Result<()> {
        let instance = Arc::clone(&self.instance);
        let produced = tokio::task::spawn_blocking(move || instance.invoke(&inputs))
            .await
            .map_err(|e| PipelineError::Runtime {
                mod_idx: self.mod_idx,
                message: format!("module task failed: {e}"),
            })??;

        if !self.shared.is_live(run_id) {
            debug!(mod_idx = %self.mod_idx, %run_id, "run ended while module was running");
            return Ok(());
        }

        for delivery in self.shared.layout.route(self.mod_idx, produced)? {
            match delivery {
                Delivery::Input { mod_idx, input_idx, tensor } => {
                    let inbox = self.inboxes.get(&mod_idx).ok_or_else(|| {
                        PipelineError::Lookup(format!("no worker for {mod_idx}"))
                    })?;
                    inbox
                        .send(StageEnvelope::Input { run_id, input_idx, tensor })
                        .await
                        .map_err(|_| PipelineError::Shutdown)?;
                }
                Delivery::Output { slot, tensor } => self.shared.publish(run_id, slot, tensor),
            }
        }
        debug!(mod_idx = %self.mod_idx, %run_id, "module drained");
        Ok(())
    }
}

// ── Run handle ───────────────────────────────────────────────────────────────

/// Cancels one run from anywhere; cheap to clone.
#[derive(Clone)]
pub struct RunCanceller {
    run_id: RunId,
    shared: Weak<Shared>,
}

impl RunCanceller {
    /// Cancel the run. Returns `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let cancelled = shared.abort(self.run_id, PipelineError::Cancelled { run_id: self.run_id });
        if cancelled {
            info!(run_id = %self.run_id, "run cancelled");
        }
        cancelled
    }
}

/// A submitted run.
pub struct RunHandle {
    run_id: RunId,
    submitted_at: DateTime<Utc>,
    rx: oneshot::Receiver<Result<PipelineOutputs>>,
    canceller: RunCanceller,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.run_id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn canceller(&self) -> RunCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// Wait for the run's outputs, or [`PipelineError::Cancelled`] if it was
    /// cancelled or its deadline passed.
    pub async fn wait(self) -> Result<PipelineOutputs> {
        self.rx.await.unwrap_or(Err(PipelineError::Shutdown))
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

pub struct PipelineRuntime {
    shared: Arc<Shared>,
    inboxes: Arc<BTreeMap<ModuleIndex, mpsc::Sender<StageEnvelope>>>,
    workers: JoinSet<()>,
    config: ExecutorConfig,
}

impl PipelineRuntime {
    /// Spawn one worker per module on the current tokio runtime.
    pub(crate) fn start(
        layout: Arc<PipelineLayout>,
        pool: &ModuleInstancePool,
        config: ExecutorConfig,
    ) -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| PipelineError::NoRuntime(e.to_string()))?;

        let depth = config.queue_depth.max(1);
        let mut senders = BTreeMap::new();
        let mut controls = Vec::with_capacity(pool.len());
        let mut endpoints = Vec::with_capacity(pool.len());
        for (mod_idx, instance) in pool.iter() {
            let (tx, rx) = mpsc::channel(depth);
            let (control_tx, control_rx) = mpsc::unbounded_channel();
            senders.insert(mod_idx, tx);
            controls.push(control_tx);
            endpoints.push((mod_idx, Arc::clone(instance), rx, control_rx));
        }

        let shared = Arc::new(Shared {
            layout,
            runs: Mutex::new(HashMap::new()),
            controls,
            counters: Counters::default(),
        });
        let inboxes = Arc::new(senders);

        let mut workers = JoinSet::new();
        for (mod_idx, instance, rx, control_rx) in endpoints {
            let worker = StageWorker {
                mod_idx,
                num_inputs: instance.num_inputs(),
                instance,
                shared: Arc::clone(&shared),
                inboxes: Arc::clone(&inboxes),
                pending: HashMap::new(),
            };
            workers.spawn(worker.run(rx, control_rx));
        }

        info!(stages = workers.len(), queue_depth = depth, "pipeline runtime started");

        Ok(Self {
            shared,
            inboxes,
            workers,
            config,
        })
    }

    /// Submit a run. Applies [`ExecutorConfig::default_deadline`] if set.
    ///
    /// Waits only while an entry module's inbox is full.
    pub async fn submit(&self, inputs: RunInputs) -> Result<RunHandle> {
        self.submit_inner(inputs, self.config.default_deadline).await
    }

    /// Submit a run that is cancelled if not finished within `deadline`.
    pub async fn submit_with_deadline(&self, inputs: RunInputs, deadline: Duration) -> Result<RunHandle> {
        self.submit_inner(inputs, Some(deadline)).await
    }

    async fn submit_inner(&self, inputs: RunInputs, deadline: Option<Duration>) -> Result<RunHandle> {
        let layout = &self.shared.layout;
        let seeded = layout.resolve_inputs(inputs)?;

        let run_id = RunId::new();
        let (reply, rx) = oneshot::channel();
        self.shared.runs().insert(
            run_id,
            RunSlot {
                outputs: OutputCollector::new(layout.num_outputs()),
                reply,
                deadline: None,
            },
        );
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if let Some(after) = deadline {
            self.arm_deadline(run_id, Instant::now() + after);
        }

        let envelopes = seeded
            .into_iter()
            .map(|((mod_idx, input_idx), tensor)| {
                (mod_idx, StageEnvelope::Input { run_id, input_idx, tensor })
            })
            .chain(
                layout
                    .sources()
                    .into_iter()
                    .map(|mod_idx| (mod_idx, StageEnvelope::Start { run_id })),
            );
        for (mod_idx, envelope) in envelopes {
            if let Err(e) = self.dispatch(mod_idx, envelope).await {
                self.shared.abort(run_id, PipelineError::Shutdown);
                return Err(e);
            }
        }

        debug!(%run_id, ?deadline, "run submitted");

        Ok(RunHandle {
            run_id,
            submitted_at: Utc::now(),
            rx,
            canceller: RunCanceller {
                run_id,
                shared: Arc::downgrade(&self.shared),
            },
        })
    }

    /// Cancel `run_id` at `at` whether or not anyone waits on it.
    fn arm_deadline(&self, run_id: RunId, at: Instant) {
        let shared = Arc::downgrade(&self.shared);
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(shared) = shared.upgrade() {
                if shared.abort(run_id, PipelineError::Cancelled { run_id }) {
                    warn!(%run_id, "run deadline expired");
                }
            }
        });
        match self.shared.runs().get_mut(&run_id) {
            Some(run) => run.deadline = Some(timer.abort_handle()),
            None => timer.abort(),
        }
    }

    async fn dispatch(&self, mod_idx: ModuleIndex, envelope: StageEnvelope) -> Result<()> {
        let inbox = self
            .inboxes
            .get(&mod_idx)
            .ok_or_else(|| PipelineError::Lookup(format!("no worker for {mod_idx}")))?;
        inbox.send(envelope).await.map_err(|_| PipelineError::Shutdown)
    }

    /// Submit a run and wait for it.
    pub async fn run(&self, inputs: RunInputs) -> Result<PipelineOutputs> {
        self.submit(inputs).await?.wait().await
    }

    /// Runs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.shared.runs().len()
    }

    pub fn stats(&self) -> RuntimeStats {
        let c = &self.shared.counters;
        RuntimeStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Stop every worker. Runs still in flight fail with
    /// [`PipelineError::Shutdown`].
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "stage worker ended abnormally");
            }
        }
        let abandoned: Vec<RunSlot> = self.shared.runs().drain().map(|(_, run)| run).collect();
        for run in abandoned {
            run.fail(PipelineError::Shutdown);
        }
        info!(stats = ?self.stats(), "pipeline runtime stopped");
    }

    fn signal_shutdown(&self) {
        for control in &self.shared.controls {
            let _ = control.send(Control::Shutdown);
        }
    }
}

impl Drop for PipelineRuntime {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
