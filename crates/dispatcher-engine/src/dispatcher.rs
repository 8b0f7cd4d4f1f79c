//! The dispatcher (§4.B): owns the three priority queues, ticks,
//! schedules, and promotes across tiers. `Dispatcher` is not `Send`
//! -restricted itself, but its contract is single-owner: `tick()` and
//! `handle_execution_complete()` must never be invoked concurrently on the
//! same instance (§5). The embedding runtime serializes access, typically
//! via a `tokio::sync::Mutex<Dispatcher>` owned by exactly one spawned
//! task, engine-owned-by-one-task.

use std::sync::Arc;

use async_trait::async_trait;
use dispatcher_core::{AutoTestResult, ContainerInput, DelivId, DispatcherConfig};
use tokio::sync::mpsc;

use crate::job::{run_job, ContainerRuntime};
use crate::queue::JobQueue;
use crate::sinks::{GradeSink, GradeTransport, ResultSink};

/// Which of the three fixed tiers a queue operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Express,
    Standard,
    Regression,
}

/// The `processExecution(result)` extension point from §4.B's completion
/// path step 3: an embedder-supplied hook (e.g. feedback posting) invoked
/// on every completed job. Its errors are logged and swallowed, same as
/// the result sink's, to protect queue health.
#[async_trait]
pub trait ExecutionHook: Send + Sync {
    async fn process_execution(&self, result: &AutoTestResult) -> anyhow::Result<()>;
}

/// Owns the three fixed priority queues and the collaborator handles a
/// running job needs. Construct once per process; drive with repeated
/// `tick()` calls and completions drained from `wait_for_completion`.
pub struct Dispatcher {
    express: JobQueue,
    standard: JobQueue,
    regression: JobQueue,
    container_runtime: Arc<dyn ContainerRuntime>,
    result_sink: Arc<dyn ResultSink>,
    grade_sink: Arc<dyn GradeSink>,
    execution_hook: Option<Arc<dyn ExecutionHook>>,
    completion_tx: mpsc::UnboundedSender<AutoTestResult>,
    completion_rx: mpsc::UnboundedReceiver<AutoTestResult>,
}

impl Dispatcher {
    pub fn new(
        config: &DispatcherConfig,
        container_runtime: Arc<dyn ContainerRuntime>,
        result_sink: Arc<dyn ResultSink>,
        grade_sink: Arc<dyn GradeSink>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            express: JobQueue::new("express", config.num_slots_express),
            standard: JobQueue::new("standard", config.num_slots_standard),
            regression: JobQueue::new("regression", config.num_slots_regression),
            container_runtime,
            result_sink,
            grade_sink,
            execution_hook: None,
            completion_tx,
            completion_rx,
        }
    }

    /// Supplies the §4.B "subclass-supplied `processExecution`" hook,
    /// called on every completion. Defaults to no hook (a no-op).
    pub fn with_execution_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.execution_hook = Some(hook);
        self
    }

    fn queue_mut(&mut self, tier: Tier) -> &mut JobQueue {
        match tier {
            Tier::Express => &mut self.express,
            Tier::Standard => &mut self.standard,
            Tier::Regression => &mut self.regression,
        }
    }

    fn queue(&self, tier: Tier) -> &JobQueue {
        match tier {
            Tier::Express => &self.express,
            Tier::Standard => &self.standard,
            Tier::Regression => &self.regression,
        }
    }

    /// Admits a job to the standard tier (§4.B public contract).
    pub fn add_to_standard_queue(&mut self, input: ContainerInput) {
        self.standard.push(input);
    }

    /// Fire-and-forget launch: fills every free slot in `tier` by
    /// repeatedly popping the head and spawning it on the cooperative
    /// executor, routing each result back through the completion channel
    /// rather than awaiting it here (§9).
    fn schedule(&mut self, tier: Tier) {
        loop {
            let queue = self.queue_mut(tier);
            if !(queue.has_capacity() && queue.length() > 0) {
                return;
            }
            let input = match queue.schedule_next() {
                Ok(input) => input,
                Err(err) => {
                    tracing::error!(tier = ?tier, error = %err, "schedule_next failed after capacity check");
                    return;
                }
            };
            self.launch(tier, input);
        }
    }

    fn launch(&mut self, tier: Tier, input: ContainerInput) {
        tracing::info!(tier = ?tier, commit_url = %input.target.commit_url, "scheduling job");

        let runtime = Arc::clone(&self.container_runtime);
        let grade_sink = Arc::clone(&self.grade_sink);
        let completion_tx = self.completion_tx.clone();
        let target = input.target.clone();

        tokio::spawn(async move {
            let result = run_job(input, runtime.as_ref()).await;

            let grade = GradeTransport {
                deliv_id: target.deliv_id.clone(),
                repo_id: target.repo_id.clone(),
                // TODO: repo URL isn't known at the engine layer — only
                // repo_id travels with a job. Wire it through
                // ContainerInput/CommitTarget if a caller needs it here.
                repo_url: None,
                score: result.output.report.score_overall,
                url_name: target.commit_sha.clone(),
                url: target.commit_url.clone(),
                comment: result.output.report.error.clone(),
                timestamp: chrono::Utc::now(),
                custom: Default::default(),
            };
            if let Err(failure) = grade_sink.accept(&grade).await {
                tracing::warn!(commit_url = %target.commit_url, reason = %failure.message, "grade sink rejected partial grade");
            }

            if completion_tx.send(result).is_err() {
                tracing::error!(commit_url = %target.commit_url, "completion channel closed; dispatcher was dropped while a job was in flight");
            }
        });
    }

    /// `promote(from -> to)`: steals backlog from a slower tier into a
    /// faster one when the faster tier has spare capacity (§4.B).
    fn promote(&mut self, from: Tier, to: Tier) {
        if self.queue(from).length() == 0 || !self.queue(to).has_capacity() {
            return;
        }
        let input = match self.queue_mut(from).pop() {
            Ok(input) => input,
            Err(_) => return,
        };
        tracing::info!(from = ?from, to = ?to, commit_url = %input.target.commit_url, "promoting job across tiers");
        self.queue_mut(to).push_first(input);
        self.schedule(to);
    }

    /// Advances the scheduler once, in the six fixed steps of §4.B.
    /// Idempotent under "nothing to do". Never called concurrently with
    /// itself or `handle_execution_complete` on the same instance (§5).
    #[tracing::instrument(skip(self))]
    pub fn tick(&mut self) {
        self.schedule(Tier::Express);
        self.promote(Tier::Express, Tier::Standard);
        self.promote(Tier::Express, Tier::Regression);
        self.schedule(Tier::Standard);
        self.promote(Tier::Standard, Tier::Regression);
        self.schedule(Tier::Regression);
    }

    /// On a user-initiated feedback request, considers moving an already
    /// -queued job to `express` (§4.B "Promotion on demand").
    #[tracing::instrument(skip(self))]
    pub fn promote_if_needed(&mut self, commit_url: &str, deliv_id: &DelivId) {
        if self.express.is_commit_executing(commit_url, deliv_id)
            || self.standard.is_commit_executing(commit_url, deliv_id)
            || self.regression.is_commit_executing(commit_url, deliv_id)
        {
            return;
        }

        for tier in [Tier::Standard, Tier::Regression] {
            let position = self.queue(tier).index_of(commit_url);
            if position < 0 {
                continue;
            }
            let position = position as usize;
            if self.express.length() > position {
                // Staying put finishes sooner than re-queuing at the tail
                // of express: express already has more jobs ahead of
                // where target would land than target's own distance from
                // the front of its current tier.
                return;
            }
            if let Some(input) = self.queue_mut(tier).remove(commit_url) {
                tracing::info!(commit_url, tier = ?tier, "promoting on demand to express");
                self.express.push(input);
                self.schedule(Tier::Express);
            }
            return;
        }
        // Not present anywhere, or already on express: no-op.
    }

    /// The completion hook a Grading Job Runner invokes through the
    /// completion channel (§4.B "Completion path"). Every step is wrapped
    /// so a collaborator failure becomes a logged error and a freed slot,
    /// never an aborted dispatcher (§7 "Fatal").
    #[tracing::instrument(skip(self, result))]
    pub async fn handle_execution_complete(&mut self, result: AutoTestResult) {
        if !result.is_well_formed() {
            tracing::error!(commit_url = %result.commit_url, "dropping malformed completion result");
            return;
        }

        if let Err(failure) = self.result_sink.accept(&result).await {
            tracing::warn!(commit_url = %result.commit_url, reason = %failure.message, "result sink rejected completed result");
        }

        if let Some(hook) = &self.execution_hook {
            if let Err(err) = hook.process_execution(&result).await {
                tracing::warn!(commit_url = %result.commit_url, error = %err, "processExecution hook failed; continuing");
            }
        }

        let deliv_id = result.deliv_id.clone();
        let commit_url = result.commit_url.clone();
        self.express.clear_execution(&commit_url, &deliv_id);
        self.standard.clear_execution(&commit_url, &deliv_id);
        self.regression.clear_execution(&commit_url, &deliv_id);

        self.tick();
    }

    /// Awaits the next job completion and routes it through
    /// `handle_execution_complete`. Returns `false` once every sender
    /// handle (i.e. the dispatcher itself) has been dropped.
    pub async fn wait_for_completion(&mut self) -> bool {
        match self.completion_rx.recv().await {
            Some(result) => {
                self.handle_execution_complete(result).await;
                true
            }
            None => false,
        }
    }

    /// Drains every completion currently buffered without blocking.
    pub async fn drain_completions(&mut self) {
        while let Ok(result) = self.completion_rx.try_recv() {
            self.handle_execution_complete(result).await;
        }
    }

    pub fn express_len(&self) -> usize {
        self.express.length()
    }

    pub fn standard_len(&self) -> usize {
        self.standard.length()
    }

    pub fn regression_len(&self) -> usize {
        self.regression.length()
    }

    pub fn running(&self, tier: Tier) -> usize {
        self.queue(tier).num_running()
    }

    pub fn capacity(&self, tier: Tier) -> usize {
        self.queue(tier).capacity()
    }

    pub fn total_running(&self) -> usize {
        self.express.num_running() + self.standard.num_running() + self.regression.num_running()
    }

    /// True when no non-empty queue has spare capacity in its own tier —
    /// the "demonstrably blocked" state §8 invariant 3 refers to.
    pub fn is_blocked(&self) -> bool {
        [Tier::Express, Tier::Standard, Tier::Regression]
            .into_iter()
            .all(|tier| self.queue(tier).length() == 0 || !self.queue(tier).has_capacity())
    }

    /// Every `(commitURL, delivId)` pair currently held by any tier, in
    /// either waiting or running state. Used by property tests to check
    /// at-most-once membership across the whole dispatcher.
    pub fn all_keys(&self) -> Vec<(String, DelivId)> {
        [Tier::Express, Tier::Standard, Tier::Regression]
            .into_iter()
            .flat_map(|tier| self.queue(tier).all_keys())
            .collect()
    }
}

/// Records every result it sees; used to assert `processExecution` ran.
#[derive(Debug, Default)]
pub struct RecordingExecutionHook {
    pub received: tokio::sync::Mutex<Vec<AutoTestResult>>,
}

#[async_trait]
impl ExecutionHook for RecordingExecutionHook {
    async fn process_execution(&self, result: &AutoTestResult) -> anyhow::Result<()> {
        self.received.lock().await.push(result.clone());
        Ok(())
    }
}

/// Always errors. Used to confirm a failing hook is swallowed and does
/// not block slot release, same as a failing sink (§4.B step 3, §7).
#[derive(Debug)]
pub struct FailingExecutionHook {
    pub reason: String,
}

#[async_trait]
impl ExecutionHook for FailingExecutionHook {
    async fn process_execution(&self, _result: &AutoTestResult) -> anyhow::Result<()> {
        anyhow::bail!("{}", self.reason)
    }
}
