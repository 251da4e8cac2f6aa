//! Chart execution engine
//!
//! Drives the per-node run/poll state machine over a shared [`Chart`]:
//! `run_node` transitions the node to `running` (clearing its outputs),
//! hands the work to the operator behavior or to the backend job API, and
//! returns immediately; a spawned poll loop ticks until a terminal status.
//! Reaching `success` binds the results and notifies every downstream node
//! through its connection-update hook, strictly after the state change.
//!
//! Behaviors and the backend are always called without the chart lock held:
//! the engine snapshots the operator and its resolved input values first,
//! then applies the returned outcome under the lock. Cancellation goes
//! through [`PendingWork`]; a cancelled loop never mutates the node again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::backend::{Backend, JobResult, JobStatus};
use crate::behavior::{
    InputValues, OperatorArgs, OperatorBehavior, OperatorUpdate, OutputBinding, PollOutcome,
    RunOutcome,
};
use crate::chart::Chart;
use crate::compat::TypeCompatibility;
use crate::descriptor::OperatorMetadata;
use crate::error::{ChartError, Result};
use crate::events::{ChartEvent, EventSink};
use crate::pending::{CancelToken, PendingWork};
use crate::registry::OperatorRegistry;
use crate::types::{ConnectorRef, Direction, NodeId, Operator, ProcessId, RunState};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the status poll loops
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// An input value as found on the upstream output slot, before resolution
enum RawInput {
    Value(serde_json::Value),
    Resource(String),
}

/// The chart execution engine
///
/// Shared by reference (`Arc`): poll loops hold a clone and go through the
/// same lock and event sink as direct calls.
pub struct Engine {
    chart: Mutex<Chart>,
    backend: Arc<dyn Backend>,
    registry: Arc<OperatorRegistry>,
    events: Arc<dyn EventSink>,
    pending: Arc<PendingWork>,
    compat: TypeCompatibility,
    poll_interval: Duration,
}

impl Engine {
    /// Create an engine, fetching the type compatibility matrix once
    pub async fn initialize(
        backend: Arc<dyn Backend>,
        registry: Arc<OperatorRegistry>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Result<Arc<Self>> {
        let compat = TypeCompatibility::fetch(backend.as_ref()).await?;
        Ok(Arc::new(Self {
            chart: Mutex::new(Chart::new()),
            backend,
            registry,
            events,
            pending: Arc::new(PendingWork::new()),
            compat,
            poll_interval: config.poll_interval,
        }))
    }

    pub fn compat(&self) -> &TypeCompatibility {
        &self.compat
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    pub fn pending(&self) -> &PendingWork {
        &self.pending
    }

    /// Run a closure against the chart under the lock
    pub async fn with_chart<R>(&self, f: impl FnOnce(&mut Chart) -> R) -> R {
        let mut chart = self.chart.lock().await;
        f(&mut chart)
    }

    /// Current run state and progress of a node
    pub async fn node_state(&self, id: NodeId) -> Result<(RunState, u8)> {
        let chart = self.chart.lock().await;
        let node = chart.find_node(id)?;
        Ok((node.operator.state, node.operator.progress))
    }

    fn emit(&self, event: ChartEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("dropping chart event: {e}");
        }
    }

    /// Add a node for the named operator at the given position
    ///
    /// Operators unknown to the registry are looked up in the backend
    /// catalog (remote algorithms). The behavior's `init` hook runs after
    /// the node exists in the chart.
    pub async fn add_node(self: &Arc<Self>, operator: &str, x: f64, y: f64) -> Result<NodeId> {
        let metadata = match self.registry.get_metadata(operator) {
            Some(metadata) => metadata.clone(),
            None => OperatorMetadata::from_catalog(self.backend.read_operator(operator).await?),
        };

        let id = {
            let mut chart = self.chart.lock().await;
            let id = chart.next_node_id();
            chart.add_node(metadata.instantiate(id, x, y));
            id
        };
        self.emit(ChartEvent::NodeAdded {
            node_id: id,
            operator: operator.to_string(),
        });

        if let Some(behavior) = self.registry.get_behavior(operator) {
            let (snapshot, inputs) = match self.snapshot_node(id).await {
                Ok(parts) => parts,
                Err(e) => return Err(e),
            };
            let update = behavior
                .init(OperatorArgs {
                    node_id: id,
                    operator: &snapshot,
                    inputs: &inputs,
                    backend: self.backend.as_ref(),
                })
                .await;
            self.apply_update(id, update).await?;
        }
        Ok(id)
    }

    /// Wire two connectors together
    ///
    /// On success the destination node's connection-update hook fires
    /// before this returns.
    pub async fn connect(self: &Arc<Self>, a: ConnectorRef, b: ConnectorRef) -> Result<()> {
        let dest = {
            let mut chart = self.chart.lock().await;
            chart.create_connection(a, b, &self.compat)?
        };
        let source_node = if a.direction == Direction::Output {
            a.node
        } else {
            b.node
        };
        self.emit(ChartEvent::ConnectionCreated {
            source_node,
            dest_node: dest,
        });
        self.notify_connection_update(dest).await;
        Ok(())
    }

    /// Delete every selected node and connection, cancelling their polls
    pub async fn delete_selected(&self) -> Vec<NodeId> {
        let deleted = {
            let mut chart = self.chart.lock().await;
            chart.delete_selected()
        };
        for &id in &deleted {
            self.pending.cancel(id);
        }
        if !deleted.is_empty() {
            self.emit(ChartEvent::NodesDeleted {
                node_ids: deleted.clone(),
            });
        }
        deleted
    }

    /// Set a parameter value, re-running the node if the parameter asks so
    pub async fn set_parameter(
        self: &Arc<Self>,
        id: NodeId,
        name: &str,
        value: Option<serde_json::Value>,
    ) -> Result<()> {
        let auto_run = {
            let mut chart = self.chart.lock().await;
            let node = chart.find_node_mut(id)?;
            let param = node
                .operator
                .parameter_mut(name)
                .ok_or_else(|| ChartError::ParameterNotFound(name.to_string()))?;
            param.value = value;
            param.auto_run
        };
        self.emit(ChartEvent::ParameterChanged {
            node_id: id,
            parameter: name.to_string(),
        });
        if auto_run {
            self.run_node(id).await?;
        }
        Ok(())
    }

    /// Run a node
    ///
    /// Transitions to `running` (clearing all outputs), snapshots the
    /// operator and its resolved inputs, then returns; the work continues
    /// on a spawned task. A run over an already-running node supersedes it.
    pub async fn run_node(self: &Arc<Self>, id: NodeId) -> Result<()> {
        let (operator, raw_inputs) = {
            let mut chart = self.chart.lock().await;
            let raw_inputs = Self::collect_inputs(&chart, id)?;
            let node = chart.find_node_mut(id)?;
            node.clear_outputs();
            node.operator.state = RunState::Running;
            node.operator.progress = 0;
            node.operator.pid = None;
            node.operator.last_start_local = Some(Utc::now().timestamp());
            node.operator.duration = None;
            (node.operator.clone(), raw_inputs)
        };
        self.emit(ChartEvent::state_changed(id, RunState::Running, 0));
        log::debug!("node {id} ({}) entering running", operator.name);

        let token = self.pending.register(id);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drive_run(id, operator, raw_inputs, token).await;
        });
        Ok(())
    }

    /// Cancel a node's in-flight run, if any
    ///
    /// The node keeps its current state; only the poll loop stops.
    pub fn cancel_node(&self, id: NodeId) -> bool {
        self.pending.cancel(id)
    }

    /// Cancel every in-flight run
    pub fn cancel_all(&self) {
        self.pending.cancel_all();
    }

    /// Re-attach a saved backend process id and resume polling
    ///
    /// Used when loading a workflow whose node was still running: the node
    /// goes back to `running` and its poll loop restarts against the
    /// existing job or session.
    pub async fn attach_pid(self: &Arc<Self>, id: NodeId, pid: ProcessId) -> Result<()> {
        let operator = {
            let mut chart = self.chart.lock().await;
            let node = chart.find_node_mut(id)?;
            node.clear_outputs();
            node.operator.state = RunState::Running;
            node.operator.pid = Some(pid.clone());
            node.operator.last_start_local = Some(Utc::now().timestamp());
            node.operator.clone()
        };
        self.emit(ChartEvent::state_changed(id, RunState::Running, operator.progress));
        log::debug!("node {id} re-attached pid {pid}, resuming polling");

        let token = self.pending.register(id);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.registry.get_behavior(&operator.name) {
                Some(behavior) => {
                    let inputs = InputValues::new();
                    engine.poll_local(id, behavior, &inputs, token).await;
                }
                None => engine.poll_remote(id, pid, token).await,
            }
        });
        Ok(())
    }

    /// Resolved value of an output connector
    ///
    /// `None` unless the owning node's state is `success`: stale values are
    /// never handed out. A bound resource id resolves through the backend.
    pub async fn get_output_value(
        &self,
        id: NodeId,
        output_index: usize,
    ) -> Result<Option<serde_json::Value>> {
        let rid = {
            let chart = self.chart.lock().await;
            let node = chart.find_node(id)?;
            if !node.operator.is_success() {
                return Ok(None);
            }
            let slot = node
                .outputs
                .get(output_index)
                .ok_or(ChartError::ConnectorNotFound {
                    node: id,
                    direction: Direction::Output,
                    index: output_index,
                })?;
            if let Some(value) = &slot.value {
                return Ok(Some(value.clone()));
            }
            match &slot.rid {
                Some(rid) => rid.clone(),
                None => return Ok(None),
            }
        };
        Ok(Some(self.backend.result_payload(&rid).await?))
    }

    // --- run driving -----------------------------------------------------

    async fn drive_run(
        self: Arc<Self>,
        id: NodeId,
        operator: Operator,
        raw_inputs: Vec<(String, RawInput)>,
        mut token: CancelToken,
    ) {
        let inputs = match self.resolve_inputs(raw_inputs).await {
            Ok(inputs) => inputs,
            Err(e) => {
                self.fail_node(id, None, format!("input resolution failed: {e}"), &token)
                    .await;
                return;
            }
        };
        if token.is_cancelled() {
            return;
        }

        match operator.kind {
            crate::types::OperatorKind::Remote => {
                let args = job_args(&operator, &inputs);
                let submitted = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    result = self.backend.submit_job(operator.op_id, args) => result,
                };
                if token.is_cancelled() {
                    return;
                }
                match submitted {
                    Ok(handle) => {
                        if self.set_pid(id, handle.pid.clone()).await.is_err() {
                            return;
                        }
                        self.poll_remote(id, handle.pid, token).await;
                    }
                    Err(e) => {
                        self.fail_node(id, None, format!("job submission failed: {e}"), &token)
                            .await;
                    }
                }
            }
            crate::types::OperatorKind::Local => {
                let Some(behavior) = self.registry.get_behavior(&operator.name) else {
                    self.fail_node(
                        id,
                        None,
                        format!("no behavior registered for operator '{}'", operator.name),
                        &token,
                    )
                    .await;
                    return;
                };
                let outcome = {
                    let args = OperatorArgs {
                        node_id: id,
                        operator: &operator,
                        inputs: &inputs,
                        backend: self.backend.as_ref(),
                    };
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        outcome = behavior.run(args) => outcome,
                    }
                };
                if token.is_cancelled() {
                    return;
                }
                match outcome {
                    RunOutcome::Success { outputs } => {
                        self.finish_success(id, outputs, Some(100), &token).await;
                    }
                    RunOutcome::Idle => {
                        self.pending.finished(id, &token);
                        if self.apply_update(id, OperatorUpdate::idle()).await.is_err() {
                            return;
                        }
                    }
                    RunOutcome::Pending { pid } => {
                        if self.set_pid(id, pid).await.is_err() {
                            return;
                        }
                        self.poll_local(id, behavior, &inputs, token).await;
                    }
                    RunOutcome::Failure { error } => {
                        self.fail_node(id, None, error, &token).await;
                    }
                }
            }
        }
    }

    /// Generic remote-job poll loop, one backend status round per tick
    ///
    /// The selects are biased towards the cancel signal, and the token is
    /// re-checked around every await: once cancelled, the loop neither
    /// calls the backend again nor touches the node.
    async fn poll_remote(self: &Arc<Self>, id: NodeId, pid: ProcessId, mut token: CancelToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = interval.tick() => {}
            }
            if token.is_cancelled() {
                return;
            }
            let report = match self.backend.job_status(&pid).await {
                Ok(report) => report,
                Err(e) => {
                    log::error!("status poll for node {id} (pid {pid}) failed: {e}");
                    self.fail_node(id, None, format!("status poll failed: {e}"), &token)
                        .await;
                    return;
                }
            };
            if token.is_cancelled() {
                return;
            }
            self.record_timing(id, report.start_date, report.duration)
                .await;

            match report.status {
                JobStatus::Init => {
                    self.set_progress(id, 10, RunState::Running, &token).await;
                }
                JobStatus::Run => {
                    // Visually "busy", not "done"
                    self.set_progress(id, 100, RunState::Running, &token).await;
                }
                JobStatus::AlgoOk => {
                    match self.backend.job_results(&pid).await {
                        Ok(results) => self.finish_remote_success(id, results, &token).await,
                        Err(e) => {
                            self.fail_node(id, None, format!("result fetch failed: {e}"), &token)
                                .await;
                        }
                    }
                    return;
                }
                status @ (JobStatus::AlgoKo | JobStatus::EngineKo | JobStatus::Other(_)) => {
                    let error = report
                        .error_message
                        .unwrap_or_else(|| format!("job ended with status {}", String::from(status)));
                    self.fail_node(id, None, error, &token).await;
                    return;
                }
            }
        }
    }

    /// Poll loop delegating each round to the behavior's own `poll`
    async fn poll_local(
        self: &Arc<Self>,
        id: NodeId,
        behavior: Arc<dyn OperatorBehavior>,
        inputs: &InputValues,
        mut token: CancelToken,
    ) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = interval.tick() => {}
            }
            if token.is_cancelled() {
                return;
            }
            let snapshot = {
                let chart = self.chart.lock().await;
                match chart.find_node(id) {
                    Ok(node) => node.operator.clone(),
                    Err(_) => return,
                }
            };
            let outcome = {
                let args = OperatorArgs {
                    node_id: id,
                    operator: &snapshot,
                    inputs,
                    backend: self.backend.as_ref(),
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    outcome = behavior.poll(args) => outcome,
                }
            };
            if token.is_cancelled() {
                return;
            }
            match outcome {
                PollOutcome::Running { progress } => {
                    self.set_progress(id, progress, RunState::Running, &token).await;
                }
                PollOutcome::Success { progress, outputs } => {
                    self.finish_success(id, outputs, Some(progress), &token).await;
                    return;
                }
                PollOutcome::Failure { progress, error } => {
                    self.fail_node(id, Some(progress), error, &token).await;
                    return;
                }
            }
        }
    }

    // --- state application ------------------------------------------------

    /// Record the backend process id on the node
    async fn set_pid(&self, id: NodeId, pid: ProcessId) -> Result<()> {
        let mut chart = self.chart.lock().await;
        let node = chart.find_node_mut(id)?;
        node.operator.pid = Some(pid);
        Ok(())
    }

    /// Update progress (clamped to 100) and state, emitting the right event
    async fn set_progress(&self, id: NodeId, progress: u8, state: RunState, token: &CancelToken) {
        if token.is_cancelled() {
            return;
        }
        let changed = {
            let mut chart = self.chart.lock().await;
            let Ok(node) = chart.find_node_mut(id) else {
                return;
            };
            let changed = node.operator.state != state;
            node.operator.progress = progress.min(100);
            node.operator.state = state;
            changed
        };
        if changed {
            self.emit(ChartEvent::state_changed(id, state, progress.min(100)));
        } else {
            self.emit(ChartEvent::Progress {
                node_id: id,
                progress: progress.min(100),
            });
        }
    }

    /// Keep timing fields in sync with the backend status payload
    async fn record_timing(&self, id: NodeId, start_date: Option<i64>, duration: Option<i64>) {
        let mut chart = self.chart.lock().await;
        let Ok(node) = chart.find_node_mut(id) else {
            return;
        };
        if start_date.is_some() {
            node.operator.last_start = start_date;
        }
        node.operator.duration = duration.or_else(|| {
            node.operator
                .last_start_local
                .map(|started| Utc::now().timestamp() - started)
        });
    }

    /// Bind remote results positionally and complete the run
    async fn finish_remote_success(
        self: &Arc<Self>,
        id: NodeId,
        results: Vec<JobResult>,
        token: &CancelToken,
    ) {
        if token.is_cancelled() {
            return;
        }
        let targets = {
            let mut chart = self.chart.lock().await;
            let Ok(node) = chart.find_node_mut(id) else {
                return;
            };
            for (slot, result) in node.outputs.iter_mut().zip(results) {
                slot.clear();
                slot.rid = Some(result.rid);
            }
            node.operator.state = RunState::Success;
            node.operator.progress = 100;
            chart.propagation_targets(id)
        };
        self.pending.finished(id, token);
        self.emit(ChartEvent::state_changed(id, RunState::Success, 100));
        log::debug!("node {id} completed successfully");
        for target in targets {
            self.notify_connection_update(target).await;
        }
    }

    /// Bind named outputs and complete the run
    ///
    /// `progress` overrides the progress bar; `None` keeps the last
    /// reported value (an ingestion can complete below 100%).
    async fn finish_success(
        self: &Arc<Self>,
        id: NodeId,
        outputs: std::collections::HashMap<String, OutputBinding>,
        progress: Option<u8>,
        token: &CancelToken,
    ) {
        if token.is_cancelled() {
            return;
        }
        let (targets, progress) = {
            let mut chart = self.chart.lock().await;
            let Ok(node) = chart.find_node_mut(id) else {
                return;
            };
            for (name, binding) in outputs {
                let Some(slot) = node.output_mut(&name) else {
                    log::warn!("node {id} has no output '{name}', dropping binding");
                    continue;
                };
                slot.clear();
                match binding {
                    OutputBinding::Value(value) => slot.value = Some(value),
                    OutputBinding::Resource(rid) => slot.rid = Some(rid),
                }
            }
            node.operator.state = RunState::Success;
            if let Some(progress) = progress {
                node.operator.progress = progress.min(100);
            }
            if let Some(started) = node.operator.last_start_local {
                node.operator.duration = Some(Utc::now().timestamp() - started);
            }
            let progress = node.operator.progress;
            (chart.propagation_targets(id), progress)
        };
        self.pending.finished(id, token);
        self.emit(ChartEvent::state_changed(id, RunState::Success, progress));
        log::debug!("node {id} completed successfully");
        for target in targets {
            self.notify_connection_update(target).await;
        }
    }

    /// Terminal failure: keep best-effort progress, stop the poll loop
    async fn fail_node(&self, id: NodeId, progress: Option<u8>, error: String, token: &CancelToken) {
        if token.is_cancelled() {
            return;
        }
        self.pending.finished(id, token);
        let progress = {
            let mut chart = self.chart.lock().await;
            let Ok(node) = chart.find_node_mut(id) else {
                return;
            };
            if let Some(progress) = progress {
                node.operator.progress = progress.min(100);
            }
            node.operator.state = RunState::Failure;
            node.operator.progress
        };
        log::error!("node {id} failed: {error}");
        self.emit(ChartEvent::state_changed(id, RunState::Failure, progress));
        self.emit(ChartEvent::run_failed(id, error));
    }

    /// Apply an `OperatorUpdate` returned by a behavior hook
    async fn apply_update(&self, id: NodeId, update: OperatorUpdate) -> Result<()> {
        let changed = {
            let mut chart = self.chart.lock().await;
            let node = chart.find_node_mut(id)?;
            if update.clear_outputs {
                node.clear_outputs();
            }
            for (name, binding) in update.outputs {
                if let Some(slot) = node.output_mut(&name) {
                    slot.clear();
                    match binding {
                        OutputBinding::Value(value) => slot.value = Some(value),
                        OutputBinding::Resource(rid) => slot.rid = Some(rid),
                    }
                }
            }
            for (name, domain) in update.param_domains {
                if let Some(param) = node.operator.parameter_mut(&name) {
                    param.domain = Some(domain);
                }
            }
            for (name, value) in update.param_values {
                if let Some(param) = node.operator.parameter_mut(&name) {
                    param.value = value;
                }
            }
            if let Some(progress) = update.progress {
                node.operator.progress = progress.min(100);
            }
            match update.state {
                Some(state) if state != node.operator.state => {
                    node.operator.state = state;
                    Some((state, node.operator.progress))
                }
                _ => None,
            }
        };
        if let Some((state, progress)) = changed {
            self.emit(ChartEvent::state_changed(id, state, progress));
        }
        Ok(())
    }

    /// Invoke a node's connection-update hook with fresh inputs
    ///
    /// No-op for nodes without a local behavior; errors are logged, not
    /// propagated (the notification is best-effort by design of the hook).
    async fn notify_connection_update(self: &Arc<Self>, id: NodeId) {
        let Some(behavior) = ({
            let chart = self.chart.lock().await;
            match chart.find_node(id) {
                Ok(node) => self.registry.get_behavior(&node.operator.name),
                Err(_) => None,
            }
        }) else {
            return;
        };
        let (snapshot, inputs) = match self.snapshot_node(id).await {
            Ok(parts) => parts,
            Err(e) => {
                log::warn!("connection update for node {id} skipped: {e}");
                return;
            }
        };
        let update = behavior
            .on_connection_update(OperatorArgs {
                node_id: id,
                operator: &snapshot,
                inputs: &inputs,
                backend: self.backend.as_ref(),
            })
            .await;
        if let Err(e) = self.apply_update(id, update).await {
            log::warn!("connection update for node {id} not applied: {e}");
        }
    }

    /// Snapshot a node's operator and resolve its input values
    async fn snapshot_node(&self, id: NodeId) -> Result<(Operator, InputValues)> {
        let (operator, raw) = {
            let chart = self.chart.lock().await;
            let raw = Self::collect_inputs(&chart, id)?;
            (chart.find_node(id)?.operator.clone(), raw)
        };
        let inputs = self.resolve_inputs(raw).await?;
        Ok((operator, inputs))
    }

    /// Gather each connected input's upstream result reference
    ///
    /// Inputs whose upstream node is not in `success` are skipped: the
    /// absence in the map is the "unavailable" sentinel.
    fn collect_inputs(chart: &Chart, id: NodeId) -> Result<Vec<(String, RawInput)>> {
        let node = chart.find_node(id)?;
        let mut raw = Vec::new();
        for (index, connector) in node.inputs.iter().enumerate() {
            let Some(endpoint) = chart.source_endpoint(id, index) else {
                continue;
            };
            let source = chart.find_node(endpoint.node)?;
            if !source.operator.is_success() {
                continue;
            }
            let slot = source.outputs.get(endpoint.connector).ok_or(
                ChartError::ConnectorNotFound {
                    node: endpoint.node,
                    direction: Direction::Output,
                    index: endpoint.connector,
                },
            )?;
            if let Some(value) = &slot.value {
                raw.push((connector.name.clone(), RawInput::Value(value.clone())));
            } else if let Some(rid) = &slot.rid {
                raw.push((connector.name.clone(), RawInput::Resource(rid.clone())));
            }
        }
        Ok(raw)
    }

    /// Fetch resource-backed inputs and build the final value map
    async fn resolve_inputs(&self, raw: Vec<(String, RawInput)>) -> Result<InputValues> {
        let mut inputs = InputValues::new();
        for (name, input) in raw {
            match input {
                RawInput::Value(value) => inputs.insert(name, value),
                RawInput::Resource(rid) => {
                    inputs.insert(name, self.backend.result_payload(&rid).await?);
                }
            }
        }
        Ok(inputs)
    }
}

/// Serialize parameters and resolved inputs into a job argument map
///
/// Date-typed parameters are converted to epoch milliseconds; metadata
/// filters expand into a list of criterion objects.
fn job_args(
    operator: &Operator,
    inputs: &InputValues,
) -> serde_json::Map<String, serde_json::Value> {
    let mut args = serde_json::Map::new();
    for param in &operator.parameters {
        let Some(value) = &param.value else { continue };
        let encoded = match param.data_type.as_str() {
            "date" => date_to_epoch_ms(value)
                .map(serde_json::Value::from)
                .unwrap_or_else(|| value.clone()),
            "md_filter" => expand_md_filter(value),
            _ => value.clone(),
        };
        args.insert(param.name.clone(), encoded);
    }
    for (name, value) in inputs.iter() {
        args.insert(name.clone(), value.clone());
    }
    args
}

/// Parse a date parameter value into epoch milliseconds
///
/// Accepts an integer (already epoch ms), a string of digits, or a
/// "YYYY-MM-DD HH:MM:SS" timestamp interpreted as UTC.
fn date_to_epoch_ms(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => {
            if let Ok(ms) = s.parse::<i64>() {
                return Some(ms);
            }
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

/// Expand a metadata-filter parameter into criterion objects
///
/// Each entry becomes `{metadataName, comparator, value}`; entries missing
/// a metadata name are dropped.
fn expand_md_filter(value: &serde_json::Value) -> serde_json::Value {
    let Some(entries) = value.as_array() else {
        return value.clone();
    };
    let criteria: Vec<serde_json::Value> = entries
        .iter()
        .filter_map(|entry| {
            let name = entry
                .get("metadataName")
                .or_else(|| entry.get("meta_name"))?
                .clone();
            Some(serde_json::json!({
                "metadataName": name,
                "comparator": entry.get("comparator").cloned().unwrap_or_default(),
                "value": entry.get("value").cloned().unwrap_or_default(),
            }))
        })
        .collect();
    serde_json::Value::Array(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::behavior::RunOutcome;
    use crate::events::VecEventSink;
    use crate::types::{Connector, OperatorKind, Parameter};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn remote_metadata(name: &str, op_id: i64) -> OperatorMetadata {
        OperatorMetadata {
            op_id,
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            family: "Test".to_string(),
            kind: OperatorKind::Remote,
            inputs: vec![Connector::new("TS", "TS list", "ts_list")],
            outputs: vec![Connector::new("out", "Out", "ts_list")],
            parameters: vec![],
        }
    }

    /// Local operator that completes immediately with a fixed value
    struct ConstBehavior {
        value: serde_json::Value,
    }

    #[async_trait]
    impl OperatorBehavior for ConstBehavior {
        fn metadata(&self) -> OperatorMetadata {
            OperatorMetadata {
                op_id: 0,
                name: "const".to_string(),
                label: "Const".to_string(),
                description: String::new(),
                family: "Test".to_string(),
                kind: OperatorKind::Local,
                inputs: vec![],
                outputs: vec![Connector::new("out", "Out", "ts_list")],
                parameters: vec![],
            }
        }

        async fn run(&self, _args: OperatorArgs<'_>) -> RunOutcome {
            RunOutcome::Success {
                outputs: HashMap::from([(
                    "out".to_string(),
                    OutputBinding::Value(self.value.clone()),
                )]),
            }
        }
    }

    /// Const operator whose metadata carries an auto-run parameter
    struct SourceConstBehavior {
        value: serde_json::Value,
    }

    #[async_trait]
    impl OperatorBehavior for SourceConstBehavior {
        fn metadata(&self) -> OperatorMetadata {
            let mut metadata = ConstBehavior {
                value: self.value.clone(),
            }
            .metadata();
            metadata.parameters = vec![Parameter::new("Source", "Source", "ds_list").auto_run()];
            metadata
        }

        async fn run(&self, _args: OperatorArgs<'_>) -> RunOutcome {
            RunOutcome::Success {
                outputs: HashMap::from([(
                    "out".to_string(),
                    OutputBinding::Value(self.value.clone()),
                )]),
            }
        }
    }

    /// Local operator counting its connection-update invocations
    struct CountingBehavior {
        updates: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OperatorBehavior for CountingBehavior {
        fn metadata(&self) -> OperatorMetadata {
            OperatorMetadata {
                op_id: 0,
                name: "counting".to_string(),
                label: "Counting".to_string(),
                description: String::new(),
                family: "Test".to_string(),
                kind: OperatorKind::Local,
                inputs: vec![Connector::new("TS", "TS list", "ts_list")],
                outputs: vec![],
                parameters: vec![],
            }
        }

        async fn on_connection_update(&self, _args: OperatorArgs<'_>) -> OperatorUpdate {
            self.updates.fetch_add(1, Ordering::SeqCst);
            OperatorUpdate::none()
        }

        async fn run(&self, _args: OperatorArgs<'_>) -> RunOutcome {
            RunOutcome::Idle
        }
    }

    async fn build_engine(
        backend: Arc<MockBackend>,
        registry: OperatorRegistry,
    ) -> (Arc<Engine>, Arc<VecEventSink>) {
        let events = Arc::new(VecEventSink::new());
        let engine = Engine::initialize(
            backend,
            Arc::new(registry),
            events.clone(),
            EngineConfig::default(),
        )
        .await
        .unwrap();
        (engine, events)
    }

    async fn wait_for_terminal(engine: &Arc<Engine>, id: NodeId) -> (RunState, u8) {
        for _ in 0..200 {
            let (state, progress) = engine.node_state(id).await.unwrap();
            if state.is_completed() || state == RunState::Idle {
                return (state, progress);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("node {id} never reached a terminal state");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_run_success_binds_rids_positionally() {
        use crate::backend::{JobResult, JobStatus};
        let backend = Arc::new(
            MockBackend::new()
                .with_job_script(vec![JobStatus::Init, JobStatus::Run, JobStatus::AlgoOk])
                .with_job_results(vec![JobResult {
                    rid: "rid-7".to_string(),
                    data_type: "ts_list".to_string(),
                    name: "out".to_string(),
                }]),
        );
        let mut registry = OperatorRegistry::new();
        registry.register_metadata(remote_metadata("kmeans", 42));
        let (engine, _events) = build_engine(backend.clone(), registry).await;

        let id = engine.add_node("kmeans", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();
        // run_node returns immediately with the node already running
        let (state, _) = engine.node_state(id).await.unwrap();
        assert_eq!(state, RunState::Running);

        let (state, progress) = wait_for_terminal(&engine, id).await;
        assert_eq!(state, RunState::Success);
        assert_eq!(progress, 100);

        engine
            .with_chart(|chart| {
                let node = chart.find_node(id).unwrap();
                assert_eq!(node.outputs[0].rid.as_deref(), Some("rid-7"));
                assert!(node.outputs[0].value.is_none());
            })
            .await;
        assert!(!engine.pending().is_pending(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_after_terminal_failure() {
        use crate::backend::JobStatus;
        let backend = Arc::new(MockBackend::new().with_job_script(vec![
            JobStatus::Init,
            JobStatus::Run,
            JobStatus::Run,
            JobStatus::AlgoKo,
        ]));
        let mut registry = OperatorRegistry::new();
        registry.register_metadata(remote_metadata("broken", 1));
        let (engine, events) = build_engine(backend.clone(), registry).await;

        let id = engine.add_node("broken", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();

        let (state, _) = wait_for_terminal(&engine, id).await;
        assert_eq!(state, RunState::Failure);

        // Give a stray timer every chance to fire: poll count must stay 4
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.status_poll_count(), 4);
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, ChartEvent::RunFailed { node_id, .. } if *node_id == id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_during_poll_fails_node() {
        let backend = Arc::new(MockBackend::new().failing_status("connection refused"));
        let mut registry = OperatorRegistry::new();
        registry.register_metadata(remote_metadata("flaky", 2));
        let (engine, _events) = build_engine(backend, registry).await;

        let id = engine.add_node("flaky", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();

        let (state, _) = wait_for_terminal(&engine, id).await;
        assert_eq!(state, RunState::Failure);
        assert!(!engine.pending().is_pending(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_fails_node() {
        let backend = Arc::new(MockBackend::new().failing_submit("quota exceeded"));
        let mut registry = OperatorRegistry::new();
        registry.register_metadata(remote_metadata("quota", 3));
        let (engine, events) = build_engine(backend, registry).await;

        let id = engine.add_node("quota", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();

        let (state, _) = wait_for_terminal(&engine, id).await;
        assert_eq!(state, RunState::Failure);
        assert!(events.events().iter().any(|e| matches!(
            e,
            ChartEvent::RunFailed { error, .. } if error.contains("quota exceeded")
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outputs_cleared_on_rerun() {
        let backend = Arc::new(MockBackend::new());
        let mut registry = OperatorRegistry::new();
        registry.register(Arc::new(ConstBehavior {
            value: serde_json::json!([1, 2, 3]),
        }));
        let (engine, _events) = build_engine(backend, registry).await;

        let id = engine.add_node("const", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();
        let (state, _) = wait_for_terminal(&engine, id).await;
        assert_eq!(state, RunState::Success);

        // Re-run: outputs must be empty the moment the node is running again
        engine.run_node(id).await.unwrap();
        engine
            .with_chart(|chart| {
                let node = chart.find_node(id).unwrap();
                assert!(node.outputs.iter().all(|o| !o.has_result()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_propagates_downstream_once() {
        let backend = Arc::new(MockBackend::new().with_compat(HashMap::new()));
        let updates = Arc::new(AtomicUsize::new(0));
        let mut registry = OperatorRegistry::new();
        registry.register(Arc::new(ConstBehavior {
            value: serde_json::json!([1]),
        }));
        registry.register(Arc::new(CountingBehavior {
            updates: updates.clone(),
        }));
        let (engine, _events) = build_engine(backend, registry).await;

        let a = engine.add_node("const", 0.0, 0.0).await.unwrap();
        let b = engine.add_node("counting", 0.0, 200.0).await.unwrap();
        engine
            .connect(ConnectorRef::output(a, 0), ConnectorRef::input(b, 0))
            .await
            .unwrap();
        // Wiring itself notifies the destination once
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        engine.run_node(a).await.unwrap();
        wait_for_terminal(&engine, a).await;
        // Settle the spawned propagation
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_output_value_gated_on_success() {
        let backend = Arc::new(MockBackend::new());
        let mut registry = OperatorRegistry::new();
        registry.register(Arc::new(ConstBehavior {
            value: serde_json::json!(["a"]),
        }));
        let (engine, _events) = build_engine(backend, registry).await;

        let id = engine.add_node("const", 0.0, 0.0).await.unwrap();
        // Idle node: unavailable sentinel, not an error
        assert_eq!(engine.get_output_value(id, 0).await.unwrap(), None);

        engine.run_node(id).await.unwrap();
        wait_for_terminal(&engine, id).await;
        assert_eq!(
            engine.get_output_value(id, 0).await.unwrap(),
            Some(serde_json::json!(["a"]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_selected_cancels_poll() {
        use crate::backend::JobStatus;
        let backend = Arc::new(
            MockBackend::new().with_job_script(vec![JobStatus::Init; 1000]),
        );
        let mut registry = OperatorRegistry::new();
        registry.register_metadata(remote_metadata("slow", 4));
        let (engine, _events) = build_engine(backend.clone(), registry).await;

        let id = engine.add_node("slow", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(engine.pending().is_pending(id));

        engine
            .with_chart(|chart| chart.find_node_mut(id).unwrap().selected = true)
            .await;
        let deleted = engine.delete_selected().await;
        assert_eq!(deleted, vec![id]);

        let count = backend.status_poll_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        // No further polls after cancellation
        assert_eq!(backend.status_poll_count(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_result_fetch_leaves_node_untouched() {
        use crate::backend::{JobResult, JobStatus};
        let backend = Arc::new(
            MockBackend::new()
                .with_job_script(vec![JobStatus::AlgoOk])
                .with_results_delay(Duration::from_secs(5))
                .with_job_results(vec![JobResult {
                    rid: "rid-9".to_string(),
                    data_type: "ts_list".to_string(),
                    name: "out".to_string(),
                }]),
        );
        let mut registry = OperatorRegistry::new();
        registry.register_metadata(remote_metadata("laggy", 5));
        let (engine, _events) = build_engine(backend.clone(), registry).await;

        let id = engine.add_node("laggy", 0.0, 0.0).await.unwrap();
        engine.run_node(id).await.unwrap();
        // First tick reaches ALGO_OK and enters the stalled result fetch
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(engine.cancel_node(id));

        // When the fetch finally returns, the cancelled loop must neither
        // bind results nor change the node's state
        tokio::time::sleep(Duration::from_secs(10)).await;
        let (state, _) = engine.node_state(id).await.unwrap();
        assert_eq!(state, RunState::Running);
        engine
            .with_chart(|chart| {
                let node = chart.find_node(id).unwrap();
                assert!(node.outputs.iter().all(|o| !o.has_result()));
            })
            .await;
        assert!(!engine.pending().is_pending(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_run_parameter_triggers_run() {
        let backend = Arc::new(MockBackend::new());
        let mut registry = OperatorRegistry::new();
        registry.register(Arc::new(SourceConstBehavior {
            value: serde_json::json!(1),
        }));
        let (engine, _events) = build_engine(backend, registry).await;

        let id = engine.add_node("const", 0.0, 0.0).await.unwrap();
        engine
            .set_parameter(id, "Source", Some(serde_json::json!("ds1")))
            .await
            .unwrap();
        let (state, _) = wait_for_terminal(&engine, id).await;
        assert_eq!(state, RunState::Success);
    }

    #[test]
    fn test_job_args_date_conversion() {
        let mut operator = Operator {
            op_id: 1,
            name: "op".to_string(),
            label: "Op".to_string(),
            description: String::new(),
            family: String::new(),
            kind: OperatorKind::Remote,
            parameters: vec![
                Parameter::new("since", "Since", "date"),
                Parameter::new("k", "K", "number"),
            ],
            progress: 0,
            state: RunState::Idle,
            pid: None,
            last_start: None,
            last_start_local: None,
            duration: None,
        };
        operator.parameter_mut("since").unwrap().value =
            Some(serde_json::json!("2023-11-14 22:13:20"));
        operator.parameter_mut("k").unwrap().value = Some(serde_json::json!(5));

        let args = job_args(&operator, &InputValues::new());
        assert_eq!(args["since"], serde_json::json!(1_700_000_000_000_i64));
        assert_eq!(args["k"], serde_json::json!(5));
    }

    #[test]
    fn test_job_args_md_filter_expansion() {
        let mut operator = Operator {
            op_id: 1,
            name: "op".to_string(),
            label: "Op".to_string(),
            description: String::new(),
            family: String::new(),
            kind: OperatorKind::Remote,
            parameters: vec![Parameter::new("criteria", "Criteria", "md_filter")],
            progress: 0,
            state: RunState::Idle,
            pid: None,
            last_start: None,
            last_start_local: None,
            duration: None,
        };
        operator.parameter_mut("criteria").unwrap().value = Some(serde_json::json!([
            {"meta_name": "flight", "comparator": "=", "value": "AF84"},
            {"comparator": "=", "value": "dropped"}
        ]));

        let args = job_args(&operator, &InputValues::new());
        assert_eq!(
            args["criteria"],
            serde_json::json!([
                {"metadataName": "flight", "comparator": "=", "value": "AF84"}
            ])
        );
    }

    #[test]
    fn test_date_parsing_variants() {
        assert_eq!(
            date_to_epoch_ms(&serde_json::json!(1_700_000_000_000_i64)),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            date_to_epoch_ms(&serde_json::json!("1700000000000")),
            Some(1_700_000_000_000)
        );
        assert_eq!(date_to_epoch_ms(&serde_json::json!("not a date")), None);
    }
}
