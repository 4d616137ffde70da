//! The orchestrator (spec §4.5): constructs a live graph from a declarative
//! configuration, runs it concurrently, and guarantees teardown. This is
//! the hardest and largest part of the crate.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;

use flow_core::context::CancellationToken;
use flow_core::port::{AnyPort, Direction};
use flow_core::process::{next_process_id, Process, ProcessError, ProcessId};

use crate::config::{json_to_dyn_value, FlowConfig};
use crate::error::{ConfigError, NetworkError};
use crate::observability::{NetworkEvent, NetworkObserver};
use crate::registry::ProcessRegistry;
use crate::supervision::{RestartPolicy, RestartState};
use crate::watchdog::SuspicionFlag;

const DEFAULT_CAPACITY: usize = 1;
const DEFAULT_IIP_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);
const DEFAULT_WATCHDOG_POLL: Duration = Duration::from_millis(250);

/// Internal lifecycle state of a `Network` (spec §3): `Created -> Running ->
/// Stopped`, or `Error`. The externally observable six-state machine of
/// spec §6 (including the transient `Starting`/`Stopping`) belongs to
/// `crate::lifecycle::Flow`, which wraps one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Created,
    Running,
    Stopped,
    Error,
}

/// The single post-run result of a `Network` (spec §4.5.5).
#[derive(Debug)]
pub enum NetworkResult {
    Stopped,
    Error { first: NetworkError, others: Vec<NetworkError> },
}

struct TaskOutcome {
    node: String,
    process: Box<dyn Process>,
    result: Result<(), ProcessError>,
    panicked: bool,
}

/// Tuning knobs with spec-suggested defaults (§4.5.2's 1s IIP timeout,
/// §4.5.3's 5s shutdown deadline, §9's 2s watchdog threshold).
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub iip_timeout: Duration,
    pub shutdown_deadline: Duration,
    pub watchdog_threshold: Option<Duration>,
    /// Per-node restart policy (spec §7). A node with no entry here falls
    /// back to `RestartPolicy::Never`: its first Error/Fatal failure is
    /// terminal for the whole network.
    pub restart_policies: HashMap<String, RestartPolicy>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            iip_timeout: DEFAULT_IIP_TIMEOUT,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
            watchdog_threshold: Some(Duration::from_secs(2)),
            restart_policies: HashMap::new(),
        }
    }
}

/// The running (or not-yet-started) instantiation of one `FlowConfig`.
pub struct Network {
    id: String,
    ctx: CancellationToken,
    options: NetworkOptions,
    observer: Arc<dyn NetworkObserver>,
    state: Mutex<NetworkState>,
    process_ids: HashMap<String, ProcessId>,
    ports_by_node: HashMap<String, Vec<Arc<dyn AnyPort>>>,
    initial_values: HashMap<String, Vec<(String, flow_core::value::DynValue)>>,
    processes: Mutex<HashMap<String, Box<dyn Process>>>,
    completion_tx: flume::Sender<TaskOutcome>,
    completion_rx: flume::Receiver<TaskOutcome>,
    suspicion_flags: Mutex<HashMap<String, Arc<SuspicionFlag>>>,
    restart_states: Mutex<HashMap<String, RestartState>>,
}

impl Network {
    /// Construct (but do not start) a `Network` from `config`, validating
    /// every rule spec §4.5.1 lists. All seven checks must pass before any
    /// process is wired together.
    pub fn construct(
        config: &FlowConfig,
        registry: &ProcessRegistry,
        observer: Arc<dyn NetworkObserver>,
        options: NetworkOptions,
    ) -> Result<Self, ConfigError> {
        // Rule 7 + instantiate: every node's process type must be registered.
        let mut processes: HashMap<String, Box<dyn Process>> = HashMap::new();
        for (node_id, node_spec) in &config.nodes {
            let factory = registry
                .lookup(&node_spec.kind)
                .ok_or_else(|| ConfigError::UnknownProcessType { node: node_id.clone(), kind: node_spec.kind.clone() })?;
            let process = factory(node_spec.config.clone()).map_err(|message| ConfigError::FactoryFailed {
                node: node_id.clone(),
                kind: node_spec.kind.clone(),
                message,
            })?;
            processes.insert(node_id.clone(), process);
        }

        // Deterministic ids in the configuration's node iteration order
        // (lexicographic, since `nodes` is a `BTreeMap`).
        let mut process_ids = HashMap::new();
        for node_id in config.nodes.keys() {
            process_ids.insert(node_id.clone(), next_process_id());
        }

        // Ports indexed by (node, port name); rule 1/2 fail as soon as an
        // edge or initial value names something outside this index.
        let mut port_index: HashMap<(String, String), Arc<dyn AnyPort>> = HashMap::new();
        let mut ports_by_node: HashMap<String, Vec<Arc<dyn AnyPort>>> = HashMap::new();
        for (node_id, process) in &processes {
            let ports = process.ports();
            for port in &ports {
                port_index.insert((node_id.clone(), port.name().to_string()), port.clone());
            }
            ports_by_node.insert(node_id.clone(), ports);
        }

        let resolve = |node: &str, port: &str| -> Result<Arc<dyn AnyPort>, ConfigError> {
            if !processes.contains_key(node) {
                return Err(ConfigError::UnknownNode { node: node.to_string() });
            }
            port_index
                .get(&(node.to_string(), port.to_string()))
                .cloned()
                .ok_or_else(|| ConfigError::UnknownPort { node: node.to_string(), port: port.to_string() })
        };

        // Rules 3/4/5: direction, carrier type, arity (edges only; initial
        // values are folded in below since each one reserves a slot too).
        let mut bound_count: HashMap<(String, String), usize> = HashMap::new();
        for edge in &config.edges {
            let from_port = resolve(&edge.from.node, &edge.from.port)?;
            let to_port = resolve(&edge.to.node, &edge.to.port)?;
            if from_port.direction() != Direction::Output {
                return Err(ConfigError::SourceNotOutput { node: edge.from.node.clone(), port: edge.from.port.clone() });
            }
            if to_port.direction() != Direction::Input {
                return Err(ConfigError::SinkNotInput { node: edge.to.node.clone(), port: edge.to.port.clone() });
            }
            if from_port.carrier_type_name() != to_port.carrier_type_name() {
                return Err(ConfigError::CarrierTypeMismatch {
                    from_node: edge.from.node.clone(),
                    from_port: edge.from.port.clone(),
                    to_node: edge.to.node.clone(),
                    to_port: edge.to.port.clone(),
                    expected: from_port.carrier_type_name(),
                    actual: to_port.carrier_type_name(),
                });
            }
            *bound_count.entry((edge.from.node.clone(), edge.from.port.clone())).or_insert(0) += 1;
            *bound_count.entry((edge.to.node.clone(), edge.to.port.clone())).or_insert(0) += 1;
        }

        // Initial values: target must exist, be an input, and reserves one
        // binding slot (spec §9 Open Question: delivered as if over a
        // one-shot connection).
        let mut initial_values: HashMap<String, Vec<(String, flow_core::value::DynValue)>> = HashMap::new();
        for (node_id, node_spec) in &config.nodes {
            for (port_name, json_value) in &node_spec.initial_values {
                let port = resolve(node_id, port_name)?;
                if port.direction() != Direction::Input {
                    return Err(ConfigError::InitialValueTargetNotInput { node: node_id.clone(), port: port_name.clone() });
                }
                *bound_count.entry((node_id.clone(), port_name.clone())).or_insert(0) += 1;
                initial_values
                    .entry(node_id.clone())
                    .or_default()
                    .push((port_name.clone(), json_to_dyn_value(json_value)));
            }
        }

        for ((node, port), count) in &bound_count {
            let max = port_index[&(node.clone(), port.clone())].max_connections();
            if *count > max {
                return Err(ConfigError::ArityExceeded { node: node.clone(), port: port.clone(), max });
            }
        }

        // Rule 6: every required port is connected or will receive an IIP.
        for (node_id, ports) in &ports_by_node {
            for port in ports {
                if port.required() && bound_count.get(&(node_id.clone(), port.name().to_string())).copied().unwrap_or(0) == 0 {
                    return Err(ConfigError::RequiredPortUnsatisfied { node: node_id.clone(), port: port.name().to_string() });
                }
            }
        }

        // Wiring: create one connection per edge, bind both ends.
        for edge in &config.edges {
            let from_port = &port_index[&(edge.from.node.clone(), edge.from.port.clone())];
            let to_port = &port_index[&(edge.to.node.clone(), edge.to.port.clone())];
            let capacity = edge.capacity.unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).expect("1 is nonzero"));
            let connection = from_port.new_connection(capacity);
            from_port
                .bind_erased(connection.clone())
                .expect("direction, carrier type and arity were already validated above");
            to_port
                .bind_erased(connection)
                .expect("direction, carrier type and arity were already validated above");
        }

        let (completion_tx, completion_rx) = flume::unbounded();

        let restart_states = process_ids
            .keys()
            .map(|node| {
                let policy = options.restart_policies.get(node).cloned().unwrap_or_default();
                (node.clone(), RestartState::new(policy))
            })
            .collect();

        Ok(Self {
            id: config.id.clone(),
            ctx: CancellationToken::new(),
            options,
            observer,
            state: Mutex::new(NetworkState::Created),
            process_ids,
            ports_by_node,
            initial_values,
            processes: Mutex::new(processes),
            completion_tx,
            completion_rx,
            suspicion_flags: Mutex::new(HashMap::new()),
            restart_states: Mutex::new(restart_states),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> NetworkState {
        *self.state.lock().expect("network state lock poisoned")
    }

    #[must_use]
    pub fn context(&self) -> CancellationToken {
        self.ctx.clone()
    }

    #[must_use]
    pub fn process_id(&self, node: &str) -> Option<ProcessId> {
        self.process_ids.get(node).copied()
    }

    /// Request cancellation from the outside (spec §4.5.3, §5).
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// A node's deadlock-watchdog suspicion flag, created on first request.
    /// A process implementation that wants to participate toggles it
    /// around its own suspension points (spec §9's watchdog is opt-in and
    /// purely advisory — see `crate::watchdog`).
    #[must_use]
    pub fn suspicion_flag(&self, node: &str) -> Arc<SuspicionFlag> {
        self.suspicion_flags
            .lock()
            .expect("suspicion flag lock poisoned")
            .entry(node.to_string())
            .or_insert_with(|| Arc::new(SuspicionFlag::new()))
            .clone()
    }

    fn set_state(&self, to: NetworkState) {
        let mut state = self.state.lock().expect("network state lock poisoned");
        let from = *state;
        *state = to;
        self.observer.observe(NetworkEvent::NetworkStateChanged { from: state_name(from), to: state_name(to) });
    }

    /// Startup protocol (spec §4.5.2): initialize every process, deliver
    /// every declared initial value, then spawn each process on its own
    /// task. Rolls back (`shutdown` on every already-initialized process)
    /// and returns the first error on any failure.
    pub async fn start(&self) -> Result<(), NetworkError> {
        let mut processes = self.processes.lock().expect("process table lock poisoned");
        let mut initialized: Vec<String> = Vec::new();

        for (node, process) in processes.iter_mut() {
            if let Err(source) = process.initialize(&self.ctx).await {
                self.observer.observe(NetworkEvent::Reported {
                    node: Some(node.clone()),
                    severity: flow_core::error::Severity::Error,
                    message: source.to_string(),
                });
                let err = NetworkError::InitializeFailed { node: node.clone(), source };
                self.rollback(&mut processes, &initialized).await;
                self.set_state(NetworkState::Error);
                return Err(err);
            }
            initialized.push(node.clone());
            self.observer.observe(NetworkEvent::ProcessStateChanged {
                node: node.clone(),
                from: "Uninitialized",
                to: "Initialized",
            });
        }

        for (node, entries) in &self.initial_values {
            let process = processes.get_mut(node).expect("initial value target was validated at construction");
            for (port, value) in entries {
                let delivery = process.deliver_initial_value(port, value.clone(), &self.ctx);
                match compio::time::timeout(self.options.iip_timeout, delivery).await {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => {
                        let err = NetworkError::InitialValueFailed { node: node.clone(), port: port.clone(), source };
                        self.rollback(&mut processes, &initialized).await;
                        self.set_state(NetworkState::Error);
                        return Err(err);
                    }
                    Err(_elapsed) => {
                        let err = NetworkError::InitialValueTimeout {
                            node: node.clone(),
                            port: port.clone(),
                            millis: self.options.iip_timeout.as_millis() as u64,
                        };
                        self.rollback(&mut processes, &initialized).await;
                        self.set_state(NetworkState::Error);
                        return Err(err);
                    }
                }
            }
        }

        for node in self.process_ids.keys() {
            let process = processes.remove(node).expect("every node has a process instance");
            self.observer.observe(NetworkEvent::ProcessStateChanged {
                node: node.clone(),
                from: "Initialized",
                to: "Running",
            });
            self.spawn(node.clone(), process);
        }

        if let Some(threshold) = self.options.watchdog_threshold {
            let flags: Vec<(String, Arc<SuspicionFlag>)> = self
                .suspicion_flags
                .lock()
                .expect("suspicion flag lock poisoned")
                .iter()
                .map(|(node, flag)| (node.clone(), flag.clone()))
                .collect();
            let observer = self.observer.clone();
            let ctx = self.ctx.clone();
            compio::runtime::spawn(async move {
                crate::watchdog::run(flags, threshold, DEFAULT_WATCHDOG_POLL, observer, ctx).await;
            })
            .detach();
        }

        self.set_state(NetworkState::Running);
        Ok(())
    }

    async fn rollback(&self, processes: &mut HashMap<String, Box<dyn Process>>, initialized: &[String]) {
        for node in initialized {
            if let Some(process) = processes.get_mut(node) {
                process.shutdown(&self.ctx).await;
            }
        }
    }

    /// Spawn `process` on its own task, reporting its outcome back over
    /// `completion_tx`. A panic inside `run` is caught and reported as a
    /// `TaskOutcome` with `panicked: true` rather than unwinding the task.
    fn spawn(&self, node: String, mut process: Box<dyn Process>) {
        let ctx = self.ctx.clone();
        let tx = self.completion_tx.clone();
        compio::runtime::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(process.run(&ctx)).catch_unwind().await;
            let (result, panicked) = match outcome {
                Ok(result) => (result, false),
                Err(_) => (Err(ProcessError::Failed("process panicked".to_string())), true),
            };
            let _ = tx.send_async(TaskOutcome { node, process, result, panicked }).await;
        })
        .detach();
    }

    /// Given a failed `TaskOutcome`, either restart the node in place (spec
    /// §7's opt-in supervision) and return `None`, or hand the outcome back
    /// unchanged for the caller to treat as finished/fatal.
    async fn try_restart(&self, outcome: TaskOutcome) -> Option<TaskOutcome> {
        if outcome.result.is_ok() {
            return Some(outcome);
        }

        let eligible =
            self.restart_states.lock().expect("restart state lock poisoned").get(&outcome.node).is_some_and(RestartState::can_restart);
        if !eligible {
            return Some(outcome);
        }

        let TaskOutcome { node, mut process, result, panicked } = outcome;
        let source = result.expect_err("checked above");

        let delay = self
            .restart_states
            .lock()
            .expect("restart state lock poisoned")
            .get_mut(&node)
            .expect("eligibility was just checked")
            .next_delay();

        self.observer.observe(NetworkEvent::Reported {
            node: Some(node.clone()),
            severity: flow_core::error::Severity::Warning,
            message: format!("restarting after failure (waiting {delay:?}): {source}"),
        });

        futures::select! {
            () = compio::time::sleep(delay).fuse() => {}
            () = self.ctx.cancelled().fuse() => {
                return Some(TaskOutcome { node, process, result: Err(source), panicked });
            }
        }

        if let Err(init_err) = process.initialize(&self.ctx).await {
            return Some(TaskOutcome { node, process, result: Err(init_err), panicked: false });
        }

        self.observer.observe(NetworkEvent::ProcessStateChanged { node: node.clone(), from: "Error", to: "Running" });
        self.spawn(node, process);
        None
    }

    /// Drive the network to completion: waits for termination detection
    /// (spec §4.5.3), then runs the full teardown sequence, and returns the
    /// single post-run result (spec §4.5.5).
    pub async fn run_until_stopped(&self) -> NetworkResult {
        let total = self.process_ids.len();
        let mut finished: HashMap<String, TaskOutcome> = HashMap::new();
        let mut fatal: Option<NetworkError> = None;

        while finished.len() < total && fatal.is_none() {
            futures::select! {
                outcome = self.completion_rx.recv_async().fuse() => {
                    match outcome {
                        Ok(outcome) => {
                            let Some(outcome) = self.try_restart(outcome).await else { continue };
                            if let Err(source) = &outcome.result {
                                fatal = Some(if outcome.panicked {
                                    NetworkError::ProcessPanicked { node: outcome.node.clone(), message: source.to_string() }
                                } else {
                                    NetworkError::ProcessFailed { node: outcome.node.clone(), source: source.clone() }
                                });
                                self.observer.observe(NetworkEvent::ProcessStateChanged {
                                    node: outcome.node.clone(),
                                    from: "Running",
                                    to: "Error",
                                });
                            } else {
                                self.observer.observe(NetworkEvent::ProcessStateChanged {
                                    node: outcome.node.clone(),
                                    from: "Running",
                                    to: "Stopped",
                                });
                            }
                            finished.insert(outcome.node.clone(), outcome);
                        }
                        Err(_) => break,
                    }
                }
                () = self.ctx.cancelled().fuse() => break,
            }
        }

        // Entering the (unstored, transient) Stopping behaviour: unblock
        // every suspended port operation and stop accepting new sends.
        self.ctx.cancel();
        for ports in self.ports_by_node.values() {
            for port in ports {
                if port.direction() == Direction::Output {
                    port.close();
                }
            }
        }

        if finished.len() < total {
            let deadline = self.options.shutdown_deadline;
            let _ = compio::time::timeout(deadline, async {
                while finished.len() < total {
                    match self.completion_rx.recv_async().await {
                        Ok(outcome) => {
                            if fatal.is_none() {
                                if let Err(source) = &outcome.result {
                                    fatal = Some(if outcome.panicked {
                                        NetworkError::ProcessPanicked { node: outcome.node.clone(), message: source.to_string() }
                                    } else {
                                        NetworkError::ProcessFailed { node: outcome.node.clone(), source: source.clone() }
                                    });
                                }
                            }
                            finished.insert(outcome.node.clone(), outcome);
                        }
                        Err(_) => break,
                    }
                }
            })
            .await;
        }

        let mut others = Vec::new();
        if finished.len() < total {
            others.push(NetworkError::ShutdownTimedOut { millis: self.options.shutdown_deadline.as_millis() as u64 });
        }

        for outcome in finished.values_mut() {
            outcome.process.shutdown(&self.ctx).await;
        }

        let fatal_node = fatal.as_ref().and_then(NetworkError::node).map(str::to_string);
        for outcome in finished.values() {
            if Some(outcome.node.as_str()) == fatal_node.as_deref() {
                continue;
            }
            if let Err(source) = &outcome.result {
                others.push(if outcome.panicked {
                    NetworkError::ProcessPanicked { node: outcome.node.clone(), message: source.to_string() }
                } else {
                    NetworkError::ProcessFailed { node: outcome.node.clone(), source: source.clone() }
                });
            }
        }

        match fatal {
            Some(first) => {
                self.set_state(NetworkState::Error);
                self.observer.observe(NetworkEvent::Reported {
                    node: first.node().map(str::to_string),
                    severity: first.severity(),
                    message: first.to_string(),
                });
                NetworkResult::Error { first, others }
            }
            None => {
                self.set_state(NetworkState::Stopped);
                NetworkResult::Stopped
            }
        }
    }
}

const fn state_name(state: NetworkState) -> &'static str {
    match state {
        NetworkState::Created => "Created",
        NetworkState::Running => "Running",
        NetworkState::Stopped => "Stopped",
        NetworkState::Error => "Error",
    }
}
