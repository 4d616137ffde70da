//! The caller-facing flow lifecycle (spec §6): `create`/`start`/`stop`/
//! `delete`/`status`, keyed by flow id. Each flow is backed by one
//! `Network`; this module adds the two transient states (`Starting`,
//! `Stopping`) a caller observes around a `Network`'s own `Created ->
//! Running -> Stopped`/`Error` machine.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::config::FlowConfig;
use crate::error::{ConfigError, ErrorDetail, NetworkError};
use crate::network::{Network, NetworkOptions, NetworkResult};
use crate::observability::NetworkObserver;
use crate::registry::ProcessRegistry;

/// The six states spec §6 lists as observable to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// `create`/`delete` failures: either `create`'s own validation, or asking
/// for an id that is not (or no longer) known.
#[derive(Debug, Clone, Error)]
pub enum FlowManagerError {
    #[error("flow id '{0}' is already in use")]
    DuplicateId(String),

    #[error("no flow with id '{0}'")]
    UnknownId(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

struct FlowEntry {
    network: Arc<Network>,
    status: Mutex<FlowStatus>,
    last_error: Mutex<Option<ErrorDetail>>,
}

/// A live view of one flow's state, returned by `status`.
#[derive(Debug, Clone)]
pub struct FlowStatusReport {
    pub status: FlowStatus,
    pub last_error: Option<ErrorDetail>,
}

/// Owns every flow created through this facade. One `ProcessRegistry` is
/// shared across every flow it constructs, mirroring spec §6's registry
/// being an external collaborator rather than per-network state.
pub struct FlowManager {
    registry: Arc<ProcessRegistry>,
    observer: Arc<dyn NetworkObserver>,
    flows: DashMap<String, Arc<FlowEntry>>,
}

impl FlowManager {
    #[must_use]
    pub fn new(registry: Arc<ProcessRegistry>, observer: Arc<dyn NetworkObserver>) -> Self {
        Self { registry, observer, flows: DashMap::new() }
    }

    /// Construct a `Network` from `config` and register it under
    /// `config.id` in state `Created`. Fails with the same `ConfigError`
    /// variants `Network::construct` does; never retried (spec §7).
    pub fn create(&self, config: &FlowConfig, options: NetworkOptions) -> Result<(), FlowManagerError> {
        match self.flows.entry(config.id.clone()) {
            Entry::Occupied(_) => Err(FlowManagerError::DuplicateId(config.id.clone())),
            Entry::Vacant(slot) => {
                let network = Network::construct(config, &self.registry, self.observer.clone(), options)?;
                slot.insert(Arc::new(FlowEntry {
                    network: Arc::new(network),
                    status: Mutex::new(FlowStatus::Created),
                    last_error: Mutex::new(None),
                }));
                Ok(())
            }
        }
    }

    fn entry(&self, id: &str) -> Result<Arc<FlowEntry>, FlowManagerError> {
        self.flows.get(id).map(|e| e.clone()).ok_or_else(|| FlowManagerError::UnknownId(id.to_string()))
    }

    /// Start the flow `id` (spec §6): `Created -> Starting`, then, once
    /// `Network::start` returns, either `Running` or `Error`. Once running,
    /// a detached task drives the network to completion and records its
    /// terminal `Stopped`/`Error` status without the caller blocking on it.
    pub async fn start(&self, id: &str) -> Result<(), FlowManagerError> {
        let entry = self.entry(id)?;
        set_status(&entry, FlowStatus::Starting);

        if let Err(err) = entry.network.start().await {
            record_error(&entry, &err);
            set_status(&entry, FlowStatus::Error);
            return Ok(());
        }

        set_status(&entry, FlowStatus::Running);

        let entry_for_task = entry.clone();
        compio::runtime::spawn(async move {
            let result = entry_for_task.network.run_until_stopped().await;
            match result {
                NetworkResult::Stopped => set_status(&entry_for_task, FlowStatus::Stopped),
                NetworkResult::Error { first, .. } => {
                    record_error(&entry_for_task, &first);
                    set_status(&entry_for_task, FlowStatus::Error);
                }
            }
        })
        .detach();

        Ok(())
    }

    /// Request that the flow `id` stop (spec §6's `stop` command). Purely a
    /// signal: cancellation propagates asynchronously, and the task spawned
    /// by `start` records the eventual `Stopped`/`Error` status.
    pub fn stop(&self, id: &str) -> Result<(), FlowManagerError> {
        let entry = self.entry(id)?;
        let current = *entry.status.lock().expect("flow status lock poisoned");
        if matches!(current, FlowStatus::Starting | FlowStatus::Running) {
            set_status(&entry, FlowStatus::Stopping);
        }
        entry.network.cancel();
        Ok(())
    }

    /// Forget a flow. Cancels it first if it is still live; does not wait
    /// for shutdown to complete (spec §6 has no persisted state to clean up
    /// beyond this facade's own bookkeeping).
    pub fn delete(&self, id: &str) -> Result<(), FlowManagerError> {
        let (_, entry) = self.flows.remove(id).ok_or_else(|| FlowManagerError::UnknownId(id.to_string()))?;
        entry.network.cancel();
        Ok(())
    }

    /// Current status and, if the flow ever reported one, its last error
    /// rendered as `{code, message, details}` (spec §6).
    pub fn status(&self, id: &str) -> Result<FlowStatusReport, FlowManagerError> {
        let entry = self.entry(id)?;
        let status = *entry.status.lock().expect("flow status lock poisoned");
        let last_error = entry.last_error.lock().expect("flow error lock poisoned").clone();
        Ok(FlowStatusReport { status, last_error })
    }
}

fn set_status(entry: &FlowEntry, status: FlowStatus) {
    *entry.status.lock().expect("flow status lock poisoned") = status;
}

fn record_error(entry: &FlowEntry, err: &NetworkError) {
    *entry.last_error.lock().expect("flow error lock poisoned") = Some(ErrorDetail::from(err));
}
