//! External process type registry (spec §6), a dependency passed into a
//! `Network` rather than a process-wide singleton, so tests can install a
//! dedicated registry (spec §9 Design Notes).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use flow_core::process::Process;

use crate::config::ProcessConfig;
use crate::error::ConfigError;

/// A process factory: takes a node's configuration, returns a fresh
/// process instance or a human-readable failure message.
pub type ProcessFactory = Arc<dyn Fn(ProcessConfig) -> Result<Box<dyn Process>, String> + Send + Sync>;

/// Maps process type names to factories. `register`/`lookup` are the only
/// operations spec §6 requires.
#[derive(Default)]
pub struct ProcessRegistry {
    factories: DashMap<String, ProcessFactory>,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { factories: DashMap::new() }
    }

    /// Register `factory` under `name`. Idempotent only if `name` is
    /// already bound to the exact same factory (`Arc::ptr_eq`); binding a
    /// different factory to a name already in use fails.
    pub fn register(&self, name: impl Into<String>, factory: ProcessFactory) -> Result<(), ConfigError> {
        let name = name.into();
        match self.factories.entry(name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(factory);
                Ok(())
            }
            Entry::Occupied(slot) => {
                if Arc::ptr_eq(slot.get(), &factory) {
                    Ok(())
                } else {
                    Err(ConfigError::DuplicateProcessType { name })
                }
            }
        }
    }

    /// Look up the factory registered for `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ProcessFactory> {
        self.factories.get(name).map(|entry| entry.value().clone())
    }
}
