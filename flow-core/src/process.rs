//! Process lifecycle: identity, state machine, and the trait every
//! concrete process implementation satisfies.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::CancellationToken;
use crate::port::AnyPort;
use crate::value::DynValue;

/// Identity of a process, unique within the `Network` that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process#{}", self.0)
    }
}

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process id. Used by a `Network` during construction so
/// ids are assigned deterministically in node declaration order.
#[must_use]
pub fn next_process_id() -> ProcessId {
    ProcessId(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
}

/// Errors a process implementation returns from its lifecycle methods.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("initialize failed: {0}")]
    InitializeFailed(String),

    #[error("process loop failed: {0}")]
    Failed(String),

    #[error("no initial value target named port '{port}'")]
    UnknownInitialValueTarget { port: String },

    #[error("initial value for port '{port}' could not be applied: {reason}")]
    InvalidInitialValue { port: String, reason: String },
}

/// The observable lifecycle of a process, owned and driven by its `Network`
/// (spec §4.3). `Error` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Uninitialized,
    Initialized,
    Running,
    ShuttingDown,
    Stopped,
    Error,
}

impl ProcessState {
    /// Whether this is one of the two terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }
}

/// The contract every concrete process implementation satisfies. A `Network`
/// never touches ports directly: all three lifecycle methods are invoked
/// through this trait, in order, exactly once per method per lifecycle.
#[async_trait]
pub trait Process: Send {
    /// Stable identity, assigned at construction.
    fn id(&self) -> ProcessId;

    /// The process's fixed, declared ports. Returned as owned `Arc` handles
    /// (concrete processes hold their ports behind `Arc` for exactly this
    /// reason) so a `Network` can retain its own wiring/closing table
    /// independent of wherever the `Process` trait object itself ends up —
    /// in particular, moved whole into the task that drives `run`. Used by
    /// a `Network` for construction-time validation, wiring, and shutdown;
    /// the set of ports never changes after construction.
    fn ports(&self) -> Vec<Arc<dyn AnyPort>>;

    /// Acquire resources, prepare internal state. Must not perform any
    /// normal-packet I/O. May fail, aborting network startup.
    async fn initialize(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError>;

    /// Deliver one declared initial value to `port`, before `run` starts.
    /// A process with no initial value on `port` should not override this;
    /// the default rejects delivery so a misconfigured flow surfaces as a
    /// startup error rather than a silently-dropped IIP.
    async fn deliver_initial_value(
        &mut self,
        port: &str,
        value: DynValue,
        ctx: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let _ = (value, ctx);
        Err(ProcessError::UnknownInitialValueTarget { port: port.to_string() })
    }

    /// The main loop. Reads inputs, writes outputs, suspends on port
    /// operations. Returns when the process voluntarily terminates, when
    /// its inputs are exhausted, or when `ctx` is cancelled.
    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError>;

    /// Release resources. Invoked exactly once per lifecycle, including on
    /// every error path, as long as `initialize` was reached.
    async fn shutdown(&mut self, ctx: &CancellationToken);
}
