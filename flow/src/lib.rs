//! Flow
//!
//! The orchestrator built on top of `flow-core`'s primitives:
//! - Declarative, format-agnostic configuration (`config`)
//! - Process type lookup (`registry`)
//! - The construct/start/run-to-completion orchestrator (`network`)
//! - Restart-with-backoff supervision policies (`supervision`)
//! - The advisory deadlock watchdog (`watchdog`)
//! - Event observation (`observability`)
//! - The caller-facing create/start/stop/delete/status facade (`lifecycle`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod network;
pub mod observability;
pub mod registry;
pub mod supervision;
pub mod watchdog;

pub mod prelude {
    pub use crate::config::{EdgeSpec, FlowConfig, NodeSpec, PortRef};
    pub use crate::error::{ConfigError, ErrorDetail, NetworkError};
    pub use crate::lifecycle::{FlowManager, FlowManagerError, FlowStatus, FlowStatusReport};
    pub use crate::network::{Network, NetworkOptions, NetworkResult, NetworkState};
    pub use crate::observability::{NetworkEvent, NetworkObserver, TracingObserver};
    pub use crate::registry::{ProcessFactory, ProcessRegistry};
    pub use crate::supervision::{RestartPolicy, RestartState};
    pub use crate::watchdog::SuspicionFlag;
}
