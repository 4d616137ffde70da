//! Flow Core
//!
//! Runtime-agnostic FBP primitives:
//! - Typed data units flowing between ports (`ip`)
//! - Bounded, ordered queues carrying them (`connection`)
//! - Named, typed, directional endpoints (`port`)
//! - Process identity and lifecycle contract (`process`)
//! - Bracket-depth tracking for substreams (`bracket`)
//! - Cooperative shutdown signalling (`context`)
//! - Opaque initial-value payloads (`value`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod bracket;
pub mod connection;
pub mod context;
pub mod error;
pub mod ip;
pub mod port;
pub mod process;
pub mod value;

pub mod prelude {
    pub use crate::bracket::BracketTracker;
    pub use crate::connection::Connection;
    pub use crate::context::CancellationToken;
    pub use crate::error::{ConnectionError, PollError, PortError, ProtocolError, Severity};
    pub use crate::ip::{InformationPacket, IpKind, MetaValue};
    pub use crate::port::{AnyPort, Direction, ErasedConnection, InputPort, OutputPort};
    pub use crate::process::{next_process_id, Process, ProcessError, ProcessId, ProcessState};
    pub use crate::value::DynValue;
}
