//! Information Packets (IPs): the typed, owned data units that flow through
//! connections.
//!
//! An IP carries either a data payload (`Normal`/`InitialValue`) or no
//! payload at all (`OpenBracket`/`CloseBracket`, used to delimit substreams —
//! see [`crate::bracket`]). Ownership of an IP is tracked explicitly so that
//! at any instant exactly one process is responsible for it; `acquire`/
//! `release` are the only operations that move that marker.

use std::collections::HashMap;

use crate::process::ProcessId;

/// The kind of payload an [`InformationPacket`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpKind {
    /// Ordinary data packet produced during normal operation.
    Normal,
    /// A one-shot packet delivered before normal traffic, from a process's
    /// declared initial values.
    InitialValue,
    /// Opens a substream; carries no data.
    OpenBracket,
    /// Closes a substream; carries no data.
    CloseBracket,
}

impl IpKind {
    /// Whether this kind is expected to carry a `data` payload.
    #[must_use]
    pub const fn carries_data(self) -> bool {
        matches!(self, Self::Normal | Self::InitialValue)
    }
}

/// Opaque metadata value attached to an IP (creation time, origin process,
/// routing hints, ...). Kept intentionally small and untyped so the core
/// does not need to know what hosts want to stash here.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

/// A discrete, typed data unit flowing between ports.
///
/// `T` is the carrier type negotiated by the two ports a connection binds;
/// bracket IPs are constructed without a `data` value regardless of `T`.
#[derive(Debug)]
pub struct InformationPacket<T> {
    kind: IpKind,
    data: Option<T>,
    metadata: HashMap<String, MetaValue>,
    owner: Option<ProcessId>,
}

impl<T> InformationPacket<T> {
    /// Construct a `Normal` IP carrying `data`.
    #[must_use]
    pub fn new(data: T) -> Self {
        Self::with_kind(IpKind::Normal, Some(data))
    }

    /// Construct an `InitialValue` IP carrying `data`.
    #[must_use]
    pub fn initial_value(data: T) -> Self {
        Self::with_kind(IpKind::InitialValue, Some(data))
    }

    /// Construct an `OpenBracket` IP (no payload).
    #[must_use]
    pub fn open_bracket() -> Self {
        Self::with_kind(IpKind::OpenBracket, None)
    }

    /// Construct a `CloseBracket` IP (no payload).
    #[must_use]
    pub fn close_bracket() -> Self {
        Self::with_kind(IpKind::CloseBracket, None)
    }

    fn with_kind(kind: IpKind, data: Option<T>) -> Self {
        debug_assert_eq!(kind.carries_data(), data.is_some());
        Self {
            kind,
            data,
            metadata: HashMap::new(),
            owner: None,
        }
    }

    /// The packet's type tag.
    #[must_use]
    pub const fn kind(&self) -> IpKind {
        self.kind
    }

    /// Whether this packet is a bracket (`OpenBracket`/`CloseBracket`).
    #[must_use]
    pub const fn is_bracket(&self) -> bool {
        matches!(self.kind, IpKind::OpenBracket | IpKind::CloseBracket)
    }

    /// Borrow the payload. `None` for bracket IPs.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Consume the packet, returning its payload. `None` for bracket IPs.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Read a metadata value, if present.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    /// Write a metadata value. Last write wins.
    pub fn set_meta(&mut self, key: impl Into<String>, value: MetaValue) {
        self.metadata.insert(key.into(), value);
    }

    /// The process currently marked as owning this packet, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<ProcessId> {
        self.owner
    }

    /// Mark `process` as the new owner of this packet.
    ///
    /// Called by a receiver immediately after taking the packet off a
    /// connection; never call this while the packet is still enqueued.
    pub fn acquire(&mut self, process: ProcessId) {
        self.owner = Some(process);
    }

    /// Clear the owner marker.
    ///
    /// Called on send (the packet is about to be handed to a connection, no
    /// longer belongs to the sender) or on drop.
    pub fn release(&mut self) {
        self.owner = None;
    }
}
