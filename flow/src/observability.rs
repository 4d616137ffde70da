//! The hook point spec §1 reserves for metrics/tracing exporters (out of
//! scope for this crate to implement, in scope to expose). The default
//! observer forwards every event to `tracing`; callers may supply their
//! own to fan events out elsewhere, without this crate depending on any
//! particular metrics backend.

use std::fmt;

use flow_core::error::Severity;

/// One observable occurrence during a network's lifetime.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A node transitioned between `flow_core::process::ProcessState`s.
    ProcessStateChanged { node: String, from: &'static str, to: &'static str },
    /// An error or warning surfaced at the given severity (spec §4.5.5).
    Reported { node: Option<String>, severity: Severity, message: String },
    /// The watchdog observed every process suspended on port I/O.
    SuspectedDeadlock { nodes: Vec<String> },
    /// The network as a whole changed state.
    NetworkStateChanged { from: &'static str, to: &'static str },
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessStateChanged { node, from, to } => write!(f, "{node}: {from} -> {to}"),
            Self::Reported { node, severity, message } => match node {
                Some(node) => write!(f, "[{severity:?}] {node}: {message}"),
                None => write!(f, "[{severity:?}] {message}"),
            },
            Self::SuspectedDeadlock { nodes } => write!(f, "suspected deadlock among: {}", nodes.join(", ")),
            Self::NetworkStateChanged { from, to } => write!(f, "network: {from} -> {to}"),
        }
    }
}

/// Object-safe sink for `NetworkEvent`s, supplied to a `Network` at
/// construction. Never panics; observers are called inline on the
/// reporting path and must not block.
pub trait NetworkObserver: Send + Sync {
    fn observe(&self, event: NetworkEvent);
}

/// Forwards every event to `tracing` at a level derived from `Severity`.
/// The default used when a caller supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl NetworkObserver for TracingObserver {
    fn observe(&self, event: NetworkEvent) {
        match &event {
            NetworkEvent::Reported { severity, .. } => match severity {
                Severity::Debug => tracing::debug!(%event),
                Severity::Info => tracing::info!(%event),
                Severity::Warning => tracing::warn!(%event),
                Severity::Error | Severity::Fatal => tracing::error!(%event),
            },
            NetworkEvent::SuspectedDeadlock { .. } => tracing::warn!(%event),
            NetworkEvent::ProcessStateChanged { .. } | NetworkEvent::NetworkStateChanged { .. } => {
                tracing::info!(%event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl NetworkObserver for RecordingObserver {
        fn observe(&self, event: NetworkEvent) {
            self.events.lock().unwrap().push(event.to_string());
        }
    }

    #[test]
    fn custom_observer_receives_events_verbatim() {
        let observer = RecordingObserver::default();
        observer.observe(NetworkEvent::NetworkStateChanged { from: "Created", to: "Running" });
        assert_eq!(observer.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn tracing_observer_does_not_panic_on_any_variant() {
        let observer = TracingObserver;
        observer.observe(NetworkEvent::Reported { node: None, severity: Severity::Fatal, message: "boom".into() });
        observer.observe(NetworkEvent::SuspectedDeadlock { nodes: vec!["a".into()] });
    }
}
