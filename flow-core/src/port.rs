//! Named, typed, directional endpoints owned by a process.
//!
//! A `Process` knows the concrete carrier type of each of its own ports
//! (`InputPort<T>`/`OutputPort<T>`). A `Network`, wiring together processes
//! of heterogeneous, unrelated types, cannot — so ports also implement the
//! object-safe [`AnyPort`] trait, and wiring crosses the type boundary with
//! a single verified downcast (`bind_erased`), exactly the strategy spec §9
//! recommends for dynamic dispatch over heterogeneous process types.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use std::sync::Mutex;

use crate::connection::Connection;
use crate::context::CancellationToken;
use crate::error::{PollError, PortError};
use crate::ip::InformationPacket;

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A freshly-created connection, type-erased so a `Network` can carry it
/// between two `AnyPort`s without knowing their shared carrier type.
pub type ErasedConnection = Arc<dyn Any + Send + Sync>;

/// The object-safe half of a port, used by the orchestrator for wiring and
/// validation. Concrete type information lives behind `as_any`/`bind_erased`
/// and is recovered with a single verified downcast at the wiring boundary.
pub trait AnyPort: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn required(&self) -> bool;
    fn direction(&self) -> Direction;
    fn max_connections(&self) -> usize;
    fn bound_count(&self) -> usize;
    fn carrier_type_name(&self) -> &'static str;

    /// Create a new connection compatible with this port's carrier type,
    /// sized to `capacity`, type-erased for transport across the boundary.
    fn new_connection(&self, capacity: std::num::NonZeroUsize) -> ErasedConnection;

    /// Attach a (possibly erased) connection created by `new_connection` on
    /// either end of the edge. Fails with `TypeMismatch` if the dynamic type
    /// behind `connection` is not this port's own `Connection<T>`, with
    /// `ArityExceeded` if already at `max_connections`.
    fn bind_erased(&self, connection: ErasedConnection) -> Result<(), PortError>;

    /// Declare no more packets will be produced (output) or accepted
    /// (input); propagates to every bound connection.
    fn close(&self);

    fn as_any(&self) -> &dyn Any;
}

struct PortSpec {
    name: String,
    description: String,
    required: bool,
    max_connections: usize,
}

impl PortSpec {
    fn new(name: impl Into<String>, description: impl Into<String>, required: bool, max_connections: usize) -> Self {
        assert!(max_connections >= 1, "max_connections must be >= 1");
        Self {
            name: name.into(),
            description: description.into(),
            required,
            max_connections,
        }
    }
}

/// An output port: sends to every bound connection (fan-out).
pub struct OutputPort<T> {
    spec: PortSpec,
    bindings: Mutex<Vec<Arc<Connection<T>>>>,
    closed: AtomicBool,
}

impl<T: Send + 'static> OutputPort<T> {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool, max_connections: usize) -> Self {
        Self {
            spec: PortSpec::new(name, description, required, max_connections),
            bindings: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach a typed connection directly (used by tests and by processes
    /// wiring themselves up outside of a `Network`, e.g. a one-shot IIP
    /// channel).
    pub fn connect(&self, connection: Arc<Connection<T>>) -> Result<(), PortError> {
        let mut bindings = self.bindings.lock().expect("port bindings lock poisoned");
        if bindings.len() >= self.spec.max_connections {
            return Err(PortError::ArityExceeded {
                port: self.spec.name.clone(),
                current: bindings.len(),
                max: self.spec.max_connections,
            });
        }
        bindings.push(connection);
        Ok(())
    }

    /// Send `ip` to every bound connection, in the order they were
    /// connected, duplicating the packet per binding. Suspends until every
    /// binding accepts the packet or `ctx` cancels.
    pub async fn send(&self, ctx: &CancellationToken, ip: InformationPacket<T>) -> Result<(), PortError>
    where
        T: Clone,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(PortError::Closed { port: self.spec.name.clone() });
        }

        let bindings: Vec<_> = self.bindings.lock().expect("port bindings lock poisoned").clone();
        let Some((last, rest)) = bindings.split_last() else {
            // No consumer bound: per spec this is a configuration concern
            // the Network validates before Run; at runtime, an unbound
            // output silently drops (nothing downstream to backpressure
            // against).
            return Ok(());
        };

        for conn in rest {
            let copy = clone_ip(&ip);
            conn.offer(ctx, copy)
                .await
                .map_err(|_| PortError::Closed { port: self.spec.name.clone() })?;
        }
        last.offer(ctx, ip)
            .await
            .map_err(|_| PortError::Closed { port: self.spec.name.clone() })
    }
}

impl<T: Send + 'static> InputPort<T> {
    /// Deliver one initial value as if this port were connected to a
    /// one-shot connection whose only packet is the IIP (spec §9, resolved
    /// Open Question). Binds a fresh single-slot connection, offers the
    /// value as an `InitialValue` IP, then closes it from the source side
    /// so the port observes ordinary `EndOfStream` once the IIP is taken.
    ///
    /// Consumes one of the port's `maxConnections` slots, exactly as a real
    /// edge would; a `Network` validating arity must account for it.
    pub async fn deliver_initial_value(&self, ctx: &CancellationToken, value: T) -> Result<(), PortError> {
        let conn: Arc<Connection<T>> = Arc::new(Connection::new(
            std::num::NonZeroUsize::new(1).expect("1 is nonzero"),
        ));
        self.connect(conn.clone())?;
        conn.offer(ctx, InformationPacket::initial_value(value))
            .await
            .map_err(|_| PortError::Closed { port: self.spec.name.clone() })?;
        conn.close_from_source();
        Ok(())
    }
}

fn clone_ip<T: Clone>(ip: &InformationPacket<T>) -> InformationPacket<T> {
    match ip.data() {
        Some(data) => InformationPacket::new(data.clone()),
        None if ip.is_bracket() => {
            if ip.kind() == crate::ip::IpKind::OpenBracket {
                InformationPacket::open_bracket()
            } else {
                InformationPacket::close_bracket()
            }
        }
        None => unreachable!("non-bracket IP without data"),
    }
}

impl<T: Send + Sync + 'static> AnyPort for OutputPort<T> {
    fn name(&self) -> &str {
        &self.spec.name
    }
    fn description(&self) -> &str {
        &self.spec.description
    }
    fn required(&self) -> bool {
        self.spec.required
    }
    fn direction(&self) -> Direction {
        Direction::Output
    }
    fn max_connections(&self) -> usize {
        self.spec.max_connections
    }
    fn bound_count(&self) -> usize {
        self.bindings.lock().expect("port bindings lock poisoned").len()
    }
    fn carrier_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
    fn new_connection(&self, capacity: std::num::NonZeroUsize) -> ErasedConnection {
        Arc::new(Connection::<T>::new(capacity))
    }
    fn bind_erased(&self, connection: ErasedConnection) -> Result<(), PortError> {
        let typed = connection
            .downcast::<Connection<T>>()
            .map_err(|_| PortError::TypeMismatch {
                port: self.spec.name.clone(),
                expected: std::any::type_name::<T>(),
                actual: "<erased>",
            })?;
        self.connect(typed)
    }
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for conn in self.bindings.lock().expect("port bindings lock poisoned").iter() {
            conn.close_from_source();
        }
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An input port: receives the merged stream of every bound connection
/// (fan-in), interleaved in arrival order.
pub struct InputPort<T> {
    spec: PortSpec,
    bindings: Mutex<Vec<Arc<Connection<T>>>>,
    exhausted: Mutex<Vec<bool>>,
    closed: AtomicBool,
    rr_cursor: AtomicUsize,
}

impl<T: Send + 'static> InputPort<T> {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool, max_connections: usize) -> Self {
        Self {
            spec: PortSpec::new(name, description, required, max_connections),
            bindings: Mutex::new(Vec::new()),
            exhausted: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            rr_cursor: AtomicUsize::new(0),
        }
    }

    pub fn connect(&self, connection: Arc<Connection<T>>) -> Result<(), PortError> {
        let mut bindings = self.bindings.lock().expect("port bindings lock poisoned");
        if bindings.len() >= self.spec.max_connections {
            return Err(PortError::ArityExceeded {
                port: self.spec.name.clone(),
                current: bindings.len(),
                max: self.spec.max_connections,
            });
        }
        bindings.push(connection);
        self.exhausted.lock().expect("port exhausted lock poisoned").push(false);
        Ok(())
    }

    /// Dequeue the next packet across every bound connection.
    ///
    /// Fairness is best-effort round-robin: no non-empty binding is
    /// starved indefinitely, but strict alternation is not guaranteed.
    /// Returns `PortError::Closed` with `EndOfStream` semantics (via the
    /// caller matching on the returned `PollError`-shaped closure) once
    /// every binding has closed and drained.
    pub async fn receive(&self, ctx: &CancellationToken) -> Result<InformationPacket<T>, PollError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PollError::EndOfStream);
        }

        loop {
            let bindings: Vec<_> = self.bindings.lock().expect("port bindings lock poisoned").clone();
            if bindings.is_empty() {
                return Err(PollError::EndOfStream);
            }

            let live: Vec<usize> = {
                let exhausted = self.exhausted.lock().expect("port exhausted lock poisoned");
                (0..bindings.len()).filter(|&i| !exhausted[i]).collect()
            };
            if live.is_empty() {
                return Err(PollError::EndOfStream);
            }

            let start = self.rr_cursor.fetch_add(1, Ordering::Relaxed) % live.len();
            let order: Vec<usize> = (0..live.len()).map(|o| live[(start + o) % live.len()]).collect();

            let polls = order
                .iter()
                .map(|&idx| {
                    let conn = bindings[idx].clone();
                    let idx = idx;
                    Box::pin(async move { (idx, conn.poll(ctx).await) })
                })
                .collect::<Vec<_>>();

            futures::select! {
                (idx, result) = futures::future::select_all(polls).map(|(r, _, _)| r).fuse() => {
                    match result {
                        Ok(ip) => return Ok(ip),
                        Err(PollError::Cancelled) => return Err(PollError::Cancelled),
                        Err(PollError::EndOfStream) => {
                            self.exhausted.lock().expect("port exhausted lock poisoned")[idx] = true;
                            // loop again: other bindings may still be live.
                        }
                    }
                }
                () = ctx.cancelled().fuse() => return Err(PollError::Cancelled),
            }
        }
    }
}

impl<T: Send + Sync + 'static> AnyPort for InputPort<T> {
    fn name(&self) -> &str {
        &self.spec.name
    }
    fn description(&self) -> &str {
        &self.spec.description
    }
    fn required(&self) -> bool {
        self.spec.required
    }
    fn direction(&self) -> Direction {
        Direction::Input
    }
    fn max_connections(&self) -> usize {
        self.spec.max_connections
    }
    fn bound_count(&self) -> usize {
        self.bindings.lock().expect("port bindings lock poisoned").len()
    }
    fn carrier_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
    fn new_connection(&self, capacity: std::num::NonZeroUsize) -> ErasedConnection {
        Arc::new(Connection::<T>::new(capacity))
    }
    fn bind_erased(&self, connection: ErasedConnection) -> Result<(), PortError> {
        let typed = connection
            .downcast::<Connection<T>>()
            .map_err(|_| PortError::TypeMismatch {
                port: self.spec.name.clone(),
                expected: std::any::type_name::<T>(),
                actual: "<erased>",
            })?;
        self.connect(typed)
    }
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for conn in self.bindings.lock().expect("port bindings lock poisoned").iter() {
            conn.close_from_sink();
        }
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
