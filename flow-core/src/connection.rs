//! Bounded FIFO connection between one output port and one input port.
//!
//! A `Connection<T>` is the only place state is shared across processes.
//! Capacity is fixed at construction (spec: `0` is rejected, it would
//! deadlock on the first packet). Bounded capacity is the entire
//! backpressure mechanism: a producer that outpaces its consumer suspends in
//! `offer` and therefore stops pulling from its own inputs, propagating the
//! slowdown backward through the graph — no unbounded buffering exists
//! anywhere in this crate.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::FutureExt;

use crate::context::CancellationToken;
use crate::error::{ConnectionError, PollError};
use crate::ip::InformationPacket;

/// A bounded, ordered queue of in-flight [`InformationPacket`]s.
///
/// FIFO order is guaranteed per connection; there is no ordering promise
/// across different connections, even ones fed by the same output port.
pub struct Connection<T> {
    tx: Mutex<Option<flume::Sender<InformationPacket<T>>>>,
    rx: flume::Receiver<InformationPacket<T>>,
    capacity: usize,
    sink_closed: AtomicBool,
}

impl<T: Send + 'static> Connection<T> {
    /// Create a connection with the given bounded capacity.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let (tx, rx) = flume::bounded(capacity.get());
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity: capacity.get(),
            sink_closed: AtomicBool::new(false),
        }
    }

    /// The configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of packets currently queued. Always `0 <= len() <= capacity()`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether the source side has closed this connection.
    #[must_use]
    pub fn is_closed_from_source(&self) -> bool {
        self.tx.lock().expect("connection tx lock poisoned").is_none()
    }

    /// Enqueue one packet, suspending while the queue is full.
    ///
    /// Races against `ctx` cancellation the same way the reference hubs race
    /// their command channels against each other with `futures::select!`.
    pub async fn offer(
        &self,
        ctx: &CancellationToken,
        ip: InformationPacket<T>,
    ) -> Result<(), ConnectionError> {
        if self.sink_closed.load(Ordering::Acquire) {
            return Err(ConnectionError::Closed);
        }

        let sender = {
            let guard = self.tx.lock().expect("connection tx lock poisoned");
            guard.clone()
        };
        let Some(sender) = sender else {
            return Err(ConnectionError::Closed);
        };

        futures::select! {
            result = sender.send_async(ip).fuse() => result.map_err(|_| ConnectionError::Closed),
            () = ctx.cancelled().fuse() => Err(ConnectionError::Cancelled),
        }
    }

    /// Dequeue one packet, suspending while the queue is empty and open.
    pub async fn poll(&self, ctx: &CancellationToken) -> Result<InformationPacket<T>, PollError> {
        futures::select! {
            result = self.rx.recv_async().fuse() => result.map_err(|_| PollError::EndOfStream),
            () = ctx.cancelled().fuse() => Err(PollError::Cancelled),
        }
    }

    /// Mark that no more packets will be offered. The queue still drains:
    /// buffered packets remain available to `poll` until empty, after which
    /// `poll` reports `EndOfStream`.
    pub fn close_from_source(&self) {
        let mut guard = self.tx.lock().expect("connection tx lock poisoned");
        *guard = None;
    }

    /// Mark that no more packets will be accepted; subsequent `offer` calls
    /// fail with `ConnectionError::Closed`.
    pub fn close_from_sink(&self) {
        self.sink_closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn fifo_order_is_preserved() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = CancellationToken::new();
            let conn: Connection<u32> = Connection::new(cap(4));
            for i in 0..4 {
                conn.offer(&ctx, InformationPacket::new(i)).await.unwrap();
            }
            for expected in 0..4 {
                let ip = conn.poll(&ctx).await.unwrap();
                assert_eq!(ip.into_data(), Some(expected));
            }
        });
    }

    #[test]
    fn queue_length_never_exceeds_capacity() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = CancellationToken::new();
            let conn: Connection<u32> = Connection::new(cap(2));
            conn.offer(&ctx, InformationPacket::new(1)).await.unwrap();
            conn.offer(&ctx, InformationPacket::new(2)).await.unwrap();
            assert_eq!(conn.len(), 2);
            assert!(conn.len() <= conn.capacity());
        });
    }

    #[test]
    fn closed_connection_drains_then_reports_end_of_stream() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = CancellationToken::new();
            let conn: Connection<u32> = Connection::new(cap(4));
            conn.offer(&ctx, InformationPacket::new(1)).await.unwrap();
            conn.close_from_source();

            let ip = conn.poll(&ctx).await.unwrap();
            assert_eq!(ip.into_data(), Some(1));

            let err = conn.poll(&ctx).await.unwrap_err();
            assert_eq!(err, PollError::EndOfStream);
        });
    }

    #[test]
    fn close_from_sink_fails_subsequent_offers() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = CancellationToken::new();
            let conn: Connection<u32> = Connection::new(cap(1));
            conn.close_from_sink();
            let err = conn.offer(&ctx, InformationPacket::new(1)).await.unwrap_err();
            assert_eq!(err, ConnectionError::Closed);
        });
    }

    #[test]
    fn cancellation_unblocks_a_full_offer() {
        let rt = compio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = CancellationToken::new();
            let conn: Connection<u32> = Connection::new(cap(1));
            conn.offer(&ctx, InformationPacket::new(1)).await.unwrap();

            ctx.cancel();
            let err = conn.offer(&ctx, InformationPacket::new(2)).await.unwrap_err();
            assert_eq!(err, ConnectionError::Cancelled);
        });
    }
}
