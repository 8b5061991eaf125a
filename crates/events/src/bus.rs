//! Publishing/subscription abstraction (mechanics only).
//!
//! The bus is how the invoice store announces committed saves and how
//! in-memory providers fan snapshots out to observers.
//!
//! ## Design Philosophy
//!
//! - **Transport-agnostic**: the in-memory channel bus is the only implementation
//!   today, but nothing here assumes it
//! - **Broadcast semantics**: every live subscription receives every message
//!   published after it subscribed
//! - **No persistence**: a message published before a subscription exists is
//!   never delivered to it; the store is the source of truth
//!
//! Consumers must treat messages as hints to re-read state, never as the state
//! itself.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a message stream.
///
/// ## Usage Pattern
///
/// ```ignore
/// let bus: Arc<dyn EventBus<StoreSaved, Error = InMemoryBusError>> = ...;
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(signal) => refresh(signal),
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,  // Check for shutdown
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,  // Bus closed
///     }
/// }
/// ```
///
/// ## Thread Safety
///
/// Subscriptions are designed for single-threaded consumption. Each subscription should
/// be used by one thread (or use a mutex/channel to distribute messages to multiple threads).
///
/// Messages are received in the order they were published.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything queued right now and return the newest message.
    ///
    /// Useful for snapshot streams where only the latest value matters.
    pub fn latest(&self) -> Option<M> {
        let mut last = None;
        while let Ok(msg) = self.receiver.try_recv() {
            last = Some(msg);
        }
        last
    }
}

/// Domain-agnostic pub/sub abstraction.
///
/// ## Error Handling
///
/// `publish()` can fail (e.g. the bus is poisoned). Failures are surfaced to the
/// caller, which decides whether the message is worth retrying. For store saves
/// the data is already committed, so a failed publish only delays observers.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`, meaning implementations must be safe to share across
/// threads. Multiple threads can publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
