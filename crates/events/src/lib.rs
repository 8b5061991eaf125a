//! Change notification plumbing.
//!
//! A small pub/sub layer used to tell interested parties that the invoice
//! store committed a save, and to fan snapshots out to observers.

pub mod bus;
pub mod in_memory_bus;
pub mod signal;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use signal::StoreSaved;
