//! Invoice store boundary.
//!
//! The store is the durable source of truth. Writers stage changes in their own
//! `StoreBatch`; `save()` commits a batch atomically and announces every
//! successful save on an `EventBus<StoreSaved>`
//! handed to it at construction.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryInvoiceStore;
pub use r#trait::{InvoiceStore, StoreBatch, StoreChange, StoreError};
