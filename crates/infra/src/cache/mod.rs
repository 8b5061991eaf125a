//! Reactive per-month invoice cache.
//!
//! `InvoiceCacheManager` hands out `LiveInvoices` views keyed by month. Views
//! of the same month share one entry and one store query; every store save
//! re-runs the query of every live month and pushes the result to its
//! observers.

pub mod live;
pub mod manager;

use thiserror::Error;

use receipts_core::DomainError;

use crate::store::StoreError;

pub use live::{InvoiceList, LiveInvoices, PeriodInvoices};
pub use manager::InvoiceCacheManager;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The save committed but live views were not refreshed in time.
    #[error("timed out waiting for refresh of save generation {generation}")]
    AckTimeout { generation: u64 },

    #[error("cache refresh worker stopped")]
    WorkerStopped,

    #[error("failed to spawn cache refresh worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
