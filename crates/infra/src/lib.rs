//! Infrastructure layer: invoice store boundary, live caches, workers, config.

pub mod cache;
pub mod config;
pub mod prize_book;
pub mod provider;
pub mod store;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use cache::{CacheError, InvoiceCacheManager, LiveInvoices, PeriodInvoices};
pub use config::CacheConfig;
pub use prize_book::{PrizeDrawBook, RecordBookError};
pub use provider::{InvoiceProvider, ProviderError};
pub use store::{InMemoryInvoiceStore, InvoiceStore, StoreError};
