use std::sync::Arc;

use thiserror::Error;

use receipts_core::InvoiceId;
use receipts_invoicing::{Invoice, MonthKey};

/// Store operation error.
///
/// These are **infrastructure errors** (storage, constraints) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Io(String),

    #[error("uniqueness constraint violated: {0}")]
    Constraint(String),

    #[error("invoice not found: {0}")]
    NotFound(InvoiceId),

    /// The save committed but its signal could not be delivered.
    #[error("save signal publication failed: {0}")]
    Publish(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// One staged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Insert(Invoice),
    /// Replace the stored invoice with the same identity.
    Update(Invoice),
    Delete(InvoiceId),
}

/// Changes staged by one writer, committed together by `InvoiceStore::save`.
///
/// Owned by the caller, so concurrent writers never see or commit each
/// other's staged changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreBatch {
    changes: Vec<StoreChange>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, invoice: Invoice) -> Self {
        self.changes.push(StoreChange::Insert(invoice));
        self
    }

    pub fn update(mut self, invoice: Invoice) -> Self {
        self.changes.push(StoreChange::Update(invoice));
        self
    }

    pub fn delete(mut self, id: InvoiceId) -> Self {
        self.changes.push(StoreChange::Delete(id));
        self
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<StoreChange> {
        self.changes
    }
}

/// Durable invoice storage.
///
/// ## Write Semantics
///
/// A writer stages changes in its own `StoreBatch` and hands it to `save()`,
/// which commits the whole batch atomically, one batch at a time:
/// - `(year, month, number_prefix, number_suffix)` must stay unique
/// - updates and deletes must target a stored invoice
/// - on any failure nothing from the batch is committed and nothing is
///   signalled; other writers' batches are unaffected
/// - on success, exactly one `StoreSaved` is published, carrying the new save
///   generation, which is also returned
///
/// ## Read Semantics
///
/// `fetch()` sees committed state only. `None` returns every invoice; a month
/// filter returns only invoices dated in that month. No ordering is promised.
pub trait InvoiceStore: Send + Sync {
    fn fetch(&self, filter: Option<MonthKey>) -> Result<Vec<Invoice>, StoreError>;

    /// Commit `batch`; returns the save generation.
    fn save(&self, batch: StoreBatch) -> Result<u64, StoreError>;

    /// Insert one invoice and save.
    fn insert(&self, invoice: Invoice) -> Result<u64, StoreError> {
        self.save(StoreBatch::new().insert(invoice))
    }

    /// Replace one invoice by identity and save.
    fn update(&self, invoice: Invoice) -> Result<u64, StoreError> {
        self.save(StoreBatch::new().update(invoice))
    }

    /// Delete one invoice and save.
    fn delete(&self, id: InvoiceId) -> Result<u64, StoreError> {
        self.save(StoreBatch::new().delete(id))
    }
}

impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    fn fetch(&self, filter: Option<MonthKey>) -> Result<Vec<Invoice>, StoreError> {
        (**self).fetch(filter)
    }

    fn save(&self, batch: StoreBatch) -> Result<u64, StoreError> {
        (**self).save(batch)
    }
}
