//! Store-wide invoice provider.
//!
//! Holds every invoice in memory and fans snapshots out to observers. Writes
//! are applied to the in-memory list first (observers see them immediately)
//! and then mirrored to the store; a failed mirror is rolled back.

use std::sync::{Arc, RwLock, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, error, warn};

use receipts_core::{Entity, InvoiceId, position_by_id};
use receipts_events::{EventBus, InMemoryEventBus, Subscription};
use receipts_invoicing::Invoice;

use crate::store::{InvoiceStore, StoreError};

/// Every invoice the provider knows of, in load/insert order.
pub type InvoiceSnapshot = Arc<Vec<Invoice>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("ticket number {ticket} is already used by another invoice")]
    DuplicateTicketNumber { ticket: String },

    #[error("invoice {0} already exists")]
    AlreadyExists(InvoiceId),

    #[error("invoice {0} not found")]
    NotFound(InvoiceId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct InvoiceProvider<S> {
    store: S,
    invoices: RwLock<Vec<Invoice>>,
    snapshots: InMemoryEventBus<InvoiceSnapshot>,
}

impl<S> InvoiceProvider<S>
where
    S: InvoiceStore,
{
    /// Load every stored invoice. A failed load is logged and leaves the
    /// provider empty; `refresh` retries.
    pub fn new(store: S) -> Self {
        let invoices = match store.fetch(None) {
            Ok(invoices) => invoices,
            Err(err) => {
                error!(error = ?err, "initial invoice load failed; starting empty");
                Vec::new()
            }
        };
        debug!(invoices = invoices.len(), "invoice provider loaded");

        Self {
            store,
            invoices: RwLock::new(invoices),
            snapshots: InMemoryEventBus::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reload from the store and publish the result.
    pub fn refresh(&self) -> Result<(), ProviderError> {
        let fresh = self.store.fetch(None)?;
        let mut invoices = self.write_lock()?;
        *invoices = fresh;
        self.publish(&invoices);
        Ok(())
    }

    pub fn snapshot(&self) -> InvoiceSnapshot {
        match self.invoices.read() {
            Ok(invoices) => Arc::new(invoices.clone()),
            Err(poisoned) => Arc::new(poisoned.into_inner().clone()),
        }
    }

    /// Snapshots published after every change, starting with the next one.
    pub fn subscribe(&self) -> Subscription<InvoiceSnapshot> {
        self.snapshots.subscribe()
    }

    /// True iff no invoice other than `excluding` carries `prefix`-`suffix`.
    pub fn validate_unique_ticket_number(
        &self,
        excluding: Option<InvoiceId>,
        prefix: &str,
        suffix: &str,
    ) -> bool {
        match self.invoices.read() {
            Ok(invoices) => is_unique(&invoices, excluding, prefix, suffix),
            Err(poisoned) => is_unique(&poisoned.into_inner(), excluding, prefix, suffix),
        }
    }

    pub fn insert(&self, invoice: Invoice) -> Result<(), ProviderError> {
        let mut invoices = self.write_lock()?;
        if position_by_id(invoices.as_slice(), invoice.id()).is_some() {
            return Err(ProviderError::AlreadyExists(invoice.id_typed()));
        }
        ensure_unique(&invoices, None, &invoice)?;

        let previous = invoices.clone();
        invoices.push(invoice.clone());
        self.publish(&invoices);

        let mirrored = self.store.insert(invoice);
        self.settle(invoices, previous, mirrored, "insert")
    }

    /// Replace the invoice with the same identity.
    pub fn update(&self, invoice: Invoice) -> Result<(), ProviderError> {
        let mut invoices = self.write_lock()?;
        let idx = position_by_id(invoices.as_slice(), invoice.id())
            .ok_or(ProviderError::NotFound(invoice.id_typed()))?;
        ensure_unique(&invoices, Some(invoice.id_typed()), &invoice)?;

        let previous = invoices.clone();
        invoices[idx] = invoice.clone();
        self.publish(&invoices);

        let mirrored = self.store.update(invoice);
        self.settle(invoices, previous, mirrored, "update")
    }

    pub fn delete(&self, invoice: &Invoice) -> Result<(), ProviderError> {
        let id = invoice.id_typed();
        let mut invoices = self.write_lock()?;
        let idx = position_by_id(invoices.as_slice(), &id).ok_or(ProviderError::NotFound(id))?;

        let previous = invoices.clone();
        invoices.remove(idx);
        self.publish(&invoices);

        let mirrored = self.store.delete(id);
        self.settle(invoices, previous, mirrored, "delete")
    }

    /// Keep the optimistic change if the store mirror succeeded, otherwise
    /// restore `previous` and republish it.
    fn settle(
        &self,
        mut invoices: RwLockWriteGuard<'_, Vec<Invoice>>,
        previous: Vec<Invoice>,
        mirrored: Result<u64, StoreError>,
        op: &'static str,
    ) -> Result<(), ProviderError> {
        match mirrored {
            Ok(generation) => {
                debug!(op, generation, "invoice change mirrored to store");
                Ok(())
            }
            Err(err) => {
                warn!(op, error = ?err, "store mirror failed; rolling back");
                *invoices = previous;
                self.publish(&invoices);
                Err(err.into())
            }
        }
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Vec<Invoice>>, StoreError> {
        self.invoices.write().map_err(|_| StoreError::Poisoned)
    }

    fn publish(&self, invoices: &[Invoice]) {
        if let Err(err) = self.snapshots.publish(Arc::new(invoices.to_vec())) {
            warn!(error = ?err, "invoice snapshot publish failed");
        }
    }
}

impl<S> core::fmt::Debug for InvoiceProvider<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InvoiceProvider")
            .field("invoices", &self.invoices.read().map(|i| i.len()).ok())
            .finish_non_exhaustive()
    }
}

fn is_unique(invoices: &[Invoice], excluding: Option<InvoiceId>, prefix: &str, suffix: &str) -> bool {
    !invoices
        .iter()
        .filter(|inv| Some(inv.id_typed()) != excluding)
        .any(|inv| inv.same_ticket(prefix, suffix))
}

fn ensure_unique(
    invoices: &[Invoice],
    excluding: Option<InvoiceId>,
    invoice: &Invoice,
) -> Result<(), ProviderError> {
    if is_unique(invoices, excluding, invoice.number_prefix(), invoice.number_suffix()) {
        Ok(())
    } else {
        Err(ProviderError::DuplicateTicketNumber {
            ticket: invoice.ticket_number(),
        })
    }
}
