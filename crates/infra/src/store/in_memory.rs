use std::collections::HashSet;
use std::sync::RwLock;

use tracing::debug;

use receipts_core::{Entity, position_by_id};
use receipts_events::{EventBus, StoreSaved};
use receipts_invoicing::{Invoice, MonthKey};

use super::r#trait::{InvoiceStore, StoreBatch, StoreChange, StoreError};

#[derive(Debug, Default)]
struct StoreState {
    committed: Vec<Invoice>,
    generation: u64,
}

/// In-memory invoice store.
///
/// Intended for tests/dev. Enforces the same uniqueness rule a database would.
/// Batches are committed one at a time under the state's write lock.
#[derive(Debug)]
pub struct InMemoryInvoiceStore<B> {
    state: RwLock<StoreState>,
    signals: B,
}

impl<B> InMemoryInvoiceStore<B>
where
    B: EventBus<StoreSaved>,
{
    pub fn new(signals: B) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            signals,
        }
    }

    /// Start with already-committed invoices (no signal is published).
    pub fn seeded(signals: B, invoices: Vec<Invoice>) -> Result<Self, StoreError> {
        check_unique(&invoices)?;
        Ok(Self {
            state: RwLock::new(StoreState {
                committed: invoices,
                ..StoreState::default()
            }),
            signals,
        })
    }

    /// Number of successful saves so far.
    pub fn generation(&self) -> u64 {
        self.state.read().map(|s| s.generation).unwrap_or(0)
    }
}

fn apply(committed: &mut Vec<Invoice>, change: StoreChange) -> Result<(), StoreError> {
    match change {
        StoreChange::Insert(invoice) => {
            if position_by_id(committed.as_slice(), invoice.id()).is_some() {
                return Err(StoreError::Constraint(format!(
                    "invoice {} is already stored",
                    invoice.id()
                )));
            }
            committed.push(invoice);
        }
        StoreChange::Update(invoice) => {
            let idx = position_by_id(committed.as_slice(), invoice.id())
                .ok_or(StoreError::NotFound(invoice.id_typed()))?;
            committed[idx] = invoice;
        }
        StoreChange::Delete(id) => {
            let idx = position_by_id(committed.as_slice(), &id).ok_or(StoreError::NotFound(id))?;
            committed.remove(idx);
        }
    }
    Ok(())
}

fn check_unique(invoices: &[Invoice]) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(invoices.len());
    for invoice in invoices {
        let key = (
            invoice.month_key(),
            invoice.number_prefix(),
            invoice.number_suffix(),
        );
        if !seen.insert(key) {
            return Err(StoreError::Constraint(format!(
                "ticket {} already exists in {}",
                invoice.ticket_number(),
                invoice.month_key()
            )));
        }
    }
    Ok(())
}

impl<B> InvoiceStore for InMemoryInvoiceStore<B>
where
    B: EventBus<StoreSaved>,
{
    fn fetch(&self, filter: Option<MonthKey>) -> Result<Vec<Invoice>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state
            .committed
            .iter()
            .filter(|inv| filter.is_none_or(|key| inv.month_key() == key))
            .cloned()
            .collect())
    }

    fn save(&self, batch: StoreBatch) -> Result<u64, StoreError> {
        let changes = batch.len();
        let generation = {
            let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;

            // Apply to a copy so a failure leaves committed state untouched.
            let mut next = state.committed.clone();
            for change in batch.into_changes() {
                apply(&mut next, change)?;
            }
            check_unique(&next)?;

            state.committed = next;
            state.generation += 1;
            debug!(generation = state.generation, changes, "invoice store saved");
            state.generation
        };

        // Publish outside the lock so subscribers may read immediately.
        self.signals
            .publish(StoreSaved::new(generation))
            .map_err(|err| StoreError::Publish(format!("{err:?}")))?;

        Ok(generation)
    }
}
