//! Announced prize draws, one per filing period.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use receipts_core::DomainError;
use receipts_events::{EventBus, InMemoryEventBus, Subscription};
use receipts_invoicing::{Invoice, InvoicePeriod, PrizeDrawRecord, WinningInvoice, find_winners};

/// All announced draws, newest period first.
pub type DrawSnapshot = Arc<Vec<PrizeDrawRecord>>;

#[derive(Debug, Error)]
pub enum RecordBookError {
    #[error("prize draw for {0} was already announced")]
    AlreadyAnnounced(InvoicePeriod),

    #[error("no prize draw announced for {0}")]
    NotAnnounced(InvoicePeriod),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("prize draw book lock poisoned")]
    Poisoned,
}

/// In-memory book of announced prize draws.
///
/// Records are immutable: a period can be announced once.
#[derive(Debug, Default)]
pub struct PrizeDrawBook {
    records: RwLock<BTreeMap<InvoicePeriod, PrizeDrawRecord>>,
    snapshots: InMemoryEventBus<DrawSnapshot>,
}

impl PrizeDrawBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PrizeDrawRecord) -> Result<(), RecordBookError> {
        let period = record.period();
        let mut records = self.records.write().map_err(|_| RecordBookError::Poisoned)?;
        if records.contains_key(&period) {
            return Err(RecordBookError::AlreadyAnnounced(period));
        }
        records.insert(period, record);
        info!(period = %period, "prize draw announced");

        let snapshot = newest_first(&records);
        if let Err(err) = self.snapshots.publish(snapshot) {
            warn!(error = ?err, "prize draw snapshot publish failed");
        }
        Ok(())
    }

    pub fn get(&self, period: InvoicePeriod) -> Option<PrizeDrawRecord> {
        self.records.read().ok()?.get(&period).cloned()
    }

    pub fn records(&self) -> DrawSnapshot {
        match self.records.read() {
            Ok(records) => newest_first(&records),
            Err(poisoned) => newest_first(&poisoned.into_inner()),
        }
    }

    /// Snapshots published after every announcement.
    pub fn subscribe(&self) -> Subscription<DrawSnapshot> {
        self.snapshots.subscribe()
    }

    /// Winners of `period`'s draw among those `invoices` dated inside the period.
    pub fn check(
        &self,
        period: InvoicePeriod,
        invoices: &[Invoice],
    ) -> Result<Vec<WinningInvoice>, RecordBookError> {
        let record = self
            .get(period)
            .ok_or(RecordBookError::NotAnnounced(period))?;

        let eligible: Vec<Invoice> = invoices
            .iter()
            .filter(|inv| period.contains(inv.month_key()))
            .cloned()
            .collect();

        Ok(find_winners(&eligible, &record)?)
    }
}

fn newest_first(records: &BTreeMap<InvoicePeriod, PrizeDrawRecord>) -> DrawSnapshot {
    Arc::new(records.values().rev().cloned().collect())
}
