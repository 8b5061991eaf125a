use std::convert::Infallible;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info};

use receipts_events::{EventBus, StoreSaved};
use receipts_invoicing::{Invoice, InvoiceDetail, InvoicePeriod, MonthKey};

use super::CacheError;
use super::live::{LiveInvoices, PeriodInvoices, SharedIndex, SubscriptionIndex, lock_index};
use crate::config::CacheConfig;
use crate::store::{InvoiceStore, StoreBatch};
use crate::workers::{SignalWorker, WorkerHandle};

#[derive(Debug, Default)]
struct AckState {
    /// Highest save generation whose refresh has completed.
    generation: u64,
    stopped: bool,
}

/// Refresh progress shared between the worker and blocked writers.
#[derive(Debug, Default)]
struct RefreshAck {
    state: Mutex<AckState>,
    changed: Condvar,
}

impl RefreshAck {
    fn lock(&self) -> MutexGuard<'_, AckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, generation: u64) {
        let mut state = self.lock();
        state.generation = state.generation.max(generation);
        self.changed.notify_all();
    }

    fn stop(&self) {
        self.lock().stopped = true;
        self.changed.notify_all();
    }
}

/// Owned by the worker's handler; marks the worker stopped when the loop ends.
struct AckOnDrop(Arc<RefreshAck>);

impl AckOnDrop {
    fn advance(&self, generation: u64) {
        self.0.advance(generation);
    }
}

impl Drop for AckOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Per-month invoice cache over an `InvoiceStore`.
///
/// ## Reads
///
/// `subscribe` returns a `LiveInvoices` for one month, newest day first.
/// Concurrent subscribers of a month share one entry and one store query; the
/// entry is evicted when its last view is dropped.
///
/// ## Writes
///
/// `add`, `update` and `delete` stage the change, save, then block until the
/// refresh worker has re-queried every live month for that save. When a write
/// returns `Ok`, every open view already shows the post-write state.
///
/// ## Refresh
///
/// A named worker thread consumes the store's `StoreSaved` signals. For each
/// one it re-runs the query of every live month, whether or not the save
/// touched it. A failed query publishes an empty list for that month.
pub struct InvoiceCacheManager<S> {
    store: Arc<S>,
    index: SharedIndex,
    ack: Arc<RefreshAck>,
    config: CacheConfig,
    _worker: WorkerHandle,
}

impl<S> InvoiceCacheManager<S>
where
    S: InvoiceStore + 'static,
{
    /// Build the manager and start its refresh worker.
    ///
    /// `signals` must be the bus the store publishes its saves on.
    pub fn new<B>(store: S, signals: &B, config: CacheConfig) -> Result<Self, CacheError>
    where
        B: EventBus<StoreSaved> + ?Sized,
    {
        let store = Arc::new(store);
        let index: SharedIndex = Arc::new(Mutex::new(SubscriptionIndex::default()));
        let ack = Arc::new(RefreshAck::default());

        let worker = {
            let store = store.clone();
            let index = index.clone();
            let acker = AckOnDrop(ack.clone());

            SignalWorker::spawn(
                &config.worker_name,
                signals.subscribe(),
                config.poll_interval,
                move |signal: StoreSaved| {
                    refresh_all(store.as_ref(), &index, signal.generation);
                    acker.advance(signal.generation);
                    Ok::<(), Infallible>(())
                },
            )?
        };

        info!(worker = %config.worker_name, "invoice cache manager started");

        Ok(Self {
            store,
            index,
            ack,
            config,
            _worker: worker,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Live view of one month's invoices.
    pub fn subscribe(&self, month: u32, year: i32) -> Result<LiveInvoices, CacheError> {
        Ok(self.subscribe_key(MonthKey::new(year, month)?))
    }

    /// Live view of one month's invoices; queries the store only if the month
    /// is not live yet.
    pub fn subscribe_key(&self, key: MonthKey) -> LiveInvoices {
        let live = lock_index(&self.index).attach(key, &self.index, || {
            fetch_sorted(self.store.as_ref(), key)
        });
        debug!(key = %key, "attached invoice observer");
        live
    }

    /// Live views of both months of a filing period.
    pub fn subscribe_period(&self, period: InvoicePeriod) -> PeriodInvoices {
        let [first, second] = period.months();
        PeriodInvoices::new(period, self.subscribe_key(first), self.subscribe_key(second))
    }

    /// Months that currently have at least one live view.
    pub fn active_keys(&self) -> Vec<MonthKey> {
        lock_index(&self.index).keys()
    }

    pub fn observer_count(&self, key: MonthKey) -> usize {
        lock_index(&self.index).observer_count(key)
    }

    pub fn add(&self, invoice: Invoice) -> Result<(), CacheError> {
        let key = invoice.month_key();
        self.commit("add", key, StoreBatch::new().insert(invoice))
    }

    /// Replace `invoice` (by identity) with the same invoice carrying `details`.
    pub fn update(&self, invoice: Invoice, details: Vec<InvoiceDetail>) -> Result<(), CacheError> {
        let key = invoice.month_key();
        self.commit("update", key, StoreBatch::new().update(invoice.with_details(details)))
    }

    pub fn delete(&self, invoice: &Invoice) -> Result<(), CacheError> {
        let batch = StoreBatch::new().delete(invoice.id_typed());
        self.commit("delete", invoice.month_key(), batch)
    }

    fn commit(&self, op: &'static str, key: MonthKey, batch: StoreBatch) -> Result<(), CacheError> {
        let generation = self.store.save(batch)?;
        debug!(op, key = %key, generation, "invoice write saved");
        self.wait_for_refresh(generation)
    }

    /// Block until the worker has refreshed live views for `generation`.
    fn wait_for_refresh(&self, generation: u64) -> Result<(), CacheError> {
        let deadline = self.config.ack_timeout.map(|t| Instant::now() + t);
        let mut state = self.ack.lock();

        loop {
            if state.generation >= generation {
                return Ok(());
            }
            if state.stopped {
                return Err(CacheError::WorkerStopped);
            }

            state = match deadline {
                None => self
                    .ack
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CacheError::AckTimeout { generation });
                    }
                    self.ack
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

impl<S> core::fmt::Debug for InvoiceCacheManager<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InvoiceCacheManager")
            .field("config", &self.config)
            .field("active_keys", &lock_index(&self.index).keys())
            .finish_non_exhaustive()
    }
}

/// One month's invoices, newest day first. Failures are absorbed.
fn fetch_sorted<S>(store: &S, key: MonthKey) -> Vec<Invoice>
where
    S: InvoiceStore + ?Sized,
{
    match store.fetch(Some(key)) {
        Ok(mut invoices) => {
            invoices.sort_by(|a, b| b.day().cmp(&a.day()));
            invoices
        }
        Err(err) => {
            error!(key = %key, error = ?err, "invoice query failed; publishing empty result");
            Vec::new()
        }
    }
}

/// Re-query every live month and push the results.
fn refresh_all<S>(store: &S, index: &Mutex<SubscriptionIndex>, generation: u64)
where
    S: InvoiceStore + ?Sized,
{
    let mut index = lock_index(index);
    let keys = index.keys();
    for key in &keys {
        let invoices = fetch_sorted(store, *key);
        index.publish(*key, invoices);
    }
    debug!(generation, live_keys = keys.len(), "refreshed live invoice views");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use receipts_events::InMemoryEventBus;
    use receipts_invoicing::{InvoiceDraft, InvoiceKind};

    use super::*;
    use crate::store::InMemoryInvoiceStore;

    type Bus = Arc<InMemoryEventBus<StoreSaved>>;

    fn invoice(month: u32, day: u32, suffix: &str) -> Invoice {
        Invoice::new(InvoiceDraft {
            kind: InvoiceKind::Manual,
            shop_name: "corner shop".to_string(),
            year: 2024,
            month,
            day,
            number_prefix: "AB".to_string(),
            number_suffix: suffix.to_string(),
            amount: 120,
            details: Vec::new(),
        })
        .unwrap()
    }

    fn manager(seed: Vec<Invoice>) -> InvoiceCacheManager<InMemoryInvoiceStore<Bus>> {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let store = InMemoryInvoiceStore::seeded(bus.clone(), seed).unwrap();
        let config = CacheConfig {
            poll_interval: Duration::from_millis(10),
            ..CacheConfig::default()
        };
        InvoiceCacheManager::new(store, &bus, config).unwrap()
    }

    #[test]
    fn subscribe_sorts_by_day_descending() {
        let cache = manager(vec![
            invoice(11, 3, "00000001"),
            invoice(11, 28, "00000002"),
            invoice(11, 15, "00000003"),
            invoice(12, 30, "00000004"),
        ]);

        let live = cache.subscribe(11, 2024).unwrap();
        let days: Vec<_> = live.current().iter().map(Invoice::day).collect();
        assert_eq!(days, vec![28, 15, 3]);
    }

    #[test]
    fn subscribe_rejects_invalid_month() {
        let cache = manager(Vec::new());
        assert!(matches!(cache.subscribe(13, 2024), Err(CacheError::Domain(_))));
    }

    #[test]
    fn period_view_lists_second_month_first() {
        let cache = manager(vec![invoice(11, 30, "00000001"), invoice(12, 1, "00000002")]);

        let period = cache.subscribe_period(InvoicePeriod::new(2024, 11).unwrap());
        let months: Vec<_> = period.current().iter().map(Invoice::month).collect();
        assert_eq!(months, vec![12, 11]);
        assert_eq!(cache.active_keys().len(), 2);
    }

    #[test]
    fn update_replaces_details() {
        let original = invoice(11, 5, "00000001");
        let cache = manager(vec![original.clone()]);
        let live = cache.subscribe(11, 2024).unwrap();

        cache
            .update(original, vec![InvoiceDetail::new("coffee")])
            .unwrap();

        let current = live.current();
        assert_eq!(current[0].details(), &[InvoiceDetail::new("coffee")]);
    }

    #[test]
    fn write_without_matching_signal_times_out() {
        // The store announces saves on a bus the manager never listens to.
        let store_bus: Bus = Arc::new(InMemoryEventBus::new());
        let cache_bus: Bus = Arc::new(InMemoryEventBus::new());
        let config = CacheConfig {
            poll_interval: Duration::from_millis(10),
            ..CacheConfig::default()
        }
        .with_ack_timeout(Duration::from_millis(50));
        let cache =
            InvoiceCacheManager::new(InMemoryInvoiceStore::new(store_bus), &cache_bus, config)
                .unwrap();

        let err = cache.add(invoice(11, 1, "00000001")).unwrap_err();
        assert!(matches!(err, CacheError::AckTimeout { generation: 1 }));
        // The save itself committed.
        assert_eq!(cache.store().fetch(None).unwrap().len(), 1);
    }

    #[test]
    fn write_after_bus_is_gone_reports_stopped_worker() {
        let store_bus: Bus = Arc::new(InMemoryEventBus::new());
        let cache = {
            let cache_bus = InMemoryEventBus::<StoreSaved>::new();
            InvoiceCacheManager::new(
                InMemoryInvoiceStore::new(store_bus),
                &cache_bus,
                CacheConfig {
                    poll_interval: Duration::from_millis(10),
                    ..CacheConfig::default()
                },
            )
            .unwrap()
        };

        let err = cache.add(invoice(11, 1, "00000001")).unwrap_err();
        assert!(matches!(err, CacheError::WorkerStopped));
    }
}
