//! Integration tests for the live invoice pipeline.
//!
//! Tests: write → InvoiceStore::save → StoreSaved bus → refresh worker → LiveInvoices
//!
//! Verifies:
//! - Subscribers of one month share one store query
//! - Writes are visible to every open view once the write returns
//! - Read failures degrade to empty views; write failures surface

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use receipts_events::{InMemoryEventBus, StoreSaved};
    use receipts_invoicing::{
        Invoice, InvoiceDetail, InvoiceDraft, InvoiceKind, InvoicePeriod, MonthKey,
        PrizeDrawRecord, PrizeTier,
    };

    use crate::cache::{CacheError, InvoiceCacheManager};
    use crate::config::CacheConfig;
    use crate::prize_book::PrizeDrawBook;
    use crate::provider::InvoiceProvider;
    use crate::store::{InMemoryInvoiceStore, InvoiceStore, StoreBatch, StoreError};

    type Bus = Arc<InMemoryEventBus<StoreSaved>>;

    /// Store wrapper that counts month queries and fails reads on demand.
    struct CountingStore {
        inner: InMemoryInvoiceStore<Bus>,
        fetches: AtomicUsize,
        fail_reads: AtomicBool,
    }

    impl CountingStore {
        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }
    }

    impl InvoiceStore for CountingStore {
        fn fetch(&self, filter: Option<MonthKey>) -> Result<Vec<Invoice>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Io("connection reset".to_string()));
            }
            self.inner.fetch(filter)
        }

        fn save(&self, batch: StoreBatch) -> Result<u64, StoreError> {
            self.inner.save(batch)
        }
    }

    fn invoice(month: u32, day: u32, suffix: &str) -> Invoice {
        Invoice::new(InvoiceDraft {
            kind: InvoiceKind::Manual,
            shop_name: "night market".to_string(),
            year: 2024,
            month,
            day,
            number_prefix: "QA".to_string(),
            number_suffix: suffix.to_string(),
            amount: 80,
            details: Vec::new(),
        })
        .unwrap()
    }

    fn setup(seed: Vec<Invoice>) -> (InvoiceCacheManager<CountingStore>, Bus) {
        receipts_observability::init();

        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let store = CountingStore {
            inner: InMemoryInvoiceStore::seeded(bus.clone(), seed).unwrap(),
            fetches: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        };
        let config = CacheConfig {
            poll_interval: Duration::from_millis(10),
            ..CacheConfig::default()
        }
        .with_ack_timeout(Duration::from_secs(5));

        let cache = InvoiceCacheManager::new(store, &bus, config).unwrap();
        (cache, bus)
    }

    fn november() -> MonthKey {
        MonthKey::new(2024, 11).unwrap()
    }

    fn suffixes(invoices: &[Invoice]) -> Vec<&str> {
        invoices.iter().map(Invoice::number_suffix).collect()
    }

    #[test]
    fn concurrent_subscribers_share_one_query() {
        let (cache, _bus) = setup(vec![invoice(11, 1, "00000001")]);
        let cache = Arc::new(cache);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.subscribe(11, 2024).unwrap()
                })
            })
            .collect();

        // Views are handed back alive, so neither thread can evict the entry.
        let views: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.store().fetches(), 1);
        assert_eq!(cache.observer_count(november()), 2);
        assert!(views.iter().all(|v| v.current().len() == 1));
    }

    #[test]
    fn evicted_month_is_queried_again() {
        let (cache, _bus) = setup(Vec::new());

        let first = cache.subscribe(11, 2024).unwrap();
        let second = first.clone();
        assert_eq!(cache.observer_count(november()), 2);
        assert_eq!(cache.store().fetches(), 1);

        drop(first);
        assert_eq!(cache.active_keys(), vec![november()]);
        drop(second);
        assert!(cache.active_keys().is_empty());

        let _again = cache.subscribe(11, 2024).unwrap();
        assert_eq!(cache.store().fetches(), 2);
    }

    #[test]
    fn add_is_visible_to_new_subscribers_and_delete_removes() {
        let (cache, _bus) = setup(Vec::new());
        let inv = invoice(11, 7, "00000007");

        cache.add(inv.clone()).unwrap();
        assert_eq!(cache.subscribe(11, 2024).unwrap().current().as_slice(), &[inv.clone()]);

        cache.delete(&inv).unwrap();
        assert!(cache.subscribe(11, 2024).unwrap().current().is_empty());
    }

    #[test]
    fn open_views_are_current_when_write_returns() {
        let (cache, _bus) = setup(vec![invoice(11, 1, "00000001")]);
        let nov = cache.subscribe(11, 2024).unwrap();
        let dec = cache.subscribe(12, 2024).unwrap();
        assert_eq!(cache.store().fetches(), 2);

        cache.add(invoice(11, 20, "00000020")).unwrap();

        // No waiting: the write only returns after the refresh.
        assert_eq!(suffixes(&nov.current()), vec!["00000020", "00000001"]);
        assert!(nov.try_next().is_some());
        // Unaffected months are re-queried as well.
        assert_eq!(cache.store().fetches(), 4);
        assert!(dec.try_next().is_some_and(|list| list.is_empty()));
    }

    #[test]
    fn sequential_writes_are_reflected_in_order() {
        let (cache, _bus) = setup(Vec::new());
        let live = cache.subscribe(11, 2024).unwrap();
        let a = invoice(11, 1, "00000001");
        let b = invoice(11, 2, "00000002");

        cache.add(a.clone()).unwrap();
        cache.add(b.clone()).unwrap();
        cache
            .update(a.clone(), vec![InvoiceDetail::new("umbrella")])
            .unwrap();
        cache.delete(&b).unwrap();

        let current = live.current();
        assert_eq!(suffixes(&current), vec!["00000001"]);
        assert_eq!(current[0].details(), &[InvoiceDetail::new("umbrella")]);
        // Four refreshes collapse into one pending notification.
        assert!(live.drain());
        assert!(!live.drain());
    }

    #[test]
    fn rejected_write_does_not_fail_a_concurrent_one() {
        let (cache, _bus) = setup(vec![invoice(11, 1, "00000001")]);
        let cache = Arc::new(cache);
        let live = cache.subscribe(11, 2024).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let duplicates = {
            let (cache, barrier) = (cache.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                (0..50)
                    .map(|_| cache.add(invoice(11, 9, "00000001")))
                    .filter(Result::is_err)
                    .count()
            })
        };
        let valid = {
            let (cache, barrier) = (cache.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                (0..50u32)
                    .map(|n| cache.add(invoice(11, 2, &format!("{:08}", 100 + n))))
                    .filter(Result::is_ok)
                    .count()
            })
        };

        assert_eq!(duplicates.join().unwrap(), 50);
        assert_eq!(valid.join().unwrap(), 50);
        assert_eq!(live.current().len(), 51);
    }

    #[test]
    fn failed_read_yields_empty_view() {
        let (cache, _bus) = setup(vec![invoice(11, 1, "00000001")]);

        cache.store().fail_reads(true);
        let live = cache.subscribe(11, 2024).unwrap();
        assert!(live.current().is_empty());

        cache.store().fail_reads(false);
        cache.add(invoice(11, 2, "00000002")).unwrap();
        assert_eq!(live.current().len(), 2);
    }

    #[test]
    fn failed_save_surfaces_and_does_not_refresh() {
        let (cache, _bus) = setup(vec![invoice(11, 1, "00000001")]);
        let live = cache.subscribe(11, 2024).unwrap();
        let fetches = cache.store().fetches();

        // Same ticket number in the same month.
        let err = cache.add(invoice(11, 9, "00000001")).unwrap_err();

        assert!(matches!(err, CacheError::Store(StoreError::Constraint(_))));
        assert_eq!(cache.store().fetches(), fetches);
        assert!(live.next_timeout(Duration::from_millis(50)).is_none());
        assert_eq!(live.current().len(), 1);
    }

    #[test]
    fn provider_writes_reach_cache_views() {
        receipts_observability::init();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryInvoiceStore::new(bus.clone()));

        let cache = InvoiceCacheManager::new(store.clone(), &bus, CacheConfig::default()).unwrap();
        let provider = InvoiceProvider::new(store);
        let live = cache.subscribe(11, 2024).unwrap();

        // The provider does not wait for the cache, so wait for the push.
        provider.insert(invoice(11, 3, "00000003")).unwrap();
        let pushed = live.next_timeout(Duration::from_secs(2)).unwrap();

        assert_eq!(suffixes(&pushed), vec!["00000003"]);
        assert_eq!(provider.snapshot().as_slice(), pushed.as_slice());
    }

    #[test]
    fn period_view_feeds_prize_check() {
        let (cache, _bus) = setup(vec![
            invoice(11, 4, "12345678"),
            invoice(12, 8, "99991222"),
            invoice(12, 9, "00000000"),
        ]);
        let period = InvoicePeriod::new(2024, 11).unwrap();
        let view = cache.subscribe_period(period);

        let book = PrizeDrawBook::new();
        book.insert(
            PrizeDrawRecord::new(
                period,
                "12345678",
                "87654321",
                vec!["11111222".to_string(), "22222222".to_string()],
            )
            .unwrap(),
        )
        .unwrap();

        let winners = book.check(period, &view.current()).unwrap();
        let tiers: Vec<_> = winners.iter().map(|w| w.tier).collect();
        // December (second month) is listed first.
        assert_eq!(tiers, vec![PrizeTier::Fifth, PrizeTier::Special]);
    }
}
