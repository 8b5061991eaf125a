//! Observer-counted subscription index and the live view handles it hands out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, mpsc};
use std::time::Duration;

use tracing::{debug, warn};

use receipts_invoicing::{Invoice, InvoicePeriod, MonthKey};

/// Result set shared by every observer of one month.
pub type InvoiceList = Arc<Vec<Invoice>>;

type Slot = Arc<RwLock<InvoiceList>>;

#[derive(Debug)]
struct Entry {
    latest: Slot,
    observers: Vec<(u64, mpsc::SyncSender<()>)>,
}

/// Month key → subscription entry. An entry lives exactly as long as it has
/// at least one observer.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionIndex {
    entries: HashMap<MonthKey, Entry>,
    next_observer: u64,
}

pub(crate) type SharedIndex = Arc<Mutex<SubscriptionIndex>>;

/// Lock the index, recovering from poisoning.
///
/// Every mutation under the lock is a single insert/remove/push, so a panic
/// elsewhere cannot leave an entry half-built.
pub(crate) fn lock_index(index: &Mutex<SubscriptionIndex>) -> MutexGuard<'_, SubscriptionIndex> {
    index.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("subscription index lock poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}

impl SubscriptionIndex {
    pub(crate) fn keys(&self) -> Vec<MonthKey> {
        let mut keys: Vec<_> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }

    pub(crate) fn observer_count(&self, key: MonthKey) -> usize {
        self.entries.get(&key).map_or(0, |e| e.observers.len())
    }

    /// Attach one observer to `key`, creating the entry from `load` if the
    /// month is not live yet. `load` runs at most once, under the caller's lock.
    pub(crate) fn attach(
        &mut self,
        key: MonthKey,
        index: &SharedIndex,
        load: impl FnOnce() -> Vec<Invoice>,
    ) -> LiveInvoices {
        let observer = self.next_observer;
        self.next_observer += 1;

        let entry = self.entries.entry(key).or_insert_with(|| {
            let initial = load();
            debug!(key = %key, invoices = initial.len(), "created invoice subscription");
            Entry {
                latest: Arc::new(RwLock::new(Arc::new(initial))),
                observers: Vec::new(),
            }
        });

        let (tx, rx) = mpsc::sync_channel(1);
        entry.observers.push((observer, tx));

        LiveInvoices {
            key,
            observer,
            latest: entry.latest.clone(),
            updates: rx,
            index: index.clone(),
        }
    }

    /// Remove one observer; drop the entry once nobody is left.
    fn detach(&mut self, key: MonthKey, observer: u64) {
        let Some(entry) = self.entries.get_mut(&key) else {
            return;
        };
        entry.observers.retain(|(id, _)| *id != observer);
        if entry.observers.is_empty() {
            self.entries.remove(&key);
            debug!(key = %key, "evicted invoice subscription");
        }
    }

    /// Store a fresh result for `key` and notify every observer.
    ///
    /// Notifications coalesce: an observer has at most one pending, and
    /// reading it yields whatever `latest` holds at that moment.
    pub(crate) fn publish(&mut self, key: MonthKey, invoices: Vec<Invoice>) {
        let Some(entry) = self.entries.get_mut(&key) else {
            return;
        };
        let list: InvoiceList = Arc::new(invoices);

        match entry.latest.write() {
            Ok(mut latest) => *latest = list.clone(),
            Err(poisoned) => *poisoned.into_inner() = list.clone(),
        }

        // Full: a notification is already pending. Disconnected: the
        // receiver is mid-drop and its detach is queued behind this lock.
        for (_, tx) in &entry.observers {
            let _ = tx.try_send(());
        }
    }
}

/// A live, push-updated view of one month's invoices, newest day first.
///
/// Each handle is one observer. Cloning attaches another observer; dropping
/// detaches, and the last detach evicts the month from the cache.
#[derive(Debug)]
pub struct LiveInvoices {
    key: MonthKey,
    observer: u64,
    latest: Slot,
    updates: mpsc::Receiver<()>,
    index: SharedIndex,
}

impl LiveInvoices {
    pub fn key(&self) -> MonthKey {
        self.key
    }

    /// Most recent result set.
    pub fn current(&self) -> InvoiceList {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Newest result, if it changed since the last `try_next`/`next_timeout`.
    pub fn try_next(&self) -> Option<InvoiceList> {
        self.updates.try_recv().ok().map(|()| self.current())
    }

    /// Wait up to `timeout` for a change, then return the newest result.
    pub fn next_timeout(&self, timeout: Duration) -> Option<InvoiceList> {
        self.updates.recv_timeout(timeout).ok().map(|()| self.current())
    }

    /// Clear the pending change notification; true if one was pending.
    pub fn drain(&self) -> bool {
        self.updates.try_recv().is_ok()
    }
}

impl Clone for LiveInvoices {
    fn clone(&self) -> Self {
        // The entry is held open by `self`, so `load` never runs here.
        lock_index(&self.index).attach(self.key, &self.index, || self.current().as_ref().clone())
    }
}

impl Drop for LiveInvoices {
    fn drop(&mut self) {
        lock_index(&self.index).detach(self.key, self.observer);
    }
}

/// Both months of a filing period, presented as one list.
#[derive(Debug, Clone)]
pub struct PeriodInvoices {
    period: InvoicePeriod,
    first: LiveInvoices,
    second: LiveInvoices,
}

impl PeriodInvoices {
    pub(crate) fn new(period: InvoicePeriod, first: LiveInvoices, second: LiveInvoices) -> Self {
        Self {
            period,
            first,
            second,
        }
    }

    pub fn period(&self) -> InvoicePeriod {
        self.period
    }

    /// Second month first, then first month: newest first overall.
    pub fn current(&self) -> Vec<Invoice> {
        let mut all = self.second.current().as_ref().clone();
        all.extend(self.first.current().iter().cloned());
        all
    }

    pub fn first_month(&self) -> &LiveInvoices {
        &self.first
    }

    pub fn second_month(&self) -> &LiveInvoices {
        &self.second
    }
}

#[cfg(test)]
mod tests {
    use receipts_invoicing::{InvoiceDraft, InvoiceKind};

    use super::*;

    fn invoice(day: u32, suffix: &str) -> Invoice {
        Invoice::new(InvoiceDraft {
            kind: InvoiceKind::Scan,
            shop_name: "shop".to_string(),
            year: 2024,
            month: 11,
            day,
            number_prefix: "AB".to_string(),
            number_suffix: suffix.to_string(),
            amount: 1,
            details: Vec::new(),
        })
        .unwrap()
    }

    fn key() -> MonthKey {
        MonthKey::new(2024, 11).unwrap()
    }

    #[test]
    fn load_runs_once_per_live_entry() {
        let index: SharedIndex = Arc::default();
        let mut loads = 0;

        let a = lock_index(&index).attach(key(), &index, || {
            loads += 1;
            vec![invoice(1, "00000001")]
        });
        let b = lock_index(&index).attach(key(), &index, || {
            loads += 1;
            Vec::new()
        });

        assert_eq!(loads, 1);
        assert_eq!(b.current().len(), 1);
        assert_eq!(lock_index(&index).observer_count(key()), 2);
        drop(a);
        assert_eq!(lock_index(&index).observer_count(key()), 1);
    }

    #[test]
    fn clone_attaches_and_last_drop_evicts() {
        let index: SharedIndex = Arc::default();
        let live = lock_index(&index).attach(key(), &index, Vec::new);
        let copy = live.clone();
        assert_eq!(lock_index(&index).observer_count(key()), 2);

        drop(live);
        assert_eq!(lock_index(&index).keys(), vec![key()]);
        drop(copy);
        assert!(lock_index(&index).keys().is_empty());
    }

    #[test]
    fn publish_updates_every_observer() {
        let index: SharedIndex = Arc::default();
        let a = lock_index(&index).attach(key(), &index, Vec::new);
        let b = a.clone();

        lock_index(&index).publish(key(), vec![invoice(3, "00000003")]);

        assert_eq!(a.current().len(), 1);
        assert_eq!(a.try_next().map(|l| l.len()), Some(1));
        assert_eq!(b.try_next().map(|l| l.len()), Some(1));
        assert!(a.try_next().is_none());
    }

    #[test]
    fn unread_pushes_collapse_into_one() {
        let index: SharedIndex = Arc::default();
        let live = lock_index(&index).attach(key(), &index, Vec::new);

        for n in 1..=500u32 {
            let invoices = (0..n % 7).map(|d| invoice(d + 1, "00000001")).collect();
            lock_index(&index).publish(key(), invoices);
        }
        lock_index(&index).publish(key(), vec![invoice(9, "00000009")]);

        let newest = live.try_next().unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].number_suffix(), "00000009");
        assert!(live.try_next().is_none());
        assert!(!live.drain());
    }
}
