//! Test doubles for the dispatch engine.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nudge_core::{Account, Delivery, DeliveryReport, WakeupMessage};
use nudge_gateway::{PushGateway, WakeupRequest};
use nudge_storage::AccountStore;

/// In-memory account store that counts writes, can simulate failures, and
/// flags overlapping access from concurrent callers.
#[derive(Clone, Default)]
pub struct MemoryAccounts {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    accounts: Mutex<Vec<Account>>,
    updates: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_updates: AtomicBool,
    busy: AtomicBool,
    overlap_seen: AtomicBool,
}

impl MemoryAccounts {
    pub fn with_account(account: Account) -> Self {
        let store = Self::default();
        store.inner.accounts.lock().unwrap().push(account);
        store
    }

    /// Stored copy of an account.
    pub fn account(&self, identifier: &str) -> Option<Account> {
        self.inner
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.identifier == identifier)
            .cloned()
    }

    /// Number of successful `update` calls.
    pub fn updates(&self) -> usize {
        self.inner.updates.load(Ordering::SeqCst)
    }

    /// Make every lookup fail from now on.
    pub fn fail_lookups(&self) {
        self.inner.fail_lookups.store(true, Ordering::SeqCst);
    }

    /// Make every update fail from now on.
    pub fn fail_updates(&self) {
        self.inner.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Whether two store calls ever ran concurrently.
    pub fn overlap_seen(&self) -> bool {
        self.inner.overlap_seen.load(Ordering::SeqCst)
    }

    /// Flag overlap if another call is already inside the store, and hold
    /// the slot long enough that real concurrency would be caught.
    fn enter(&self) -> BusyGuard<'_> {
        if self.inner.busy.swap(true, Ordering::SeqCst) {
            self.inner.overlap_seen.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        BusyGuard { inner: &self.inner }
    }
}

struct BusyGuard<'a> {
    inner: &'a MemoryInner,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.inner.busy.store(false, Ordering::SeqCst);
    }
}

impl AccountStore for MemoryAccounts {
    fn account_by_identifier(
        &self,
        identifier: &str,
    ) -> color_eyre::eyre::Result<Option<Account>> {
        let _busy = self.enter();

        if self.inner.fail_lookups.load(Ordering::SeqCst) {
            color_eyre::eyre::bail!("lookup failed");
        }

        Ok(self
            .inner
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.identifier == identifier)
            .cloned())
    }

    fn update(&self, account: &Account) -> color_eyre::eyre::Result<()> {
        let _busy = self.enter();

        if self.inner.fail_updates.load(Ordering::SeqCst) {
            color_eyre::eyre::bail!("update failed");
        }

        let mut accounts = self.inner.accounts.lock().unwrap();
        match accounts.iter_mut().find(|a| a.identifier == account.identifier) {
            Some(existing) => *existing = account.clone(),
            None => accounts.push(account.clone()),
        }

        self.inner.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Gateway double that answers every submission with a scripted report.
#[derive(Clone)]
pub struct StubGateway {
    inner: Arc<StubInner>,
}

struct StubInner {
    report: DeliveryReport,
    submissions: Mutex<Vec<WakeupRequest>>,
    shutdowns: AtomicUsize,
}

impl StubGateway {
    /// A gateway answering every submission with `report`.
    pub fn answering(report: DeliveryReport) -> Self {
        Self {
            inner: Arc::new(StubInner {
                report,
                submissions: Mutex::new(Vec::new()),
                shutdowns: AtomicUsize::new(0),
            }),
        }
    }

    /// Requests submitted so far.
    pub fn submissions(&self) -> Vec<WakeupRequest> {
        self.inner.submissions.lock().unwrap().clone()
    }

    /// Number of shutdown calls.
    pub fn shutdowns(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }
}

impl PushGateway<WakeupMessage> for StubGateway {
    async fn submit(
        &self,
        request: WakeupRequest,
        context: WakeupMessage,
    ) -> Delivery<WakeupMessage> {
        self.inner.submissions.lock().unwrap().push(request);

        Delivery {
            context,
            report: self.inner.report.clone(),
        }
    }

    async fn shutdown(&self) {
        self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
