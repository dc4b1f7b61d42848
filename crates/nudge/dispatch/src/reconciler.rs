//! Delivery-report reconciliation.

use nudge_core::{Account, Delivery, DeliveryReport, Device, WakeupMessage};
use nudge_storage::AccountStore;

use crate::DispatchMetrics;

/// How long a device's last registration write must have aged before a
/// provider failure report is trusted to mutate the device.
const FRESHNESS_WINDOW_MILLIS: i64 = 10_000;

/// Applies delivery reports to device registration state.
///
/// Runs exclusively on the dispatcher's single worker lane, so no two
/// reconciliations ever execute concurrently. The race guard below handles
/// cross-time staleness (a report arriving after the device legitimately
/// re-registered), not cross-thread concurrency.
pub struct Reconciler<S> {
    store: S,
    metrics: DispatchMetrics,
}

impl<S: AccountStore> Reconciler<S> {
    pub fn new(store: S, metrics: DispatchMetrics) -> Self {
        Self { store, metrics }
    }

    /// Process one delivery report.
    ///
    /// Never returns an error: store failures are logged and the mutation
    /// abandoned, nothing here may take down the worker lane.
    pub fn reconcile(&self, delivery: Delivery<WakeupMessage>) {
        let Delivery { context, report } = delivery;

        match report {
            DeliveryReport::Delivered => self.metrics.mark_success(),
            DeliveryReport::Unregistered | DeliveryReport::InvalidToken => {
                self.handle_dead_token(&context);
            }
            DeliveryReport::CanonicalIdRotated { new_token } => {
                self.handle_canonical(&context, new_token);
            }
            DeliveryReport::ProviderError { code } => {
                self.handle_provider_error(&context, &code);
            }
            // Filtered out in the dispatch path before the lane.
            DeliveryReport::TransportFailure { cause } => {
                tracing::warn!(error = %cause, "transport failure reached the reconciler");
            }
        }
    }

    fn handle_dead_token(&self, message: &WakeupMessage) {
        tracing::info!(
            account = %message.account_identifier,
            device_id = message.device_id,
            "gateway reports destination no longer registered"
        );

        self.apply_guarded(message, |device| device.push_token = None);
        self.metrics.mark_unregistered();
    }

    fn handle_canonical(&self, message: &WakeupMessage, new_token: String) {
        tracing::warn!(
            canonical = %new_token,
            original = %message.destination_token,
            account = %message.account_identifier,
            device_id = message.device_id,
            "gateway rotated registration to a canonical token"
        );

        self.apply_guarded(message, move |device| {
            device.push_token = Some(new_token);
        });
        self.metrics.mark_canonical();
    }

    fn handle_provider_error(&self, message: &WakeupMessage, code: &str) {
        tracing::warn!(
            error = %code,
            token = %message.destination_token,
            account = %message.account_identifier,
            device_id = message.device_id,
            "gateway reported an unrecoverable error"
        );

        self.metrics.mark_failure();
    }

    /// Mutate the target device and persist the account, if and only if the
    /// race guard passes. Guard rejections are benign no-ops.
    fn apply_guarded(&self, message: &WakeupMessage, mutate: impl FnOnce(&mut Device)) {
        let mut account = match self.guarded_account(message) {
            Ok(Some(account)) => account,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    account = %message.account_identifier,
                    "account lookup failed during reconciliation"
                );
                return;
            }
        };

        let Some(device) = account.device_mut(message.device_id) else {
            return;
        };
        mutate(device);

        if let Err(e) = self.store.update(&account) {
            tracing::error!(
                error = %e,
                account = %message.account_identifier,
                device_id = message.device_id,
                "failed to persist reconciled registration state"
            );
        }
    }

    /// Race guard: hand the account back for mutation only when the report's
    /// token still matches the device's current token and the device's last
    /// registration write is outside the freshness window.
    fn guarded_account(
        &self,
        message: &WakeupMessage,
    ) -> color_eyre::eyre::Result<Option<Account>> {
        let Some(account) = self
            .store
            .account_by_identifier(&message.account_identifier)?
        else {
            return Ok(None);
        };

        let Some(device) = account.device(message.device_id) else {
            return Ok(None);
        };

        if device.push_token.as_deref() != Some(message.destination_token.as_str()) {
            // The device re-registered since this wakeup went out; a stale
            // report must not clobber the newer token.
            tracing::debug!(
                account = %message.account_identifier,
                device_id = message.device_id,
                "discarding report for a superseded token"
            );
            return Ok(None);
        }

        let now = chrono::Utc::now().timestamp_millis();
        if device.last_push_timestamp != 0
            && now <= device.last_push_timestamp + FRESHNESS_WINDOW_MILLIS
        {
            // A registration write landed moments ago; the report may
            // predate it.
            tracing::debug!(
                account = %message.account_identifier,
                device_id = message.device_id,
                "discarding report inside the freshness window"
            );
            return Ok(None);
        }

        Ok(Some(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryAccounts;

    const ACCOUNT: &str = "+18005551234";

    fn message(token: &str) -> WakeupMessage {
        WakeupMessage {
            destination_token: token.into(),
            account_identifier: ACCOUNT.into(),
            device_id: 7,
            kind: nudge_core::WakeupKind::Notification,
        }
    }

    fn account(token: Option<&str>, last_push_timestamp: i64) -> Account {
        Account {
            identifier: ACCOUNT.into(),
            devices: vec![Device {
                id: 7,
                push_token: token.map(Into::into),
                last_push_timestamp,
            }],
        }
    }

    fn delivery(token: &str, report: DeliveryReport) -> Delivery<WakeupMessage> {
        Delivery {
            context: message(token),
            report,
        }
    }

    fn reconciler(store: &MemoryAccounts) -> (Reconciler<MemoryAccounts>, DispatchMetrics) {
        let metrics = DispatchMetrics::new();
        (Reconciler::new(store.clone(), metrics.clone()), metrics)
    }

    #[test]
    fn test_unregistered_clears_matching_token() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert!(device.push_token.is_none());
        assert_eq!(store.updates(), 1);
        assert_eq!(metrics.snapshot().unregistered, 1);
    }

    #[test]
    fn test_invalid_token_clears_matching_token() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::InvalidToken));

        assert!(
            store
                .account(ACCOUNT)
                .unwrap()
                .device(7)
                .unwrap()
                .push_token
                .is_none()
        );
        assert_eq!(metrics.snapshot().unregistered, 1);
    }

    #[test]
    fn test_recent_registration_is_not_clobbered() {
        let just_now = chrono::Utc::now().timestamp_millis() - 2_000;
        let store = MemoryAccounts::with_account(account(Some("T1"), just_now));
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert_eq!(device.push_token.as_deref(), Some("T1"));
        assert_eq!(store.updates(), 0);
        // The report is still observed, even though its mutation is refused.
        assert_eq!(metrics.snapshot().unregistered, 1);
        assert_eq!(metrics.snapshot().failure, 0);
    }

    #[test]
    fn test_aged_registration_is_trusted() {
        let a_while_ago = chrono::Utc::now().timestamp_millis() - 60_000;
        let store = MemoryAccounts::with_account(account(Some("T1"), a_while_ago));
        let (reconciler, _metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        assert!(
            store
                .account(ACCOUNT)
                .unwrap()
                .device(7)
                .unwrap()
                .push_token
                .is_none()
        );
        assert_eq!(store.updates(), 1);
    }

    #[test]
    fn test_superseded_token_is_left_alone() {
        let store = MemoryAccounts::with_account(account(Some("T2"), 0));
        let (reconciler, metrics) = reconciler(&store);

        // Stale report for the token the device had before re-registering.
        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert_eq!(device.push_token.as_deref(), Some("T2"));
        assert_eq!(store.updates(), 0);
        assert_eq!(metrics.snapshot().unregistered, 1);
    }

    #[test]
    fn test_canonical_rotation_adopts_new_token() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        let (reconciler, metrics) = reconciler(&store);

        let rotation = DeliveryReport::CanonicalIdRotated {
            new_token: "T1-canonical".into(),
        };
        reconciler.reconcile(delivery("T1", rotation.clone()));

        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert_eq!(device.push_token.as_deref(), Some("T1-canonical"));
        assert_eq!(store.updates(), 1);
        assert_eq!(metrics.snapshot().canonical, 1);

        // Replaying the now-stale context is a clean no-op: the guard sees a
        // superseded token and refuses a second mutation.
        reconciler.reconcile(delivery("T1", rotation));

        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert_eq!(device.push_token.as_deref(), Some("T1-canonical"));
        assert_eq!(store.updates(), 1);
        assert_eq!(metrics.snapshot().canonical, 2);
    }

    #[test]
    fn test_delivered_marks_success_only() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Delivered));

        assert_eq!(store.updates(), 0);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.failure, 0);
        assert_eq!(snapshot.unregistered, 0);
    }

    #[test]
    fn test_provider_error_marks_failure_and_mutates_nothing() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery(
            "T1",
            DeliveryReport::ProviderError {
                code: "InternalServerError".into(),
            },
        ));

        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert_eq!(device.push_token.as_deref(), Some("T1"));
        assert_eq!(store.updates(), 0);
        assert_eq!(metrics.snapshot().failure, 1);
    }

    #[test]
    fn test_missing_account_is_a_noop() {
        let store = MemoryAccounts::default();
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        assert_eq!(store.updates(), 0);
        assert_eq!(metrics.snapshot().unregistered, 1);
    }

    #[test]
    fn test_missing_device_is_a_noop() {
        let store = MemoryAccounts::with_account(Account {
            identifier: ACCOUNT.into(),
            devices: Vec::new(),
        });
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        assert_eq!(store.updates(), 0);
        assert_eq!(metrics.snapshot().unregistered, 1);
    }

    #[test]
    fn test_lookup_failure_is_contained() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        store.fail_lookups();
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        assert_eq!(store.updates(), 0);
        assert_eq!(metrics.snapshot().unregistered, 1);
    }

    #[test]
    fn test_persist_failure_is_contained() {
        let store = MemoryAccounts::with_account(account(Some("T1"), 0));
        store.fail_updates();
        let (reconciler, metrics) = reconciler(&store);

        reconciler.reconcile(delivery("T1", DeliveryReport::Unregistered));

        // The write failed, so the stored state is unchanged.
        let device = store.account(ACCOUNT).unwrap().device(7).cloned().unwrap();
        assert_eq!(device.push_token.as_deref(), Some("T1"));
        assert_eq!(metrics.snapshot().unregistered, 1);
    }
}
