//! Wakeup dispatch.

use std::sync::{Arc, Mutex};

use nudge_core::{Delivery, DeliveryReport, WakeupMessage};
use nudge_gateway::{Priority, PushGateway, WakeupRequest};
use nudge_storage::AccountStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{DispatchMetrics, Reconciler};

/// Dispatches wakeup pushes and routes their delivery reports onto a single
/// reconciliation lane.
///
/// `send` never blocks and never surfaces an error to the caller; everything
/// after submission happens asynchronously. Cheap to clone.
pub struct WakeupSender<G> {
    lane: Lane<G>,
    metrics: DispatchMetrics,
}

enum Lane<G> {
    /// No gateway configured; every `send` is a silent no-op.
    Disabled,
    Enabled(Arc<Enabled<G>>),
}

struct Enabled<G> {
    gateway: G,
    /// Taken (and thereby closed) at shutdown.
    reports: Mutex<Option<mpsc::UnboundedSender<Delivery<WakeupMessage>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<G> Clone for WakeupSender<G> {
    fn clone(&self) -> Self {
        let lane = match &self.lane {
            Lane::Disabled => Lane::Disabled,
            Lane::Enabled(inner) => Lane::Enabled(Arc::clone(inner)),
        };

        Self {
            lane,
            metrics: self.metrics.clone(),
        }
    }
}

impl<G> WakeupSender<G>
where
    G: PushGateway<WakeupMessage> + 'static,
{
    /// A sender with no gateway behind it.
    pub fn disabled(metrics: DispatchMetrics) -> Self {
        Self {
            lane: Lane::Disabled,
            metrics,
        }
    }

    /// Create an enabled sender and spawn its reconciliation worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S>(store: S, gateway: G, metrics: DispatchMetrics) -> Self
    where
        S: AccountStore + 'static,
    {
        let (reports, mut inbox) = mpsc::unbounded_channel::<Delivery<WakeupMessage>>();
        let reconciler = Reconciler::new(store, metrics.clone());

        // The serialized lane: every registration-state mutation in the
        // system happens inside this one task.
        let worker = tokio::spawn(async move {
            while let Some(delivery) = inbox.recv().await {
                reconciler.reconcile(delivery);
            }
        });

        Self {
            lane: Lane::Enabled(Arc::new(Enabled {
                gateway,
                reports: Mutex::new(Some(reports)),
                worker: Mutex::new(Some(worker)),
            })),
            metrics,
        }
    }

    /// Fire a wakeup at the message's destination token.
    ///
    /// Returns as soon as the request is handed to the gateway; the delivery
    /// report is reconciled later on the worker lane. Transport failures are
    /// logged here and never reach the reconciler.
    pub fn send(&self, message: WakeupMessage) {
        let Lane::Enabled(inner) = &self.lane else {
            return;
        };

        let Some(reports) = inner.reports.lock().expect("reports lock").clone() else {
            // Already shut down.
            return;
        };

        let request = WakeupRequest {
            destination: message.destination_token.clone(),
            priority: Priority::High,
            data_key: message.kind.as_str(),
        };

        // Submission, not delivery, is what the outbound counters measure.
        self.metrics.mark_outbound(message.kind);

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let delivery = inner.gateway.submit(request, message).await;

            if let DeliveryReport::TransportFailure { cause } = &delivery.report {
                tracing::warn!(error = %cause, "wakeup submission failed");
                return;
            }

            // Fails only if the lane shut down while this send was in
            // flight; the report is abandoned with it.
            let _ = reports.send(delivery);
        });
    }

    /// Counter handle shared with the reconciler.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Stop the gateway and drain the reconciliation lane.
    pub async fn shutdown(&self) {
        let Lane::Enabled(inner) = &self.lane else {
            return;
        };

        inner.gateway.shutdown().await;

        // Closing the channel lets the worker finish whatever is queued and
        // then exit.
        inner.reports.lock().expect("reports lock").take();

        let worker = inner.worker.lock().expect("worker lock").take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "reconciliation worker failed");
            }
        }

        tracing::info!(totals = ?self.metrics.snapshot(), "wakeup sender stopped");
    }
}
