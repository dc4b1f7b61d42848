//! Push gateway traits and request types.

use nudge_core::Delivery;

/// Delivery priority requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
}

impl Priority {
    /// Wire value for the provider request.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
        }
    }
}

/// Provider-bound wakeup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeupRequest {
    /// Destination push token.
    pub destination: String,
    /// Delivery priority.
    pub priority: Priority,
    /// The single data field key; the value is always empty.
    pub data_key: &'static str,
}

/// Client for the external push gateway.
///
/// `C` is an opaque correlation payload handed in at submission and returned
/// unchanged with the delivery report. Transport-level failures come back as
/// [`nudge_core::DeliveryReport::TransportFailure`] rather than an error, so
/// every submission resolves to exactly one report.
#[trait_variant::make(Send)]
pub trait PushGateway<C: Send + 'static>: Send + Sync {
    /// Submit a wakeup request; resolves with the provider's delivery report.
    async fn submit(&self, request: WakeupRequest, context: C) -> Delivery<C>;

    /// Release provider resources. In-flight submissions complete or fail
    /// per the provider's own contract.
    async fn shutdown(&self);
}
