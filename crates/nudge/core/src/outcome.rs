//! Delivery outcome types.

/// The provider's verdict on one wakeup submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// Accepted for delivery.
    Delivered,
    /// The destination token is no longer registered with the provider.
    Unregistered,
    /// The destination token is malformed or was never valid.
    InvalidToken,
    /// The destination token is now an alias; `new_token` must be adopted
    /// for all future sends.
    CanonicalIdRotated { new_token: String },
    /// Structured provider-side failure.
    ProviderError { code: String },
    /// The submission itself failed; no provider verdict exists.
    TransportFailure { cause: String },
}

/// A delivery report paired with the correlation payload that accompanied
/// the submission.
#[derive(Debug, Clone)]
pub struct Delivery<C> {
    /// Correlation payload, returned unchanged.
    pub context: C,
    /// The provider's verdict.
    pub report: DeliveryReport,
}
