//! Gateway configuration.

/// Push gateway configuration, fixed for the life of the process.
///
/// A missing API key is not an error: it selects the disabled mode, in which
/// the dispatcher degrades to a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayConfig {
    /// No credential configured; wakeups are disabled process-wide.
    Disabled,
    /// Gateway enabled with the given API key.
    Enabled { api_key: String },
}

impl GatewayConfig {
    /// Read the configuration from `NUDGE_GATEWAY_API_KEY`.
    pub fn from_env() -> Self {
        match std::env::var("NUDGE_GATEWAY_API_KEY") {
            Ok(key) if !key.is_empty() => Self::Enabled { api_key: key },
            _ => Self::Disabled,
        }
    }
}
