//! Wakeup message types.

/// What a wakeup is prompting the client to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeupKind {
    /// A delivery receipt is waiting on the server.
    Receipt,
    /// Message content is waiting on the server.
    Notification,
}

impl WakeupKind {
    /// Data key carried in the provider request; also the outbound counter
    /// label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Notification => "notification",
        }
    }
}

/// One wakeup addressed to one device.
///
/// Carries the routing context needed to reconcile the delivery report
/// later; travels through the gateway call unchanged as correlation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeupMessage {
    /// Push token the wakeup is addressed to.
    pub destination_token: String,
    /// Identifier of the owning account.
    pub account_identifier: String,
    /// Device id within the account.
    pub device_id: i64,
    /// What the device should fetch.
    pub kind: WakeupKind,
}
