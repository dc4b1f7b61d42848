//! Account and device registration state.

/// A device's push registration state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    /// Device id, unique within the owning account.
    pub id: i64,
    /// Current push token, if the device is registered.
    #[serde(default)]
    pub push_token: Option<String>,
    /// Millis since epoch of the last registration write; 0 = never recorded.
    #[serde(default)]
    pub last_push_timestamp: i64,
}

/// An account and the devices it owns.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Account {
    /// Account identifier.
    pub identifier: String,
    /// Devices, ids unique within the account.
    pub devices: Vec<Device>,
}

impl Account {
    /// Look up a device by id.
    pub fn device(&self, id: i64) -> Option<&Device> {
        self.devices.iter().find(|device| device.id == id)
    }

    /// Look up a device by id for mutation.
    pub fn device_mut(&mut self, id: i64) -> Option<&mut Device> {
        self.devices.iter_mut().find(|device| device.id == id)
    }
}
