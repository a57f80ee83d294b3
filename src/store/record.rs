use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::monitor::service::{ServiceAddress, ServiceId};

/// The persisted form of the roster. Snapshots are session-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub next_id: u64,
    #[serde(default = "default_notifying")]
    pub notifying: bool,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub host: ServiceAddress,
    pub name: String,
    pub enabled: bool,
    pub interval: u32,
}

fn default_notifying() -> bool {
    true
}

impl RosterRecord {
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        Ok(toml::to_string_pretty(self)?.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let text = String::from_utf8(bytes.to_vec())?;
        Ok(toml::from_str(&text)?)
    }
}
