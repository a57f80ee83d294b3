use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON body of a status response as sent by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub description: Option<Description>,
    #[serde(default)]
    pub players: Players,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Players {
    #[serde(default)]
    pub max: i64,
    #[serde(default)]
    pub online: i64,
    /// Absent on many services; that is not a failure.
    #[serde(default)]
    pub sample: Option<Vec<Player>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    pub name: String,
    #[serde(default)]
    pub protocol: i32,
}

/// The MOTD, either a bare string or a chat component tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Chat {
        #[serde(default)]
        text: String,
        #[serde(default)]
        extra: Vec<Description>,
    },
}

impl Description {
    pub fn plain_text(&self) -> String {
        match self {
            Description::Text(text) => text.clone(),
            Description::Chat { text, extra } => {
                let mut out = text.clone();
                for part in extra {
                    out.push_str(&part.plain_text());
                }
                out
            }
        }
    }
}

/// One point-in-time result of polling a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub success: bool,
    pub online: i64,
    pub max: i64,
    pub sample: Option<Vec<String>>,
    pub captured_at: DateTime<Utc>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub latency_ms: Option<u64>,
}

impl PresenceSnapshot {
    /// A failed poll. Carries no presence data.
    pub fn unavailable() -> Self {
        Self {
            success: false,
            online: 0,
            max: 0,
            sample: None,
            captured_at: Utc::now(),
            description: None,
            version: None,
            latency_ms: None,
        }
    }

    /// A successful poll with just presence data, mostly for callers that
    /// do not speak the wire protocol.
    pub fn online(online: i64, max: i64, sample: Option<Vec<String>>) -> Self {
        Self {
            success: true,
            online,
            max,
            sample,
            captured_at: Utc::now(),
            description: None,
            version: None,
            latency_ms: None,
        }
    }

    pub fn from_status(status: StatusResponse, latency_ms: Option<u64>) -> Self {
        let sample = status
            .players
            .sample
            .map(|players| players.into_iter().map(|player| player.name).collect());
        Self {
            success: true,
            online: status.players.online,
            max: status.players.max,
            sample,
            captured_at: Utc::now(),
            description: status.description.map(|d| d.plain_text()),
            version: status.version.map(|v| format!("{} ({})", v.name, v.protocol)),
            latency_ms,
        }
    }
}
