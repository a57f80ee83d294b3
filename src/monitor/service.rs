//! Monitored services and the values that identify and locate them.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::HeraldError;
use crate::ping::status::PresenceSnapshot;

/// Interval (in ticks) used when a non-positive interval is requested.
pub const DEFAULT_INTERVAL: u32 = 30;
pub const DEFAULT_PORT: u16 = 25565;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clamps a user supplied interval to a positive tick count.
pub fn normalize_interval(requested: i64, default_interval: u32) -> u32 {
    if requested <= 0 {
        return default_interval.max(1);
    }
    u32::try_from(requested).unwrap_or(u32::MAX)
}

/// A validated `host[:port]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceAddress {
    host: String,
    port: u16,
}

impl ServiceAddress {
    pub fn parse(raw: &str) -> Result<Self, HeraldError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(HeraldError::InvalidAddress(raw.to_string()));
        }

        // Bracketed IPv6 literal, optionally followed by a port.
        if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| HeraldError::InvalidAddress(raw.to_string()))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => tail
                    .strip_prefix(':')
                    .and_then(parse_port)
                    .ok_or_else(|| HeraldError::InvalidAddress(raw.to_string()))?,
            };
            if host.is_empty() {
                return Err(HeraldError::InvalidAddress(raw.to_string()));
            }
            return Ok(Self {
                host: host.to_string(),
                port,
            });
        }

        match trimmed.matches(':').count() {
            0 => Ok(Self {
                host: trimmed.to_string(),
                port: DEFAULT_PORT,
            }),
            1 => {
                let (host, port) = trimmed
                    .split_once(':')
                    .ok_or_else(|| HeraldError::InvalidAddress(raw.to_string()))?;
                let port = parse_port(port).ok_or_else(|| HeraldError::InvalidAddress(raw.to_string()))?;
                if host.is_empty() {
                    return Err(HeraldError::InvalidAddress(raw.to_string()));
                }
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            // Bare IPv6 literal without a port.
            _ => Ok(Self {
                host: trimmed.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` in a form accepted by `TcpStream::connect`.
    pub fn connect_target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|port| *port != 0)
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_PORT {
            write!(f, "{}", self.host)
        } else {
            write!(f, "{}", self.connect_target())
        }
    }
}

impl TryFrom<String> for ServiceAddress {
    type Error = HeraldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceAddress> for String {
    fn from(address: ServiceAddress) -> Self {
        address.to_string()
    }
}

/// One entry of the roster.
#[derive(Debug, Clone)]
pub struct MonitoredService {
    pub id: ServiceId,
    pub address: ServiceAddress,
    pub name: String,
    pub interval: u32,
    pub enabled: bool,
    /// Last successful snapshot; the baseline for the next diff.
    pub last_snapshot: Option<PresenceSnapshot>,
    /// Outcome of the most recent poll, `None` until the first one lands.
    pub available: Option<bool>,
}

impl MonitoredService {
    pub fn new(
        id: ServiceId,
        address: ServiceAddress,
        name: &str,
        enabled: bool,
        interval: u32,
    ) -> Result<Self, HeraldError> {
        let name = validate_name(name)?;
        Ok(Self {
            id,
            address,
            name,
            interval: interval.max(1),
            enabled,
            last_snapshot: None,
            available: None,
        })
    }

    /// `online/max` for display, `?? / ??` when the service is unreachable.
    pub fn players_label(&self) -> String {
        match (&self.last_snapshot, self.available) {
            (Some(snapshot), Some(true)) => format!("{}/{}", snapshot.online, snapshot.max),
            _ => "?? / ??".to_string(),
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<String, HeraldError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(HeraldError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host_uses_default_port() {
        let address = ServiceAddress::parse("play.example.org").unwrap();
        assert_eq!(address.host(), "play.example.org");
        assert_eq!(address.port(), DEFAULT_PORT);
        assert_eq!(address.to_string(), "play.example.org");
    }

    #[test]
    fn test_parse_host_with_port() {
        let address = ServiceAddress::parse(" 10.0.0.5:25570 ").unwrap();
        assert_eq!(address.host(), "10.0.0.5");
        assert_eq!(address.port(), 25570);
        assert_eq!(address.connect_target(), "10.0.0.5:25570");
    }

    #[test]
    fn test_parse_ipv6() {
        let bracketed = ServiceAddress::parse("[::1]:25566").unwrap();
        assert_eq!(bracketed.host(), "::1");
        assert_eq!(bracketed.port(), 25566);
        assert_eq!(bracketed.connect_target(), "[::1]:25566");

        let bare = ServiceAddress::parse("fe80::1").unwrap();
        assert_eq!(bare.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "   ", "host:", "host:abc", "host:0", "host:70000", ":25565", "a b", "[::1"] {
            assert!(
                matches!(ServiceAddress::parse(raw), Err(HeraldError::InvalidAddress(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_normalize_interval() {
        assert_eq!(normalize_interval(0, DEFAULT_INTERVAL), DEFAULT_INTERVAL);
        assert_eq!(normalize_interval(-4, DEFAULT_INTERVAL), DEFAULT_INTERVAL);
        assert_eq!(normalize_interval(5, DEFAULT_INTERVAL), 5);
        assert_eq!(normalize_interval(i64::MAX, DEFAULT_INTERVAL), u32::MAX);
    }

    #[test]
    fn test_new_service_rejects_blank_name() {
        let address = ServiceAddress::parse("localhost").unwrap();
        let result = MonitoredService::new(ServiceId(1), address, "  ", true, 5);
        assert!(matches!(result, Err(HeraldError::InvalidName(_))));
    }
}
