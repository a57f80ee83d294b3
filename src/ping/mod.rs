//! Presence polling: the status exchange spoken by monitored services.
use thiserror::Error;

pub mod poller;
pub mod protocol;
pub mod status;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Connection error: {0}")]
    ConnectionError(#[from] std::io::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Malformed status response: {0}")]
    MalformedStatus(#[from] serde_json::Error),
}
