use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::PollError;
use super::protocol::{
    PING_PACKET_ID, STATUS_PACKET_ID, get_string, handshake_packet, ping_packet, read_packet,
    status_request_packet,
};
use super::status::{PresenceSnapshot, StatusResponse};
use crate::monitor::service::ServiceAddress;

/// Performs one presence exchange with a remote service.
#[async_trait]
pub trait ServicePoller: Send + Sync {
    async fn poll(&self, address: &ServiceAddress) -> Result<PresenceSnapshot, PollError>;
}

/// Polls services over TCP with the status handshake, bounded by a timeout
/// covering connect, request and response.
pub struct StatusPoller {
    timeout: Duration,
}

impl StatusPoller {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, address: &ServiceAddress) -> Result<PresenceSnapshot, PollError> {
        let mut stream = TcpStream::connect(address.connect_target()).await?;
        stream.set_nodelay(true)?;

        let started = Instant::now();
        stream
            .write_all(&handshake_packet(address.host(), address.port()))
            .await?;
        stream.write_all(&status_request_packet()).await?;

        let (packet_id, mut body) = read_packet(&mut stream).await?;
        if packet_id != STATUS_PACKET_ID {
            return Err(PollError::ProtocolError(format!(
                "expected status response, got packet {packet_id:#04x}"
            )));
        }
        let json = get_string(&mut body)?;
        let status: StatusResponse = serde_json::from_str(&json)?;
        let status_rtt = started.elapsed();

        // Some services hang up right after the status response.
        let latency = match ping(&mut stream).await {
            Ok(rtt) => rtt,
            Err(e) => {
                debug!(address = %address, error = %e, "Ping after status failed; using status round trip.");
                status_rtt
            }
        };

        Ok(PresenceSnapshot::from_status(
            status,
            Some(latency.as_millis() as u64),
        ))
    }
}

async fn ping(stream: &mut TcpStream) -> Result<Duration, PollError> {
    let payload = chrono::Utc::now().timestamp_millis();
    let started = Instant::now();
    stream.write_all(&ping_packet(payload)).await?;

    let (packet_id, body) = read_packet(stream).await?;
    if packet_id != PING_PACKET_ID {
        return Err(PollError::ProtocolError(format!(
            "expected pong, got packet {packet_id:#04x}"
        )));
    }
    if body[..] != payload.to_be_bytes()[..] {
        return Err(PollError::ProtocolError("pong payload mismatch".to_string()));
    }
    Ok(started.elapsed())
}

#[async_trait]
impl ServicePoller for StatusPoller {
    async fn poll(&self, address: &ServiceAddress) -> Result<PresenceSnapshot, PollError> {
        tokio::time::timeout(self.timeout, self.exchange(address))
            .await
            .map_err(|_| PollError::Timeout)?
    }
}
