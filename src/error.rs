use thiserror::Error;

/// Reasons a packet-in frame cannot be classified.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("frame too short for an ethernet header ({0} bytes)")]
    TruncatedEthernet(usize),
    #[error("truncated ARP payload")]
    TruncatedArp,
    #[error("truncated IPv4 header")]
    TruncatedIpv4,
    #[error("IPv4 header length {0} is invalid")]
    BadIpv4HeaderLength(u8),
}

/// Failures of a single telemetry delivery attempt.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("collector answered with HTTP {0}")]
    Status(u16),
    #[error("collector request timed out")]
    Timeout,
    #[error("collector unreachable: {0}")]
    Transport(String),
    #[error("telemetry queue full, record dropped")]
    QueueFull,
    #[error("telemetry worker stopped")]
    QueueClosed,
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TelemetryError::Timeout
        } else if let Some(status) = err.status() {
            TelemetryError::Status(status.as_u16())
        } else {
            TelemetryError::Transport(err.to_string())
        }
    }
}
