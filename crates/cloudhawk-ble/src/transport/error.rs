//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Peripheral not found, out of range, or refused the connection
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    /// The expected GATT service/characteristics are absent; this is
    /// probably not a CloudHawk mower
    #[error("service mismatch: {0}")]
    ServiceMismatch(String),

    /// Connected, but subscribing to the notify characteristic failed
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    /// Write attempted while the link is not ready
    #[error("not connected")]
    NotConnected,

    /// I/O failure on an established link
    #[error("transport error: {0}")]
    Io(String),
}
