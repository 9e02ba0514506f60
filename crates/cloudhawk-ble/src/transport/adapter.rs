//! Transport trait and types

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::TransportError;

/// Inbound notification payload from the notify characteristic
#[derive(Debug, Clone)]
pub struct Notification {
    /// Timestamp when the payload was received
    pub received_at: Instant,
    /// Raw frame bytes as delivered by the peripheral
    pub data: Vec<u8>,
}

/// Lifecycle of one BLE link.
///
/// Created `Disconnected`; moves forward through the connect sequence; any
/// I/O failure or peripheral-initiated disconnect forces it back to
/// `Disconnected`, observed by the reconnection supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    /// Subscribed and accepting commands
    Ready,
}

/// One BLE link to one mower.
///
/// This trait abstracts the underlying BLE stack so the supervisor,
/// dispatcher, and tests run against the same seam. Implementations own
/// exactly one peripheral connection at a time.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Open the link: discover the peripheral, connect, resolve the mower
    /// service, and subscribe to the notify characteristic.
    ///
    /// Re-subscription after a drop is the supervisor's call to make; the
    /// session never reconnects on its own.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Write-without-response to the command characteristic.
    ///
    /// Fails with [`TransportError::NotConnected`] unless the state is
    /// `Ready`; an I/O failure drops the link back to `Disconnected`.
    async fn write(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to inbound notifications, delivered in BLE arrival order
    /// with no batching across distinct notification events.
    fn notifications(&self) -> broadcast::Receiver<Notification>;

    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Watch connection state transitions. `Disconnected` is published
    /// exactly once per drop.
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// The most recent connect/link error, if any
    fn last_error(&self) -> Option<TransportError>;

    /// Release the subscription and the link. Idempotent and safe to call
    /// in any state, including mid-connect; the radio resource is never
    /// leaked across session instances.
    async fn close(&self);
}
