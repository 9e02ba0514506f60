//! Transport layer for the mower link
//!
//! This module provides the transport seam between the protocol client and
//! the BLE stack:
//! - btleplug adapter for real hardware
//! - Mock adapter for tests
//!
//! # Example
//!
//! ```ignore
//! use cloudhawk_ble::config::TransportConfig;
//! use cloudhawk_ble::transport::create_transport;
//!
//! let transport = create_transport(&TransportConfig::Mock(Default::default()));
//! transport.connect().await?;
//! transport.write(&frame).await?;
//! ```

mod adapter;
pub mod ble;
pub mod error;
pub mod mock;

pub use adapter::{BleTransport, ConnectionState, Notification};
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport from configuration. The transport is built cold;
/// the reconnection supervisor drives the actual connect.
pub fn create_transport(config: &TransportConfig) -> Arc<dyn BleTransport> {
    match config {
        TransportConfig::Ble(cfg) => Arc::new(ble::BtleplugTransport::new(cfg)),
        TransportConfig::Mock(cfg) => Arc::new(mock::MockTransport::new(cfg)),
    }
}
