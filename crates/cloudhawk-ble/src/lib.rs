//! cloudhawk-ble - BLE protocol client for CloudHawk robotic lawn mowers
//!
//! Talks the reverse-engineered `55AA` frame protocol over the mower's
//! GATT service: encodes control/query commands, decodes the notification
//! frames the mower pushes back, assembles them into a coherent state
//! model, and keeps the notoriously flaky consumer BLE link alive.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MowerClient                           │
//! │  snapshot() / submit() / changes() / start() / stop()       │
//! │                                                             │
//! │  ┌────────────┐   ┌───────────────┐   ┌─────────────────┐  │
//! │  │ StateStore │   │  Supervisor   │   │CommandDispatcher│  │
//! │  │ (merge +   │◄──│ (reconnect +  │   │ (one in-flight  │  │
//! │  │  events)   │   │  decode loop) │   │  write, ack)    │  │
//! │  └────────────┘   └───────┬───────┘   └────────┬────────┘  │
//! │                           │                    │           │
//! │                     ┌─────┴────────────────────┴─────┐     │
//! │                     │      BleTransport (trait)      │     │
//! │                     │   btleplug adapter / mock      │     │
//! │                     └────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The frame codec (`protocol`) is pure and shared by both sides of the
//! pipeline. Domain models live in `cloudhawk-core`.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod protocol;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use client::MowerClient;
pub use config::{BackoffConfig, BleConfig, MockConfig, MowerConfig, TimingConfig, TransportConfig};
pub use dispatcher::{CommandDispatcher, CommandOutcome, DispatchError};
pub use protocol::{Command, CodecError, DecodedFrame};
pub use state::StateStore;
pub use supervisor::{BackoffPolicy, Supervisor, SupervisorState};
pub use transport::{create_transport, BleTransport, ConnectionState, TransportError};

// Re-export the domain models for convenience
pub use cloudhawk_core::{
    FaultRecord, MowerState, MowerStatus, StateChangeSet, StateField, StateUpdate,
};
