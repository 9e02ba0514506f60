//! cloudhawk-core - Domain models for the CloudHawk mower BLE client
//!
//! This crate holds the protocol-agnostic representation of a mower's
//! last-known state. The BLE layer (`cloudhawk-ble`) decodes wire frames
//! into [`StateUpdate`] records; this crate owns the merge semantics that
//! turn those partial updates into a coherent [`MowerState`].

pub mod models;

pub use models::*;
