//! Client configuration
//!
//! Config structs deserialize from TOML; every tunable has a serde default
//! so a minimal file (or none at all, for mock transports) works.

use serde::{Deserialize, Serialize};

/// Configuration for one mower client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MowerConfig {
    /// Friendly name used in logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Transport selection
    #[serde(default)]
    pub transport: TransportConfig,
    /// Refresh / staleness / response-window tuning
    #[serde(default)]
    pub timing: TimingConfig,
    /// Reconnect backoff tuning
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl MowerConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Convenience constructor for the common case: one real mower found
    /// by BLE address or advertised-name fragment.
    pub fn for_device(address: Option<String>, device_name: Option<String>) -> Self {
        Self {
            transport: TransportConfig::Ble(BleConfig {
                address,
                device_name,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Real BLE link via btleplug
    Ble(BleConfig),
    /// Mock transport for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Ble(BleConfig::default())
    }
}

/// BLE discovery and connect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    /// Peripheral address, e.g. "AA:BB:CC:DD:EE:FF"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Advertised-name fragment, used when no address is known
    /// (the mowers advertise their serial number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Scan/connect deadline
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Interval between scan-result polls while discovering
    #[serde(default = "default_scan_poll_ms")]
    pub scan_poll_ms: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            address: None,
            device_name: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            scan_poll_ms: default_scan_poll_ms(),
        }
    }
}

impl BleConfig {
    /// Human-readable discovery target for log/error messages
    pub fn target_description(&self) -> String {
        match (&self.address, &self.device_name) {
            (Some(address), _) => format!("address {}", address),
            (None, Some(name)) => format!("name \"{}\"", name),
            (None, None) => "any device (no address or name configured)".into(),
        }
    }
}

/// Mock transport settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Artificial connect latency
    #[serde(default)]
    pub latency_ms: u64,
}

/// Refresh and acknowledgement timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Baseline fallback refresh cadence; bounds staleness even with no
    /// commands issued and no spontaneous notifications
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// No state update within this window marks the link stale and forces
    /// a reconnect (two missed refresh cycles by default)
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,
    /// How long a dispatched command waits for a confirming state update
    #[serde(default = "default_response_window_ms")]
    pub response_window_ms: u64,
    /// Spacing between the initial query burst after (re)connect
    #[serde(default = "default_query_spacing_ms")]
    pub query_spacing_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            staleness_window_secs: default_staleness_window_secs(),
            response_window_ms: default_response_window_ms(),
            query_spacing_ms: default_query_spacing_ms(),
        }
    }
}

/// Exponential reconnect backoff bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First retry delay
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    /// Delay cap; retries never wait longer than this
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_scan_poll_ms() -> u64 {
    500
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_staleness_window_secs() -> u64 {
    120
}

fn default_response_window_ms() -> u64 {
    5_000
}

fn default_query_spacing_ms() -> u64 {
    250
}

fn default_backoff_initial_ms() -> u64 {
    5_000
}

fn default_backoff_max_ms() -> u64 {
    80_000
}
