//! Fault log models

use serde::{Deserialize, Serialize};

/// A single entry from the mower's fault log.
///
/// The fault log reply carries fixed-width records; only the fault code
/// byte has a confirmed meaning, so the surrounding bytes (a
/// timestamp-like field) are kept raw rather than parsed into types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// Device fault code
    pub code: u8,
    /// Raw detail bytes accompanying the code
    #[serde(with = "hex_bytes")]
    pub detail: Vec<u8>,
}

/// Serialize raw detail bytes as a hex string for upward consumers.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        ser.serialize_str(&hex)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let hex = String::deserialize(de)?;
        if hex.len() % 2 != 0 {
            return Err(serde::de::Error::custom("odd-length hex string"));
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map_err(|e| serde::de::Error::custom(e.to_string()))
            })
            .collect()
    }
}
